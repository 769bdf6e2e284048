//! The registry: request-scoped store of signal definitions, values, and
//! forward dependency edges.
//!
//! `set_value` is the only value mutator and never propagates — cascading is
//! the propagation engine's job. `register_if_absent` never replaces an
//! existing definition, which is what makes derived ids idempotent.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tracing::warn;

use weaver_common::WeaverError;

use crate::def::SignalDef;
use crate::signal::Signal;
use crate::value::SignalValue;

#[derive(Default)]
struct Inner {
    definitions: HashMap<String, SignalDef>,
    values: HashMap<String, SignalValue>,
    /// Forward edges: dependency id → dependent ids. BTreeSet so iteration
    /// order is deterministic.
    edges: HashMap<String, BTreeSet<String>>,
}

/// Shared handle to one request's (or one page's) signal store.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<Inner>>,
    /// Integrity violations are hard errors when set, warnings otherwise.
    strict: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Registry {
    pub fn new(strict: bool) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())), strict }
    }

    /// Register a definition. An existing entry with equal content is a
    /// no-op; an existing entry with different content is an integrity
    /// violation.
    pub fn register(&self, def: SignalDef) -> Result<(), WeaverError> {
        let mut inner = self.inner.lock().unwrap();
        let id = def.id().to_string();

        if let Some(existing) = inner.definitions.get(&id) {
            if *existing != def {
                let err = WeaverError::RegistryIntegrity(format!(
                    "id '{id}' re-registered with different content ({} vs {})",
                    existing.kind(),
                    def.kind()
                ));
                if self.strict {
                    return Err(err);
                }
                warn!(signal_id = %id, "{err}");
            }
            return Ok(());
        }

        // Wrappers hang off their target state so updates to the state reach
        // anything depending on the wrapper.
        let edge_sources: Vec<String> = match &def {
            SignalDef::Reference(d) => vec![d.target.clone()],
            SignalDef::Mutator(d) => vec![d.target.clone()],
            _ => def.deps().to_vec(),
        };
        for dep in edge_sources {
            inner.edges.entry(dep).or_default().insert(id.clone());
        }
        inner.definitions.insert(id, def);
        Ok(())
    }

    /// Register unless already present. Returns whether the definition was
    /// inserted.
    pub fn register_if_absent(&self, def: SignalDef) -> Result<bool, WeaverError> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.definitions.contains_key(def.id()) {
                drop(inner);
                // Re-run the equality check so divergent content still warns.
                self.register(def)?;
                return Ok(false);
            }
        }
        self.register(def)?;
        Ok(true)
    }

    /// Register a signal handle plus its runtime back-references (logic and
    /// dependency signals), references first so every id is resolvable by
    /// the time its dependent lands.
    pub fn register_signal(&self, signal: &Signal) -> Result<(), WeaverError> {
        if let Some(logic_ref) = &signal.logic_ref {
            self.register_signal(logic_ref)?;
        }
        for dep in &signal.deps_ref {
            self.register_signal(dep)?;
        }
        self.register(signal.def.clone())
    }

    pub fn get(&self, id: &str) -> Option<SignalDef> {
        self.inner.lock().unwrap().definitions.get(id).cloned()
    }

    /// All registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<String> = inner.definitions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().unwrap().definitions.contains_key(id)
    }

    /// Current value. State signals fall back to their `init` before the
    /// first write; everything else is `None` until executed.
    pub fn get_value(&self, id: &str) -> Option<SignalValue> {
        let inner = self.inner.lock().unwrap();
        if let Some(v) = inner.values.get(id) {
            return Some(v.clone());
        }
        match inner.definitions.get(id) {
            Some(SignalDef::State(d)) => Some(SignalValue::Ready(d.init.clone())),
            Some(SignalDef::Stream(d)) => Some(SignalValue::Ready(d.init.clone())),
            _ => None,
        }
    }

    /// Write a value. Never triggers propagation.
    pub fn set_value(&self, id: &str, value: SignalValue) {
        self.inner.lock().unwrap().values.insert(id.to_string(), value);
    }

    /// Overwrite a definition in place, bypassing the divergence check. The
    /// suspense resolver uses this to fill `pendingDeps`/`_childrenHtml`
    /// before the definition is serialized.
    pub fn update_definition(&self, def: SignalDef) {
        let mut inner = self.inner.lock().unwrap();
        inner.definitions.insert(def.id().to_string(), def);
    }

    /// Ids that directly depend on `id`, in id order.
    pub fn dependents(&self, id: &str) -> BTreeSet<String> {
        self.inner
            .lock()
            .unwrap()
            .edges
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Direct value dependencies of `id`, in declaration order.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .definitions
            .get(id)
            .map(|def| def.deps().to_vec())
            .unwrap_or_default()
    }

    /// Resolve reference/mutator wrappers to their underlying state id.
    pub fn resolve_target(&self, id: &str) -> String {
        match self.get(id) {
            Some(SignalDef::Reference(d)) => d.target,
            Some(SignalDef::Mutator(d)) => d.target,
            _ => id.to_string(),
        }
    }

    /// Check that every id referenced by registered definitions resolves.
    /// Strict registries error; lax registries warn and report.
    pub fn check_integrity(&self) -> Result<Vec<String>, WeaverError> {
        let inner = self.inner.lock().unwrap();
        let mut missing = Vec::new();
        for def in inner.definitions.values() {
            for referenced in def.refs() {
                if !inner.definitions.contains_key(&referenced) {
                    missing.push(format!("{} → {referenced}", def.id()));
                }
            }
        }
        drop(inner);
        missing.sort();
        if !missing.is_empty() {
            let err = WeaverError::RegistryIntegrity(format!(
                "unresolvable references: {}",
                missing.join(", ")
            ));
            if self.strict {
                return Err(err);
            }
            warn!("{err}");
        }
        Ok(missing)
    }
}
