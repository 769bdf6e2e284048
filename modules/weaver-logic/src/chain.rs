//! Signal chains: the transitive closure of definitions needed to execute a
//! target signal in a foreign process. Pruned at any signal whose value is
//! already serializable — the value crosses instead of its dependencies.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use weaver_common::WeaverError;
use weaver_signal::{Registry, SignalDef, SignalValue, Value};

use crate::executor::{Deferred, Executor};
use crate::loader::Loader;
use crate::resolver::{ModuleResolver, Side};
use crate::worker::WorkerPool;

/// One chain entry: a definition, plus its cached value at the prune point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSignal {
    pub signal: SignalDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Body of `POST /weaver/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(rename = "targetId")]
    pub target_id: String,
    pub signals: Vec<ChainSignal>,
}

/// `{value}` on success, `{error}` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn ok(value: Value) -> Self {
        Self { value: Some(value), error: None }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self { value: None, error: Some(error.to_string()) }
    }
}

/// Build the pruned chain for `target_id`. Dependencies land before their
/// dependents so the receiver can register in arrival order.
pub fn build_chain(registry: &Registry, target_id: &str) -> Result<ExecuteRequest, WeaverError> {
    let mut visited = HashSet::new();
    let mut signals = Vec::new();
    visit(registry, target_id, target_id, &mut visited, &mut signals)?;
    Ok(ExecuteRequest { target_id: target_id.to_string(), signals })
}

fn visit(
    registry: &Registry,
    id: &str,
    target_id: &str,
    visited: &mut HashSet<String>,
    out: &mut Vec<ChainSignal>,
) -> Result<(), WeaverError> {
    if !visited.insert(id.to_string()) {
        return Ok(());
    }
    let def = registry.get(id).ok_or_else(|| {
        WeaverError::RegistryIntegrity(format!("chain references unknown signal '{id}'"))
    })?;

    // Prune point: a resolved value stands in for the whole sub-graph.
    // The target itself always ships as a definition — it is about to be
    // re-executed.
    if id != target_id {
        if let Some(SignalValue::Ready(value)) = registry.get_value(id) {
            out.push(ChainSignal { signal: def, value: Some(value) });
            return Ok(());
        }
    }

    for referenced in def.refs() {
        visit(registry, &referenced, target_id, visited, out)?;
    }
    out.push(ChainSignal { signal: def, value: None });
    Ok(())
}

/// Rebuild a registry from a chain and execute the target. The server side
/// of `POST /weaver/execute` and the worker-host side of chain offload.
pub async fn execute_chain(
    request: ExecuteRequest,
    resolver: Arc<dyn ModuleResolver>,
) -> ExecuteResponse {
    let registry = Registry::new(false);
    for entry in request.signals {
        let id = entry.signal.id().to_string();
        if let Err(e) = registry.register(entry.signal) {
            return ExecuteResponse::err(e);
        }
        if let Some(value) = entry.value {
            registry.set_value(&id, SignalValue::Ready(value));
        }
    }

    let workers = Arc::new(WorkerPool::new(resolver.clone(), 30_000));
    let loader = Loader::new(Side::Server, resolver, workers);
    let executor = Executor::new(registry.clone(), Arc::new(loader));

    let target = match registry.get(&request.target_id) {
        Some(def) => def,
        None => {
            return ExecuteResponse::err(format!(
                "chain omits target '{}'",
                request.target_id
            ))
        }
    };

    match target {
        SignalDef::Computed(_) => match executor.execute_computed(&request.target_id).await {
            // The caller already raced its own timeout; resolve fully here.
            Ok(outcome) => match outcome.deferred {
                Some(Deferred::Value(fut)) => match fut.await {
                    Ok(value) => ExecuteResponse::ok(value),
                    Err(e) => ExecuteResponse::err(e),
                },
                _ => ExecuteResponse::ok(outcome.value.to_value()),
            },
            Err(e) => ExecuteResponse::err(e),
        },
        SignalDef::Action(_) => match executor.execute_action(&request.target_id).await {
            Ok(()) => ExecuteResponse::ok(Value::Null),
            Err(e) => ExecuteResponse::err(e),
        },
        SignalDef::Handler(_) => {
            match executor.execute_handler(&request.target_id, Value::Null).await {
                Ok(()) => ExecuteResponse::ok(Value::Null),
                Err(e) => ExecuteResponse::err(e),
            }
        }
        other => {
            warn!(target_id = %request.target_id, kind = other.kind(), "unexecutable chain target");
            ExecuteResponse::err(format!("cannot execute signal of kind '{}'", other.kind()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::sync_logic;
    use crate::resolver::MapResolver;
    use serde_json::json;
    use weaver_signal::{computed, logic, state, IdScope};

    fn doubling_setup() -> (Registry, weaver_signal::Signal, weaver_signal::Signal) {
        let scope = IdScope::new("chain");
        let count = state(&scope, 5);
        let dbl = logic("/logic/double.js").arity(1).build();
        let doubled = computed(&dbl, &[count.clone()]).unwrap();
        let registry = Registry::default();
        registry.register_signal(&doubled).unwrap();
        (registry, count, doubled)
    }

    #[test]
    fn chain_prunes_at_resolved_values() {
        let (registry, count, doubled) = doubling_setup();
        registry.set_value(count.id(), SignalValue::ready(5));

        let request = build_chain(&registry, doubled.id()).unwrap();
        assert_eq!(request.target_id, doubled.id());

        let state_entry =
            request.signals.iter().find(|s| s.signal.id() == count.id()).unwrap();
        assert_eq!(state_entry.value, Some(json!(5)));

        // Dependencies precede the target.
        let ids: Vec<&str> = request.signals.iter().map(|s| s.signal.id()).collect();
        assert_eq!(ids.last().copied(), Some(doubled.id()));
    }

    #[tokio::test]
    async fn execute_chain_round_trips() {
        let (registry, _count, doubled) = doubling_setup();
        let request = build_chain(&registry, doubled.id()).unwrap();

        let resolver = Arc::new(MapResolver::new().with_module(
            "/logic/double.js",
            sync_logic(|args| Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2))),
        ));
        let response = execute_chain(request, resolver).await;
        assert_eq!(response.error, None);
        assert_eq!(response.value, Some(json!(10)));
    }

    #[test]
    fn chain_wire_shape() {
        let (registry, _count, doubled) = doubling_setup();
        let request = build_chain(&registry, doubled.id()).unwrap();
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["targetId"], json!(doubled.id()));
        assert!(wire["signals"].as_array().unwrap().len() >= 3);
    }
}
