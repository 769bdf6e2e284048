//! Client boot and the event→update loop.
//!
//! Boot consumes the inline `weaver.push(…)` scripts in document order —
//! the queue the stub accumulated before the agent loaded — registers every
//! signal definition, wires the sink and event delegation, then replays any
//! post-stream updates. From there, delegated DOM events drive the
//! propagation engine and updates land back in the DOM.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as Json;
use tracing::{debug, warn};

use weaver_engine::{Engine, EngineEvent, FragmentRenderer, UpdateSink};
use weaver_logic::{Executor, Loader};
use weaver_render::{PendingWork, PipelineRenderer, RenderCtx};
use weaver_signal::{Registry, SignalDef, SignalValue, Value};

use crate::dom::{Dom, NodeId};
use crate::sink::{script_payload, DomSink};

/// A `weaver.push` message.
#[derive(Debug)]
enum PushMessage {
    Definition(SignalDef),
    Update { id: String, value: Value },
}

fn parse_push(payload: &str) -> Result<PushMessage> {
    let json: Json = serde_json::from_str(payload).context("malformed weaver.push payload")?;
    match json.get("kind").and_then(Json::as_str) {
        Some("signal-definition") => {
            let signal = json
                .get("signal")
                .cloned()
                .context("signal-definition without signal")?;
            Ok(PushMessage::Definition(serde_json::from_value(signal)?))
        }
        Some("signal-update") => {
            let id = json
                .get("id")
                .and_then(Json::as_str)
                .context("signal-update without id")?
                .to_string();
            let value = json.get("value").cloned().unwrap_or(Json::Null);
            Ok(PushMessage::Update { id, value })
        }
        other => anyhow::bail!("unknown weaver.push kind {other:?}"),
    }
}

/// Applies engine updates to the DOM through the sink.
struct DomUpdateSink {
    sink: Arc<Mutex<DomSink>>,
    registry: Registry,
}

#[async_trait]
impl UpdateSink for DomUpdateSink {
    async fn apply(&self, id: &str, value: &Value) -> Result<()> {
        let mut sink = self.sink.lock().unwrap();
        if !sink.has_binding(id) {
            debug!(signal_id = %id, "update for unbound signal");
            return Ok(());
        }

        match self.registry.get(id) {
            // Node updates carry pre-rendered HTML.
            Some(SignalDef::Node(_)) => {
                if let Value::String(html) = value {
                    let scripts = sink.sync(id, html)?;
                    drop(sink);
                    consume_nested(&self.registry, scripts);
                }
            }
            _ => {
                let text = SignalValue::Ready(value.clone()).display_text();
                if !sink.ranges(id).is_empty() {
                    sink.sync_text(id, &text)?;
                }
                for (node, attr) in sink.bound_attrs(id) {
                    sink.set_attr(node, &attr, &text);
                }
            }
        }
        Ok(())
    }
}

/// Definitions arriving inside swapped-in content register immediately;
/// updates there are not expected and only logged.
fn consume_nested(registry: &Registry, scripts: Vec<String>) {
    for payload in scripts {
        match parse_push(&payload) {
            Ok(PushMessage::Definition(def)) => {
                if let Err(e) = registry.register_if_absent(def) {
                    warn!(error = %e, "nested definition rejected");
                }
            }
            Ok(PushMessage::Update { id, .. }) => {
                warn!(signal_id = %id, "unexpected update inside synced content");
            }
            Err(e) => warn!(error = %e, "unparseable nested script"),
        }
    }
}

/// The booted client: registry, sink, delegation, and a local propagation
/// engine.
pub struct ClientAgent {
    sink: Arc<Mutex<DomSink>>,
    engine: Engine,
    ctx: RenderCtx,
    /// Suspense boundaries already showing their children.
    swapped: std::collections::HashSet<String>,
}

impl ClientAgent {
    /// Boot from streamed HTML. The loader must be a client-side loader
    /// (its resolver maps bundle srcs, its RPC transport reaches the
    /// server).
    pub async fn boot(html: &str, loader: Loader) -> Result<Self> {
        let dom = Dom::parse(html)?;

        // Drain the stub queue: every inline script, document order.
        let mut definitions = Vec::new();
        let mut replay = Vec::new();
        for node in dom.walk() {
            let Some(payload) = script_payload(&dom, node) else { continue };
            match parse_push(&payload)? {
                PushMessage::Definition(def) => definitions.push(def),
                PushMessage::Update { id, value } => replay.push((id, value)),
            }
        }

        let registry = Registry::new(false);
        for def in definitions {
            // Idempotent: repeated definitions for one id are a no-op.
            registry.register_if_absent(def)?;
        }

        let executor = Executor::new(registry.clone(), Arc::new(loader));
        let ctx = RenderCtx::new(executor.clone());
        let sink = Arc::new(Mutex::new(DomSink::new(dom)));
        let update_sink =
            Arc::new(DomUpdateSink { sink: sink.clone(), registry: registry.clone() });
        let renderer = Arc::new(PipelineRenderer::new(ctx.clone()));
        let engine = Engine::new(executor, update_sink, renderer);

        let mut agent = Self { sink, engine, ctx, swapped: Default::default() };

        // Post-stream updates arrived with the document; replay them now
        // that the sink is wired.
        for (id, value) in replay {
            agent.apply_update(&id, value).await?;
        }
        Ok(agent)
    }

    pub fn registry(&self) -> Registry {
        self.engine.executor().registry().clone()
    }

    pub fn with_dom<R>(&self, f: impl FnOnce(&Dom) -> R) -> R {
        f(self.sink.lock().unwrap().dom())
    }

    /// Current text of a signal's reactive region.
    pub fn region_text(&self, signal_id: &str) -> Option<String> {
        self.sink.lock().unwrap().region_text(signal_id)
    }

    /// Deliver an external update (server sync message) into the graph.
    pub async fn apply_update(&mut self, id: &str, value: Value) -> Result<()> {
        self.engine.dispatch(EngineEvent::update(id, value)).await?;
        self.drain().await
    }

    /// The delegated document-level listener: walk up from `target` for a
    /// `data-w-on{type}` binding and run the handler through the engine.
    pub async fn dispatch_dom_event(
        &mut self,
        target: NodeId,
        event_type: &str,
        event: Value,
    ) -> Result<bool> {
        // Only event types with a document-level delegated listener.
        if !weaver_common::DELEGATED_EVENTS.contains(&event_type) {
            return Ok(false);
        }
        let handler_id = {
            let sink = self.sink.lock().unwrap();
            sink.handler_for(target, event_type)
        };
        let Some(handler_id) = handler_id else {
            return Ok(false);
        };
        self.engine
            .dispatch(EngineEvent::handler(handler_id, event))
            .await?;
        self.drain().await?;
        Ok(true)
    }

    /// Settle deferred work: client-side re-executions with timeouts, node
    /// re-renders, stream reductions. Then swap any suspense boundary whose
    /// pending dependencies have all resolved.
    async fn drain(&mut self) -> Result<()> {
        loop {
            for work in self.ctx.take_deferred() {
                match work {
                    PendingWork::Value { id, deferred } => self.engine.track(id, deferred),
                    PendingWork::Node { id, deferred } => self.engine.track_node(id, deferred),
                }
            }
            if !self.engine.has_pending() {
                if self.ctx.has_deferred() {
                    continue;
                }
                break;
            }
            self.engine.step().await?;
        }
        self.resolve_suspense_boundaries()
    }

    /// A boundary swaps from fallback to its pre-rendered children once
    /// every id in its pending list holds a resolved value. Regions inside
    /// the swapped content were pre-rendered while still pending, so their
    /// current values are re-applied after the rescan.
    fn resolve_suspense_boundaries(&mut self) -> Result<()> {
        let registry = self.registry();
        for id in registry.ids() {
            if self.swapped.contains(&id) {
                continue;
            }
            let Some(SignalDef::Suspense(def)) = registry.get(&id) else { continue };
            if def.pending_deps.is_empty() {
                // Rendered with children already in place.
                self.swapped.insert(id);
                continue;
            }
            let settled = def.pending_deps.iter().all(|dep| {
                matches!(registry.get_value(dep), Some(SignalValue::Ready(_)))
            });
            if !settled {
                continue;
            }
            if let Some(children_html) = &def.children_html {
                let scripts = {
                    let mut sink = self.sink.lock().unwrap();
                    if sink.ranges(&id).is_empty() {
                        Vec::new()
                    } else {
                        sink.sync(&id, children_html)?
                    }
                };
                consume_nested(&registry, scripts);
                for dep in &def.pending_deps {
                    if let Some(SignalValue::Ready(value)) = registry.get_value(dep) {
                        self.refresh_dom(dep, &value)?;
                    }
                }
            }
            self.swapped.insert(id);
        }
        Ok(())
    }

    /// Re-apply a value to whatever the signal is bound to, without
    /// re-entering propagation.
    fn refresh_dom(&self, id: &str, value: &Value) -> Result<()> {
        let mut sink = self.sink.lock().unwrap();
        let text = SignalValue::Ready(value.clone()).display_text();
        if !sink.ranges(id).is_empty() {
            sink.sync_text(id, &text)?;
        }
        for (node, attr) in sink.bound_attrs(id) {
            sink.set_attr(node, &attr, &text);
        }
        Ok(())
    }
}
