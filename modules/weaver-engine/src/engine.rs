//! The dispatch loop.
//!
//! Dispatch an event, cascade until settled: write → emit → walk dependents
//! in topological order → recurse. A dependent executes exactly once per
//! propagation pass, even through diamond-shaped graphs.
//!
//! Deferred completions never join the synchronous cascade — they are held
//! aside and drained by `run_until_idle`, after the in-order output has
//! flushed.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, FuturesUnordered};
use futures::StreamExt;
use tracing::{debug, error};

use weaver_logic::{Deferred, Executor};
use weaver_signal::{Registry, SignalDef, SignalValue, Value};

use crate::event::EngineEvent;
use crate::traits::{FragmentRenderer, UpdateSink};

/// What a parked deferred produces when it completes: follow-up events, and
/// for stream signals the remainder of the stream to park again.
type Completion = (Vec<EngineEvent>, Option<(String, BoxStream<'static, Value>)>);

/// The propagation engine. One per render session or client page.
pub struct Engine {
    executor: Executor,
    sink: Arc<dyn UpdateSink>,
    renderer: Arc<dyn FragmentRenderer>,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl Engine {
    pub fn new(
        executor: Executor,
        sink: Arc<dyn UpdateSink>,
        renderer: Arc<dyn FragmentRenderer>,
    ) -> Self {
        Self { executor, sink, renderer, pending: FuturesUnordered::new() }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn registry(&self) -> &Registry {
        self.executor.registry()
    }

    /// Dispatch one event and cascade until the synchronous portion
    /// settles. Deferred work is parked for `run_until_idle`.
    pub async fn dispatch(&mut self, event: EngineEvent) -> Result<()> {
        let mut queue = VecDeque::new();
        queue.push_back(event);

        while let Some(event) = queue.pop_front() {
            match event {
                EngineEvent::SignalUpdate { id, value } => {
                    self.propagate(&id, value).await?;
                }
                EngineEvent::HandlerExecute { id, event } => {
                    self.executor.execute_handler(&id, event).await?;
                    // The handler mutated through its mutators; emit an
                    // update per dependency from current registry state.
                    for dep in self.registry().dependencies(&id) {
                        let target = self.registry().resolve_target(&dep);
                        let value = self
                            .registry()
                            .get_value(&target)
                            .map(|v| v.to_value())
                            .unwrap_or(Value::Null);
                        queue.push_back(EngineEvent::update(target, value));
                    }
                }
            }
        }
        Ok(())
    }

    /// One propagation pass: write the root, then visit every transitive
    /// dependent exactly once, in topological order.
    async fn propagate(&mut self, id: &str, value: Value) -> Result<()> {
        self.registry().set_value(id, SignalValue::Ready(value.clone()));
        self.sink.apply(id, &value).await?;

        for dependent in topological_dependents(self.registry(), id) {
            match self.registry().get(&dependent) {
                Some(SignalDef::Computed(_)) => {
                    let outcome = self.executor.execute_computed(&dependent).await?;
                    if let Some(deferred) = outcome.deferred {
                        self.track(dependent.clone(), deferred);
                    }
                    self.sink.apply(&dependent, &outcome.value.to_value()).await?;
                }
                Some(SignalDef::Node(_)) => {
                    let execution = self.executor.execute_node(&dependent).await?;
                    if let Some(tree) = execution.tree {
                        let html = self.renderer.render_fragment(tree).await?;
                        self.registry()
                            .set_value(&dependent, SignalValue::ready(html.clone()));
                        self.sink.apply(&dependent, &Value::String(html)).await?;
                    }
                    if let Some(fut) = execution.deferred {
                        self.track_node(dependent.clone(), fut);
                    }
                }
                // Actions and handlers are never auto-triggered; state and
                // the rest have nothing to execute.
                _ => {}
            }
        }
        Ok(())
    }

    /// Park deferred work discovered by this engine or by the render
    /// pipeline.
    pub fn track(&mut self, id: String, deferred: Deferred) {
        match deferred {
            Deferred::Value(fut) => {
                self.pending.push(Box::pin(async move {
                    match fut.await {
                        Ok(value) => (vec![EngineEvent::update(id, value)], None),
                        Err(e) => {
                            error!(signal_id = %id, error = %e, "deferred execution failed");
                            (Vec::new(), None)
                        }
                    }
                }));
            }
            Deferred::Updates(stream) => self.park_stream(id, stream),
        }
    }

    /// Park a deferred node execution: render the subtree on completion and
    /// emit the HTML as an update.
    pub fn track_node(
        &mut self,
        id: String,
        fut: BoxFuture<'static, Result<weaver_signal::Vnode, weaver_common::WeaverError>>,
    ) {
        let renderer = self.renderer.clone();
        self.pending.push(Box::pin(async move {
            match fut.await {
                Ok(tree) => match renderer.render_fragment(tree).await {
                    Ok(html) => (vec![EngineEvent::update(id, html)], None),
                    Err(e) => {
                        error!(signal_id = %id, error = %e, "deferred node render failed");
                        (Vec::new(), None)
                    }
                },
                Err(e) => {
                    error!(signal_id = %id, error = %e, "deferred node execution failed");
                    (Vec::new(), None)
                }
            }
        }));
    }

    fn park_stream(&mut self, id: String, stream: BoxStream<'static, Value>) {
        self.pending.push(Box::pin(async move {
            let (item, rest) = stream.into_future().await;
            match item {
                Some(value) => (vec![EngineEvent::update(id.clone(), value)], Some((id, rest))),
                None => {
                    debug!(signal_id = %id, "stream signal source ended");
                    (Vec::new(), None)
                }
            }
        }));
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Wait for one parked deferred to complete and dispatch its follow-up
    /// events. Returns false when nothing was pending.
    pub async fn step(&mut self) -> Result<bool> {
        let Some((events, parked_stream)) = self.pending.next().await else {
            return Ok(false);
        };
        if let Some((id, rest)) = parked_stream {
            self.park_stream(id, rest);
        }
        for event in events {
            self.dispatch(event).await?;
        }
        Ok(true)
    }

    /// Drain every parked deferred, dispatching follow-up events — which may
    /// themselves park more work. Returns when nothing is left.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        while self.step().await? {}
        Ok(())
    }
}

/// Transitive dependents of `root`, topologically ordered (Kahn), id-order
/// tie-break so every pass over the same graph is deterministic.
fn topological_dependents(registry: &Registry, root: &str) -> Vec<String> {
    // Reachable set, excluding the root itself.
    let mut reachable = BTreeSet::new();
    let mut frontier = vec![root.to_string()];
    while let Some(id) = frontier.pop() {
        for dependent in registry.dependents(&id) {
            if reachable.insert(dependent.clone()) {
                frontier.push(dependent);
            }
        }
    }

    // In-degree within the reachable subgraph. Deps dedup to match the
    // edge set, or a repeated dependency would never drain.
    let mut in_degree: HashMap<String, usize> =
        reachable.iter().map(|id| (id.clone(), 0)).collect();
    for id in &reachable {
        let deps: BTreeSet<String> = registry.dependencies(id).into_iter().collect();
        for dep in deps {
            // A dep may be a wrapper; either the wrapper or its target being
            // upstream makes it an ordering constraint.
            if reachable.contains(&dep) || reachable.contains(&registry.resolve_target(&dep)) {
                *in_degree.get_mut(id).expect("id is reachable") += 1;
            }
        }
    }

    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut order = Vec::with_capacity(reachable.len());
    while let Some(id) = ready.iter().next().cloned() {
        ready.remove(&id);
        for dependent in registry.dependents(&id) {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
        order.push(id);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_signal::{computed, logic, state, IdScope};

    #[test]
    fn topological_order_handles_chains_and_diamonds() {
        let scope = IdScope::new("topo");
        let count = state(&scope, 2);
        let dbl = logic("/logic/double.js").arity(1).build();
        let doubled = computed(&dbl, &[count.clone()]).unwrap();
        let quadrupled = computed(&dbl, &[doubled.clone()]).unwrap();
        // Diamond: depends on both doubled and quadrupled.
        let sum = logic("/logic/sum.js").arity(2).build();
        let joined = computed(&sum, &[doubled.clone(), quadrupled.clone()]).unwrap();

        let registry = Registry::default();
        registry.register_signal(&joined).unwrap();
        registry.register_signal(&quadrupled).unwrap();

        let order = topological_dependents(&registry, count.id());
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();

        assert_eq!(order.len(), 3);
        assert!(pos(doubled.id()) < pos(quadrupled.id()));
        assert!(pos(quadrupled.id()) < pos(joined.id()));
    }
}
