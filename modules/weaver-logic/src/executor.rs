//! The logic executor: argument assembly, invocation, timeout and deferral.
//!
//! Timeout contract, per logic signal:
//! - synchronous completion ignores `timeout` entirely;
//! - `timeout = 0` never races — the fallback value is returned immediately
//!   with the whole invocation as a deferred;
//! - `timeout = N` races the body against an N-ms timer, keeping the losing
//!   future as the deferred;
//! - absent `timeout` awaits the body fully.
//!
//! User failures are contained: logged with the signal id, value falls back
//! to `init` if defined, else PENDING.

use std::sync::Arc;

use futures::future::{select, BoxFuture, Either};
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{error, warn};

use weaver_common::WeaverError;
use weaver_signal::{
    ComputedDef, LogicDef, NodeDef, Prop, Props, Registry, Signal, SignalDef, SignalValue,
    StreamDef, Value, Vnode,
};

use crate::chain::build_chain;
use crate::loader::{Loader, Route};
use crate::module::{Arg, CallArgs, Invocation, LogicOutput, MutHandle, ReadHandle};

/// Work that outlived its invocation: a single eventual value, or a stream
/// of reductions. The propagation engine schedules the follow-ups.
pub enum Deferred {
    Value(BoxFuture<'static, Result<Value, WeaverError>>),
    Updates(BoxStream<'static, Value>),
}

/// Result of executing a value-producing signal.
pub struct Outcome {
    pub value: SignalValue,
    pub deferred: Option<Deferred>,
}

impl Outcome {
    fn settled(value: SignalValue) -> Self {
        Self { value, deferred: None }
    }
}

/// Result of executing a node signal: the subtree, or a deferred producing
/// it.
pub struct NodeExecution {
    pub tree: Option<Vnode>,
    pub deferred: Option<BoxFuture<'static, Result<Vnode, WeaverError>>>,
}

/// Executes signals against a registry, routing logic through a loader.
#[derive(Clone)]
pub struct Executor {
    registry: Registry,
    loader: Arc<Loader>,
}

impl Executor {
    pub fn new(registry: Registry, loader: Arc<Loader>) -> Self {
        Self { registry, loader }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    fn computed_def(&self, id: &str) -> Result<ComputedDef, WeaverError> {
        match self.registry.get(id) {
            Some(SignalDef::Computed(d)) => Ok(d),
            Some(other) => Err(WeaverError::execution(
                id,
                format!("expected computed, found {}", other.kind()),
            )),
            None => Err(WeaverError::RegistryIntegrity(format!("unknown signal '{id}'"))),
        }
    }

    fn logic_def(&self, id: &str) -> Result<LogicDef, WeaverError> {
        match self.registry.get(id) {
            Some(SignalDef::Logic(d)) => Ok(d),
            Some(other) => Err(WeaverError::execution(
                id,
                format!("expected logic, found {}", other.kind()),
            )),
            None => Err(WeaverError::RegistryIntegrity(format!("unknown logic '{id}'"))),
        }
    }

    /// Read-only interfaces for a computed's dependencies. Wrappers resolve
    /// to their underlying state.
    fn read_args(&self, deps: &[String]) -> Vec<Arg> {
        deps.iter()
            .map(|dep| {
                let target = self.registry.resolve_target(dep);
                Arg::Ref(ReadHandle::new(self.registry.clone(), target))
            })
            .collect()
    }

    /// Interfaces for action/handler dependencies: mutators write through,
    /// references read, everything else passes its raw current value.
    fn action_args(&self, deps: &[String]) -> Vec<Arg> {
        deps.iter()
            .map(|dep| match self.registry.get(dep) {
                Some(SignalDef::Mutator(d)) => {
                    Arg::Mut(MutHandle::new(self.registry.clone(), d.target))
                }
                Some(SignalDef::Reference(d)) => {
                    Arg::Ref(ReadHandle::new(self.registry.clone(), d.target))
                }
                _ => Arg::Value(
                    self.registry
                        .get_value(dep)
                        .map(|v| v.to_value())
                        .unwrap_or(Value::Null),
                ),
            })
            .collect()
    }

    /// Already-serializable raw values, for worker posts.
    fn raw_args(&self, deps: &[String]) -> Vec<Value> {
        deps.iter()
            .map(|dep| {
                let target = self.registry.resolve_target(dep);
                self.registry
                    .get_value(&target)
                    .map(|v| v.to_value())
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Computed
    // -----------------------------------------------------------------------

    /// Execute a computed signal and store its value. The returned outcome
    /// carries a deferred when the timeout contract cut the invocation
    /// short.
    pub async fn execute_computed(&self, id: &str) -> Result<Outcome, WeaverError> {
        let def = self.computed_def(id)?;
        let logic = self.logic_def(&def.logic)?;
        let fallback = fallback_value(def.init.clone());

        match self.loader.route(&logic) {
            Route::Pending => {
                // Client-context logic never runs on the server.
                self.registry.set_value(id, fallback.clone());
                Ok(Outcome::settled(fallback))
            }
            Route::Call => {
                let module = match self.loader.load(&logic).await {
                    Ok(module) => module,
                    Err(e) => {
                        warn!(signal_id = %id, error = %e, "logic load failed; region closes empty");
                        self.registry.set_value(id, fallback.clone());
                        return Ok(Outcome::settled(fallback));
                    }
                };
                match module.invoke(CallArgs::Values(self.read_args(&def.deps))) {
                    Invocation::Ready(result) => {
                        // Synchronous completion: timeout is ignored.
                        Ok(self.settle_value(id, result, fallback))
                    }
                    Invocation::Async(fut) => {
                        let fut = value_future(id.to_string(), fut);
                        Ok(self.race(id, logic.timeout, fut, fallback).await)
                    }
                }
            }
            Route::Worker => {
                let pool = self.loader.workers().clone();
                let src = self.loader.src_for(&logic).to_string();
                let args = self.raw_args(&def.deps);
                let fut: BoxFuture<'static, Result<Value, WeaverError>> =
                    Box::pin(async move { pool.execute(&src, args).await });
                Ok(self.race(id, logic.timeout, fut, fallback).await)
            }
            Route::Rpc => {
                let transport = match self.loader.rpc() {
                    Some(t) => t.clone(),
                    None => {
                        warn!(signal_id = %id, "no RPC transport configured; region closes empty");
                        self.registry.set_value(id, fallback.clone());
                        return Ok(Outcome::settled(fallback));
                    }
                };
                let request = build_chain(&self.registry, id)?;
                let target = id.to_string();
                let fut: BoxFuture<'static, Result<Value, WeaverError>> = Box::pin(async move {
                    let response = transport.execute(request).await?;
                    match (response.value, response.error) {
                        (Some(value), _) => Ok(value),
                        (None, Some(error)) => Err(WeaverError::Transport(error)),
                        (None, None) => Ok(Value::Null),
                    }
                });
                Ok(self.race(id, logic.timeout, fut, fallback).await)
            }
        }
    }

    fn settle_value(
        &self,
        id: &str,
        result: anyhow::Result<LogicOutput>,
        fallback: SignalValue,
    ) -> Outcome {
        match result {
            Ok(LogicOutput::Value(value)) => {
                let value = SignalValue::Ready(value);
                self.registry.set_value(id, value.clone());
                Outcome::settled(value)
            }
            Ok(_) => {
                error!(signal_id = %id, "logic returned a non-value output");
                self.registry.set_value(id, fallback.clone());
                Outcome::settled(fallback)
            }
            Err(e) => {
                error!(signal_id = %id, error = %e, "logic execution failed");
                self.registry.set_value(id, fallback.clone());
                Outcome::settled(fallback)
            }
        }
    }

    /// Race an async body against the logic's timeout.
    async fn race(
        &self,
        id: &str,
        timeout: Option<u64>,
        fut: BoxFuture<'static, Result<Value, WeaverError>>,
        fallback: SignalValue,
    ) -> Outcome {
        match timeout {
            // Always defer: fallback now, result later.
            Some(0) => {
                self.registry.set_value(id, fallback.clone());
                Outcome { value: fallback, deferred: Some(Deferred::Value(fut)) }
            }
            Some(ms) => {
                let timer = Box::pin(tokio::time::sleep(std::time::Duration::from_millis(ms)));
                match select(fut, timer).await {
                    Either::Left((result, _)) => self.settle_raced(id, result, fallback),
                    Either::Right(((), fut)) => {
                        self.registry.set_value(id, fallback.clone());
                        Outcome { value: fallback, deferred: Some(Deferred::Value(fut)) }
                    }
                }
            }
            None => {
                let result = fut.await;
                self.settle_raced(id, result, fallback)
            }
        }
    }

    fn settle_raced(
        &self,
        id: &str,
        result: Result<Value, WeaverError>,
        fallback: SignalValue,
    ) -> Outcome {
        match result {
            Ok(value) => {
                let value = SignalValue::Ready(value);
                self.registry.set_value(id, value.clone());
                Outcome::settled(value)
            }
            Err(e) => {
                error!(signal_id = %id, error = %e, "logic execution failed");
                self.registry.set_value(id, fallback.clone());
                Outcome::settled(fallback)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Action / handler
    // -----------------------------------------------------------------------

    /// Invoke an action. Storage happens only through its mutators; errors
    /// are contained and logged.
    pub async fn execute_action(&self, id: &str) -> Result<(), WeaverError> {
        let (logic, deps) = match self.registry.get(id) {
            Some(SignalDef::Action(d)) => (self.logic_def(&d.logic)?, d.deps),
            Some(other) => {
                return Err(WeaverError::execution(
                    id,
                    format!("expected action, found {}", other.kind()),
                ))
            }
            None => return Err(WeaverError::RegistryIntegrity(format!("unknown signal '{id}'"))),
        };
        self.invoke_imperative(id, &logic, None, &deps).await
    }

    /// Invoke a handler with the triggering DOM event in argument zero.
    pub async fn execute_handler(&self, id: &str, event: Value) -> Result<(), WeaverError> {
        let (logic, deps) = match self.registry.get(id) {
            Some(SignalDef::Handler(d)) => (self.logic_def(&d.logic)?, d.deps),
            Some(other) => {
                return Err(WeaverError::execution(
                    id,
                    format!("expected handler, found {}", other.kind()),
                ))
            }
            None => return Err(WeaverError::RegistryIntegrity(format!("unknown signal '{id}'"))),
        };
        self.invoke_imperative(id, &logic, Some(event), &deps).await
    }

    /// Imperative bodies run to completion regardless of `timeout`: the
    /// point is their mutations, and dependency updates are emitted from
    /// registry state immediately after.
    async fn invoke_imperative(
        &self,
        id: &str,
        logic: &LogicDef,
        event: Option<Value>,
        deps: &[String],
    ) -> Result<(), WeaverError> {
        let mut args = self.action_args(deps);
        if let Some(event) = event {
            args.insert(0, Arg::Event(event));
        }

        let result = match self.loader.route(logic) {
            Route::Pending => return Ok(()),
            Route::Call => {
                let module = match self.loader.load(logic).await {
                    Ok(module) => module,
                    Err(e) => {
                        warn!(signal_id = %id, error = %e, "handler logic load failed");
                        return Ok(());
                    }
                };
                match module.invoke(CallArgs::Values(args)) {
                    Invocation::Ready(result) => result.map(|_| ()),
                    Invocation::Async(fut) => fut.await.map(|_| ()),
                }
            }
            Route::Worker => {
                let raw = self.raw_args(deps);
                self.loader
                    .workers()
                    .execute(self.loader.src_for(logic), raw)
                    .await
                    .map(|_| ())
                    .map_err(anyhow::Error::from)
            }
            Route::Rpc => {
                let transport = self.loader.rpc().cloned().ok_or_else(|| {
                    WeaverError::Transport("no RPC transport configured".into())
                })?;
                let request = build_chain(&self.registry, id)?;
                let response = transport.execute(request).await?;
                match response.error {
                    Some(error) => Err(anyhow::anyhow!(error)),
                    None => Ok(()),
                }
            }
        };

        if let Err(e) = result {
            error!(signal_id = %id, error = %e, "imperative logic failed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Node
    // -----------------------------------------------------------------------

    /// Execute a node signal: invoke its component logic with props and get
    /// the subtree back.
    pub async fn execute_node(&self, id: &str) -> Result<NodeExecution, WeaverError> {
        let def = match self.registry.get(id) {
            Some(SignalDef::Node(d)) => d,
            Some(other) => {
                return Err(WeaverError::execution(
                    id,
                    format!("expected node, found {}", other.kind()),
                ))
            }
            None => return Err(WeaverError::RegistryIntegrity(format!("unknown signal '{id}'"))),
        };
        let logic = self.logic_def(&def.logic)?;

        match self.loader.route(&logic) {
            Route::Pending => Ok(NodeExecution { tree: None, deferred: None }),
            Route::Worker | Route::Rpc => {
                // Subtrees cannot cross the worker or RPC wires.
                warn!(signal_id = %id, "component logic cannot execute off-thread; region closes empty");
                Ok(NodeExecution { tree: None, deferred: None })
            }
            Route::Call => {
                let module = match self.loader.load(&logic).await {
                    Ok(module) => module,
                    Err(e) => {
                        warn!(signal_id = %id, error = %e, "component load failed; region closes empty");
                        return Ok(NodeExecution { tree: None, deferred: None });
                    }
                };
                let props = self.rebuild_props(&def);
                match module.invoke(CallArgs::Props(props)) {
                    Invocation::Ready(result) => {
                        Ok(NodeExecution { tree: self.settle_node(id, result), deferred: None })
                    }
                    Invocation::Async(fut) => {
                        let fut = node_future(id.to_string(), fut);
                        self.race_node(id, logic.timeout, fut).await
                    }
                }
            }
        }
    }

    /// Props for component invocation. Author-side handles when this process
    /// built the node; rebuilt from the wire encoding otherwise.
    fn rebuild_props(&self, def: &NodeDef) -> Props {
        let mut props = Props::new();
        for (key, value) in &def.props {
            let prop = match value.get("$signal").and_then(Value::as_str) {
                Some(signal_id) => match self.registry.get(signal_id) {
                    Some(dep_def) => Prop::Signal(Signal::from_def(dep_def)),
                    None => Prop::Value(Value::Null),
                },
                None => Prop::Value(value.clone()),
            };
            props.insert(key.clone(), prop);
        }
        props
    }

    fn settle_node(&self, id: &str, result: anyhow::Result<LogicOutput>) -> Option<Vnode> {
        match result {
            Ok(LogicOutput::Node(tree)) => Some(tree),
            Ok(_) => {
                error!(signal_id = %id, "component logic returned a non-subtree output");
                None
            }
            Err(e) => {
                error!(signal_id = %id, error = %e, "component execution failed");
                None
            }
        }
    }

    async fn race_node(
        &self,
        id: &str,
        timeout: Option<u64>,
        fut: BoxFuture<'static, Result<Vnode, WeaverError>>,
    ) -> Result<NodeExecution, WeaverError> {
        match timeout {
            Some(0) => Ok(NodeExecution { tree: None, deferred: Some(fut) }),
            Some(ms) => {
                let timer = Box::pin(tokio::time::sleep(std::time::Duration::from_millis(ms)));
                match select(fut, timer).await {
                    Either::Left((Ok(tree), _)) => {
                        Ok(NodeExecution { tree: Some(tree), deferred: None })
                    }
                    Either::Left((Err(e), _)) => {
                        error!(signal_id = %id, error = %e, "component execution failed");
                        Ok(NodeExecution { tree: None, deferred: None })
                    }
                    Either::Right(((), fut)) => {
                        Ok(NodeExecution { tree: None, deferred: Some(fut) })
                    }
                }
            }
            None => match fut.await {
                Ok(tree) => Ok(NodeExecution { tree: Some(tree), deferred: None }),
                Err(e) => {
                    error!(signal_id = %id, error = %e, "component execution failed");
                    Ok(NodeExecution { tree: None, deferred: None })
                }
            },
        }
    }

    // -----------------------------------------------------------------------
    // Stream
    // -----------------------------------------------------------------------

    /// Start a stream signal: seed the registry with `init` and return a
    /// deferred stream of reductions, one per source element.
    pub async fn execute_stream(&self, id: &str) -> Result<Outcome, WeaverError> {
        let def = match self.registry.get(id) {
            Some(SignalDef::Stream(d)) => d,
            Some(other) => {
                return Err(WeaverError::execution(
                    id,
                    format!("expected stream, found {}", other.kind()),
                ))
            }
            None => return Err(WeaverError::RegistryIntegrity(format!("unknown signal '{id}'"))),
        };

        let source = self.open_source(id, &def).await?;
        let reducer = self.loader.load(&self.logic_def(&def.reducer)?).await?;

        let init = SignalValue::Ready(def.init.clone());
        self.registry.set_value(id, init.clone());

        let signal_id = id.to_string();
        let seed = def.init.clone();
        let updates = async_stream::stream! {
            let mut acc = seed;
            let mut source = source;
            while let Some(item) = source.next().await {
                let args = vec![Arg::Value(acc.clone()), Arg::Value(item)];
                let reduced = match reducer.invoke(CallArgs::Values(args)) {
                    Invocation::Ready(result) => result,
                    Invocation::Async(fut) => fut.await,
                };
                match reduced {
                    Ok(LogicOutput::Value(next)) => {
                        acc = next.clone();
                        yield next;
                    }
                    Ok(_) => {
                        error!(signal_id = %signal_id, "stream reducer returned a non-value output");
                        break;
                    }
                    Err(e) => {
                        error!(signal_id = %signal_id, error = %e, "stream reducer failed");
                        break;
                    }
                }
            }
        };

        Ok(Outcome { value: init, deferred: Some(Deferred::Updates(Box::pin(updates))) })
    }

    async fn open_source(
        &self,
        id: &str,
        def: &StreamDef,
    ) -> Result<BoxStream<'static, Value>, WeaverError> {
        let source_logic = self.logic_def(&def.source)?;
        let module = self.loader.load(&source_logic).await?;
        let output = match module.invoke(CallArgs::Values(Vec::new())) {
            Invocation::Ready(result) => result,
            Invocation::Async(fut) => fut.await,
        }
        .map_err(|e| WeaverError::execution(id, e))?;
        match output {
            LogicOutput::Stream(stream) => Ok(stream),
            _ => Err(WeaverError::execution(id, "stream source must return a stream")),
        }
    }
}

fn fallback_value(init: Option<Value>) -> SignalValue {
    init.map(SignalValue::Ready).unwrap_or(SignalValue::Pending)
}

fn value_future(
    id: String,
    fut: BoxFuture<'static, anyhow::Result<LogicOutput>>,
) -> BoxFuture<'static, Result<Value, WeaverError>> {
    Box::pin(async move {
        match fut.await {
            Ok(LogicOutput::Value(value)) => Ok(value),
            Ok(_) => Err(WeaverError::execution(&id, "logic returned a non-value output")),
            Err(e) => Err(WeaverError::execution(&id, e)),
        }
    })
}

fn node_future(
    id: String,
    fut: BoxFuture<'static, anyhow::Result<LogicOutput>>,
) -> BoxFuture<'static, Result<Vnode, WeaverError>> {
    Box::pin(async move {
        match fut.await {
            Ok(LogicOutput::Node(tree)) => Ok(tree),
            Ok(_) => Err(WeaverError::execution(&id, "component returned a non-subtree output")),
            Err(e) => Err(WeaverError::execution(&id, e)),
        }
    })
}
