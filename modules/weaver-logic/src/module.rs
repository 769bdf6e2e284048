//! The callable surface of a logic module, and the argument interfaces the
//! executor hands it.
//!
//! Invocation distinguishes synchronous from asynchronous completion because
//! the timeout contract does: a synchronous result ignores `timeout`
//! entirely, an asynchronous body is raced against it.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use weaver_signal::{Props, Registry, SignalValue, Value, Vnode};

/// What a logic invocation produces.
pub enum LogicOutput {
    /// A JSON value (computed, action, handler, stream reducer).
    Value(Value),
    /// A subtree (component logic).
    Node(Vnode),
    /// A stream of JSON values (stream source logic).
    Stream(BoxStream<'static, Value>),
}

/// A logic invocation: either completed synchronously or still running.
pub enum Invocation {
    Ready(Result<LogicOutput>),
    Async(BoxFuture<'static, Result<LogicOutput>>),
}

/// A resolved logic module. The single seam host bundlers and tests plug
/// callables into.
pub trait LogicModule: Send + Sync {
    fn invoke(&self, args: CallArgs) -> Invocation;
}

/// Arguments for one invocation.
pub enum CallArgs {
    /// Positional dependency interfaces (computed/action/handler/stream).
    Values(Vec<Arg>),
    /// Component props, signal handles intact.
    Props(Props),
}

impl CallArgs {
    pub fn values(self) -> Vec<Arg> {
        match self {
            CallArgs::Values(v) => v,
            CallArgs::Props(_) => Vec::new(),
        }
    }

    pub fn props(self) -> Props {
        match self {
            CallArgs::Props(p) => p,
            CallArgs::Values(_) => Props::new(),
        }
    }
}

/// One positional argument, shaped by the dependency kind: bare values pass
/// through raw, references read through the registry, mutators write through
/// `set_value`.
#[derive(Clone)]
pub enum Arg {
    /// The DOM event, reserved first position of handler logic.
    Event(Value),
    /// Raw current value of a bare dependency.
    Value(Value),
    /// Read-only interface.
    Ref(ReadHandle),
    /// Read/write interface.
    Mut(MutHandle),
}

impl Arg {
    /// Current value regardless of interface shape. Pending reads as null.
    pub fn value(&self) -> Value {
        match self {
            Arg::Event(v) | Arg::Value(v) => v.clone(),
            Arg::Ref(h) => h.value(),
            Arg::Mut(h) => h.value(),
        }
    }

    /// Write through a mutator interface. Err on read-only arguments.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        match self {
            Arg::Mut(h) => {
                h.set(value);
                Ok(())
            }
            _ => Err(anyhow!("argument is not writable")),
        }
    }
}

/// `{get value()}` — reads the registry at call time.
#[derive(Clone)]
pub struct ReadHandle {
    registry: Registry,
    id: String,
}

impl ReadHandle {
    pub fn new(registry: Registry, id: impl Into<String>) -> Self {
        Self { registry, id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> Value {
        self.registry
            .get_value(&self.id)
            .map(|v| v.to_value())
            .unwrap_or(Value::Null)
    }
}

/// `{get value(), set value(v)}` — writes go straight to the registry;
/// propagation stays the engine's job.
#[derive(Clone)]
pub struct MutHandle {
    registry: Registry,
    id: String,
}

impl MutHandle {
    pub fn new(registry: Registry, id: impl Into<String>) -> Self {
        Self { registry, id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn value(&self) -> Value {
        self.registry
            .get_value(&self.id)
            .map(|v| v.to_value())
            .unwrap_or(Value::Null)
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.registry.set_value(&self.id, SignalValue::Ready(value.into()));
    }
}

// ---------------------------------------------------------------------------
// Module constructors
// ---------------------------------------------------------------------------

struct SyncLogic<F>(F);

impl<F> LogicModule for SyncLogic<F>
where
    F: Fn(&[Arg]) -> Result<Value> + Send + Sync,
{
    fn invoke(&self, args: CallArgs) -> Invocation {
        Invocation::Ready((self.0)(&args.values()).map(LogicOutput::Value))
    }
}

/// A synchronous value-producing module.
pub fn sync_logic<F>(f: F) -> Arc<dyn LogicModule>
where
    F: Fn(&[Arg]) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(SyncLogic(f))
}

struct AsyncLogic<F>(F);

impl<F, Fut> LogicModule for AsyncLogic<F>
where
    F: Fn(Vec<Arg>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
{
    fn invoke(&self, args: CallArgs) -> Invocation {
        let fut = (self.0)(args.values());
        Invocation::Async(Box::pin(async move { fut.await.map(LogicOutput::Value) }))
    }
}

/// An asynchronous value-producing module.
pub fn async_logic<F, Fut>(f: F) -> Arc<dyn LogicModule>
where
    F: Fn(Vec<Arg>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(AsyncLogic(f))
}

struct ComponentLogic<F>(F);

impl<F, Fut> LogicModule for ComponentLogic<F>
where
    F: Fn(Props) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Vnode>> + Send + 'static,
{
    fn invoke(&self, args: CallArgs) -> Invocation {
        let fut = (self.0)(args.props());
        Invocation::Async(Box::pin(async move { fut.await.map(LogicOutput::Node) }))
    }
}

/// A component module: props in, subtree out.
pub fn component_logic<F, Fut>(f: F) -> Arc<dyn LogicModule>
where
    F: Fn(Props) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Vnode>> + Send + 'static,
{
    Arc::new(ComponentLogic(f))
}

struct StreamLogic<F>(F);

impl<F> LogicModule for StreamLogic<F>
where
    F: Fn(&[Arg]) -> BoxStream<'static, Value> + Send + Sync,
{
    fn invoke(&self, args: CallArgs) -> Invocation {
        Invocation::Ready(Ok(LogicOutput::Stream((self.0)(&args.values()))))
    }
}

/// A stream-source module.
pub fn stream_logic<F>(f: F) -> Arc<dyn LogicModule>
where
    F: Fn(&[Arg]) -> BoxStream<'static, Value> + Send + Sync + 'static,
{
    Arc::new(StreamLogic(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weaver_signal::{state, IdScope};

    #[test]
    fn mut_handle_writes_through_to_registry() {
        let scope = IdScope::new("t");
        let count = state(&scope, 0);
        let registry = Registry::default();
        registry.register(count.def.clone()).unwrap();

        let arg = Arg::Mut(MutHandle::new(registry.clone(), count.id()));
        assert_eq!(arg.value(), json!(0));
        arg.set(json!(5)).unwrap();
        assert_eq!(registry.get_value(count.id()).unwrap().to_value(), json!(5));
    }

    #[test]
    fn read_handle_is_not_writable() {
        let registry = Registry::default();
        let arg = Arg::Ref(ReadHandle::new(registry, "missing"));
        assert_eq!(arg.value(), Value::Null);
        assert!(arg.set(json!(1)).is_err());
    }

    #[test]
    fn sync_logic_completes_synchronously() {
        let dbl = sync_logic(|args| Ok(json!(args[0].value().as_i64().unwrap_or(0) * 2)));
        match dbl.invoke(CallArgs::Values(vec![Arg::Value(json!(4))])) {
            Invocation::Ready(Ok(LogicOutput::Value(v))) => assert_eq!(v, json!(8)),
            _ => panic!("expected synchronous completion"),
        }
    }
}
