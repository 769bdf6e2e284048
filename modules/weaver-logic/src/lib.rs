//! Logic loading and execution.
//!
//! A logic signal names a module; the loader resolves it to a callable (or a
//! routing decision — RPC stub, worker post, PENDING sentinel) based on the
//! logic's execution context and which side of the wire we are on. The
//! executor assembles argument interfaces from the registry, invokes the
//! callable, and honours the timeout/deferral contract.

pub mod chain;
pub mod executor;
pub mod loader;
pub mod module;
pub mod resolver;
pub mod rpc;
pub mod worker;

pub use chain::{build_chain, execute_chain, ChainSignal, ExecuteRequest, ExecuteResponse};
pub use executor::{Deferred, Executor, NodeExecution, Outcome};
pub use loader::{Loader, Route};
pub use module::{
    async_logic, component_logic, stream_logic, sync_logic, Arg, CallArgs, Invocation,
    LogicModule, LogicOutput, MutHandle, ReadHandle,
};
pub use resolver::{MapResolver, ModuleResolver, Side};
pub use rpc::{HttpTransport, InProcessTransport, RpcTransport};
pub use worker::{WorkerPool, WorkerRequest, WorkerResponse};
