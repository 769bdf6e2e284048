//! Context routing: where a logic invocation actually runs.

use std::sync::Arc;

use weaver_common::WeaverError;
use weaver_signal::{ExecutionContext, LogicDef};

use crate::module::LogicModule;
use crate::resolver::{ModuleResolver, Side};
use crate::rpc::RpcTransport;
use crate::worker::WorkerPool;

/// Routing decision for one logic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Resolve the module and call it in-process.
    Call,
    /// Post to the worker pool keyed by `src`.
    Worker,
    /// Server-context logic invoked from the client: POST a signal chain.
    Rpc,
    /// Client-context logic seen by the server: yield PENDING, never run.
    Pending,
}

/// Resolves logic signals to callables, honouring execution contexts.
/// Scoped per runtime handle so concurrent requests cannot observe each
/// other's resolution.
pub struct Loader {
    side: Side,
    resolver: Arc<dyn ModuleResolver>,
    workers: Arc<WorkerPool>,
    rpc: Option<Arc<dyn RpcTransport>>,
}

impl Loader {
    pub fn new(side: Side, resolver: Arc<dyn ModuleResolver>, workers: Arc<WorkerPool>) -> Self {
        Self { side, resolver, workers, rpc: None }
    }

    /// Install the transport used for server-context logic on the client.
    pub fn with_rpc(mut self, rpc: Arc<dyn RpcTransport>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn rpc(&self) -> Option<&Arc<dyn RpcTransport>> {
        self.rpc.as_ref()
    }

    /// The routing table: context × side.
    pub fn route(&self, def: &LogicDef) -> Route {
        match (def.context, self.side) {
            // Isomorphic logic executes wherever it is invoked.
            (None, _) => Route::Call,
            (Some(ExecutionContext::Server), Side::Server) => Route::Call,
            (Some(ExecutionContext::Server), Side::Client) => Route::Rpc,
            (Some(ExecutionContext::Client), Side::Server) => Route::Pending,
            (Some(ExecutionContext::Client), Side::Client) => Route::Call,
            (Some(ExecutionContext::Worker), Side::Server) => Route::Call,
            (Some(ExecutionContext::Worker), Side::Client) => Route::Worker,
        }
    }

    /// Module path for this side. `ssr_src` wins on the server when present.
    pub fn src_for<'a>(&self, def: &'a LogicDef) -> &'a str {
        match (self.side, &def.ssr_src) {
            (Side::Server, Some(ssr_src)) => ssr_src,
            _ => &def.src,
        }
    }

    /// Resolve the callable for a logic signal.
    pub async fn load(&self, def: &LogicDef) -> Result<Arc<dyn LogicModule>, WeaverError> {
        self.resolver.resolve(self.src_for(def)).await
    }
}
