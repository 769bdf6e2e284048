//! Shared render-pass state. Cloning shares the underlying tables, so every
//! sub-pipeline sees one emitted-definition set and one deferred queue.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::warn;

use weaver_common::WeaverError;
use weaver_logic::{Deferred, Executor};
use weaver_signal::{Registry, Signal, Vnode};

/// Async work discovered during rendering that must outlive the main
/// stream. The session hands it to the propagation engine once the
/// synchronous portion has flushed.
pub enum PendingWork {
    /// A deferred value (or stream of reductions) for a signal.
    Value { id: String, deferred: Deferred },
    /// A deferred node subtree still executing.
    Node { id: String, deferred: BoxFuture<'static, Result<Vnode, WeaverError>> },
}

/// One render pass's context: the executor (registry + loader) plus the
/// pass-wide bookkeeping.
#[derive(Clone)]
pub struct RenderCtx {
    executor: Executor,
    /// Signal ids whose definitions have been serialized this pass.
    emitted: Arc<Mutex<HashSet<String>>>,
    deferred: Arc<Mutex<Vec<PendingWork>>>,
}

impl RenderCtx {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            emitted: Arc::new(Mutex::new(HashSet::new())),
            deferred: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn registry(&self) -> &Registry {
        self.executor.registry()
    }

    /// Lazy registration on first reference by the renderer. Integrity
    /// violations never abort a render.
    pub fn register(&self, signal: &Signal) {
        if let Err(e) = self.registry().register_signal(signal) {
            warn!(signal_id = %signal.id(), error = %e, "signal registration failed");
        }
    }

    /// Mark a definition as emitted. True when this was the first emission.
    pub fn mark_emitted(&self, id: &str) -> bool {
        self.emitted.lock().unwrap().insert(id.to_string())
    }

    pub fn emitted_set(&self) -> &Arc<Mutex<HashSet<String>>> {
        &self.emitted
    }

    pub fn push_deferred(&self, work: PendingWork) {
        self.deferred.lock().unwrap().push(work);
    }

    /// Drain the deferred queue. The session loops this between engine
    /// steps, since deferred node renders can discover more deferred work.
    pub fn take_deferred(&self) -> Vec<PendingWork> {
        std::mem::take(&mut *self.deferred.lock().unwrap())
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.lock().unwrap().is_empty()
    }
}
