//! Worker offload. Workers are tokio tasks pooled by `src`, created lazily
//! on first invocation, terminated after a quiet period. Communication is
//! message passing only: `{id, src, args}` → `{id, result | error}`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use weaver_common::WeaverError;

use crate::module::{Arg, CallArgs, Invocation, LogicOutput};
use crate::resolver::ModuleResolver;
use weaver_signal::Value;

/// Worker wire request. Args are already serializable — dependencies were
/// resolved before the post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: Uuid,
    pub src: String,
    pub args: Vec<Value>,
}

/// Worker wire response, routed back by request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Envelope {
    request: WorkerRequest,
    reply: oneshot::Sender<WorkerResponse>,
}

struct WorkerHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Lazily-spawned workers keyed by module src.
pub struct WorkerPool {
    resolver: Arc<dyn ModuleResolver>,
    idle: Duration,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl WorkerPool {
    pub fn new(resolver: Arc<dyn ModuleResolver>, idle_ms: u64) -> Self {
        Self {
            resolver,
            idle: Duration::from_millis(idle_ms),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Post an invocation to the worker for `src`, spawning it if absent,
    /// and await the routed response.
    pub async fn execute(&self, src: &str, args: Vec<Value>) -> Result<Value, WeaverError> {
        let request = WorkerRequest { id: Uuid::new_v4(), src: src.to_string(), args };
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut envelope = Envelope { request, reply: reply_tx };

        // A worker may have idled out between lookup and send; respawn once.
        for _ in 0..2 {
            let tx = self.handle_for(src);
            match tx.send(envelope) {
                Ok(()) => {
                    let response = reply_rx
                        .await
                        .map_err(|_| WeaverError::Transport("worker dropped request".into()))?;
                    return match (response.result, response.error) {
                        (Some(value), _) => Ok(value),
                        (None, Some(error)) => Err(WeaverError::Transport(error)),
                        (None, None) => Err(WeaverError::Transport("empty worker response".into())),
                    };
                }
                Err(mpsc::error::SendError(returned)) => {
                    self.workers.lock().unwrap().remove(src);
                    envelope = returned;
                }
            }
        }
        Err(WeaverError::Transport(format!("worker for '{src}' unavailable")))
    }

    fn handle_for(&self, src: &str) -> mpsc::UnboundedSender<Envelope> {
        let mut workers = self.workers.lock().unwrap();
        if let Some(handle) = workers.get(src) {
            if !handle.tx.is_closed() {
                return handle.tx.clone();
            }
            workers.remove(src);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(src.to_string(), rx, self.resolver.clone(), self.idle));
        workers.insert(src.to_string(), WorkerHandle { tx: tx.clone() });
        tx
    }
}

async fn worker_loop(
    src: String,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    resolver: Arc<dyn ModuleResolver>,
    idle: Duration,
) {
    debug!(%src, "worker started");
    loop {
        let envelope = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(envelope)) => envelope,
            // Channel closed or quiet period elapsed.
            Ok(None) => break,
            Err(_) => {
                debug!(%src, "worker idle, terminating");
                break;
            }
        };

        let request = envelope.request;
        let response = match run_request(&resolver, &request).await {
            Ok(value) => WorkerResponse { id: request.id, result: Some(value), error: None },
            Err(e) => {
                warn!(%src, request_id = %request.id, error = %e, "worker execution failed");
                WorkerResponse { id: request.id, result: None, error: Some(e.to_string()) }
            }
        };
        // Caller gone is fine; the result is simply discarded.
        let _ = envelope.reply.send(response);
    }
}

async fn run_request(
    resolver: &Arc<dyn ModuleResolver>,
    request: &WorkerRequest,
) -> Result<Value, WeaverError> {
    let module = resolver.resolve(&request.src).await?;
    let args = request.args.iter().cloned().map(Arg::Value).collect();
    let output = match module.invoke(CallArgs::Values(args)) {
        Invocation::Ready(result) => result,
        Invocation::Async(fut) => fut.await,
    }
    .map_err(|e| WeaverError::execution(&request.src, e))?;

    match output {
        LogicOutput::Value(value) => Ok(value),
        LogicOutput::Node(_) | LogicOutput::Stream(_) => Err(WeaverError::Serialization(
            format!("worker logic '{}' must return a JSON value", request.src),
        )),
    }
}
