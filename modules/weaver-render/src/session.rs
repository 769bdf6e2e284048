//! One render session: the chunked main stream, then post-stream delivery
//! of deferred results as inline follow-up scripts.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::error;

use weaver_engine::{Engine, FragmentRenderer, UpdateSink};
use weaver_logic::Executor;
use weaver_signal::{Value, Vnode};

use crate::context::{PendingWork, RenderCtx};
use crate::pipeline::{render_stream, render_to_string, server_prepass};
use crate::serialize::{update_script, Chunker};

/// Renders node subtrees for the propagation engine through the same
/// pipeline as the main render, sharing the pass context.
pub struct PipelineRenderer {
    ctx: RenderCtx,
}

impl PipelineRenderer {
    pub fn new(ctx: RenderCtx) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl FragmentRenderer for PipelineRenderer {
    async fn render_fragment(&self, tree: Vnode) -> Result<String> {
        Ok(render_to_string(self.ctx.clone(), tree).await)
    }
}

/// Update sink that appends follow-up `weaver.push` scripts to the
/// response.
struct ScriptSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl UpdateSink for ScriptSink {
    async fn apply(&self, id: &str, value: &Value) -> Result<()> {
        // Receiver gone means the response closed; discard silently.
        let _ = self.tx.send(update_script(id, value));
        Ok(())
    }
}

/// A single request's render. Owns the pass context and drives deferred
/// completions after the synchronous HTML has flushed.
pub struct RenderSession {
    ctx: RenderCtx,
    chunk_bytes: usize,
    prepass: bool,
}

impl RenderSession {
    pub fn new(executor: Executor) -> Self {
        Self { ctx: RenderCtx::new(executor), chunk_bytes: 2048, prepass: false }
    }

    pub fn chunk_bytes(mut self, bytes: usize) -> Self {
        self.chunk_bytes = bytes;
        self
    }

    /// Execute server-context computeds in dependency order before
    /// rendering begins.
    pub fn with_prepass(mut self) -> Self {
        self.prepass = true;
        self
    }

    pub fn ctx(&self) -> &RenderCtx {
        &self.ctx
    }

    /// The full response body: TTFB-chunked HTML for the tree, then any
    /// deferred results as inline `weaver.push` scripts once the main
    /// stream has drained.
    pub fn into_stream(self, root: Vnode) -> BoxStream<'static, String> {
        let RenderSession { ctx, chunk_bytes, prepass } = self;
        Box::pin(async_stream::stream! {
            if prepass {
                if let Err(e) = server_prepass(&ctx, &root).await {
                    error!(error = %e, "server pre-pass failed");
                }
            }

            let mut main = render_stream(ctx.clone(), root);
            let mut chunker = Chunker::new(chunk_bytes);
            while let Some(piece) = main.next().await {
                if let Some(chunk) = chunker.push(&piece) {
                    yield chunk;
                }
            }
            if let Some(tail) = chunker.finish() {
                yield tail;
            }

            // Deferred delivery. Each completion may re-enter the pipeline
            // (node re-renders) and park more work; loop until the pass is
            // truly idle.
            let (tx, mut rx) = mpsc::unbounded_channel();
            let sink = Arc::new(ScriptSink { tx });
            let renderer = Arc::new(PipelineRenderer::new(ctx.clone()));
            let mut engine = Engine::new(ctx.executor().clone(), sink, renderer);
            loop {
                for work in ctx.take_deferred() {
                    match work {
                        PendingWork::Value { id, deferred } => engine.track(id, deferred),
                        PendingWork::Node { id, deferred } => engine.track_node(id, deferred),
                    }
                }
                while let Ok(script) = rx.try_recv() {
                    yield script;
                }
                if !engine.has_pending() && !ctx.has_deferred() {
                    break;
                }
                match engine.step().await {
                    Ok(true) => {}
                    Ok(false) => {
                        if !ctx.has_deferred() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "deferred propagation failed");
                        break;
                    }
                }
            }
            drop(engine);
            while let Ok(script) = rx.try_recv() {
                yield script;
            }
        })
    }

    /// Collect the whole response into one string. Tests and
    /// non-streaming callers.
    pub async fn into_string(self, root: Vnode) -> String {
        self.into_stream(root).collect::<Vec<_>>().await.concat()
    }
}
