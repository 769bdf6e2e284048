//! The render pipeline: tokens in, ordered HTML pieces out.
//!
//! Synchronous runs serialize immediately; each executable placeholder
//! chains a child stream at its source position and starts the work on a
//! background task. A subtree with no async work at all short-circuits
//! through the fast path — one synchronous pass, byte-identical output.

use futures::future::Future;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{error, warn};

use weaver_common::escape_text;
use weaver_signal::{ExecutionContext, SignalDef, SignalValue, Vnode};

use crate::context::{PendingWork, RenderCtx};
use crate::sequencer::{channel_stream, sequencer, Sequencer};
use crate::serialize::tokens_html;
use crate::suspense::suspense_stream;
use crate::token::Token;
use crate::tokenize::{register_tree, tokenize_to_vec};

/// Render a tree to an ordered stream of HTML pieces. Deferred work lands
/// in the context's queue for post-stream delivery.
pub fn render_stream(ctx: RenderCtx, node: Vnode) -> BoxStream<'static, String> {
    let tokens = tokenize_to_vec(&node, &ctx);
    if let Some(html) = try_fast_tokens(&tokens, &ctx) {
        return futures::stream::once(futures::future::ready(html)).boxed();
    }
    let (seq, out) = sequencer();
    emit_tokens(ctx, tokens, &seq);
    drop(seq);
    out
}

/// Render a tree to a single string (the main stream only, no post-stream
/// follow-ups).
pub async fn render_to_string(ctx: RenderCtx, node: Vnode) -> String {
    render_stream(ctx, node).collect::<Vec<_>>().await.concat()
}

/// The fast path: serialize a token run directly iff it provably has no
/// async work — no placeholders, no PENDING-producing signal.
pub fn try_fast_tokens(tokens: &[Token], ctx: &RenderCtx) -> Option<String> {
    for token in tokens {
        if token.is_executable() {
            return None;
        }
        if let Token::BindOpen { id } = token {
            if matches!(ctx.registry().get_value(id), Some(SignalValue::Pending)) {
                return None;
            }
        }
    }
    Some(tokens_html(tokens, ctx))
}

/// Walk tokens, serializing synchronous runs and chaining child pipelines
/// for placeholders.
pub(crate) fn emit_tokens(ctx: RenderCtx, tokens: Vec<Token>, seq: &Sequencer<String>) {
    let mut run: Vec<Token> = Vec::new();
    for token in tokens {
        if !token.is_executable() {
            run.push(token);
            continue;
        }
        flush_run(&ctx, &mut run, seq);
        match token {
            Token::ComputedExec(signal) => {
                let ctx = ctx.clone();
                chain_task(seq, async move { computed_stream(ctx, signal.id().to_string()).await });
            }
            Token::StreamExec(signal) => {
                let ctx = ctx.clone();
                chain_task(seq, async move { stream_signal_stream(ctx, signal.id().to_string()).await });
            }
            Token::NodeExec(signal) => {
                let ctx = ctx.clone();
                chain_task(seq, async move { node_stream(ctx, signal.id().to_string()).await });
            }
            Token::SuspenseExec(signal) => {
                let ctx = ctx.clone();
                chain_task(seq, async move { suspense_stream(ctx, signal).await });
            }
            Token::ComponentExec { func, props } => {
                let ctx = ctx.clone();
                chain_task(seq, async move {
                    match func(props).await {
                        Ok(tree) => render_stream(ctx, tree),
                        Err(e) => {
                            error!(error = %e, "function component failed; region closes empty");
                            empty_stream()
                        }
                    }
                });
            }
            _ => unreachable!("non-executable token handled above"),
        }
    }
    flush_run(&ctx, &mut run, seq);
}

fn flush_run(ctx: &RenderCtx, run: &mut Vec<Token>, seq: &Sequencer<String>) {
    if run.is_empty() {
        return;
    }
    let html = tokens_html(run, ctx);
    run.clear();
    if !html.is_empty() {
        seq.chain_item(html);
    }
}

/// Chain a child produced by a background task. The task starts now; the
/// output drains at this position. A closed consumer stops the task.
fn chain_task<F>(seq: &Sequencer<String>, fut: F)
where
    F: Future<Output = BoxStream<'static, String>> + Send + 'static,
{
    let (tx, stream) = channel_stream();
    tokio::spawn(async move {
        let mut inner = fut.await;
        while let Some(piece) = inner.next().await {
            if tx.send(piece).is_err() {
                // Output dropped (request aborted): exit, discarding work.
                return;
            }
        }
    });
    seq.chain(stream);
}

fn empty_stream() -> BoxStream<'static, String> {
    futures::stream::empty().boxed()
}

fn text_stream(text: String) -> BoxStream<'static, String> {
    futures::stream::once(futures::future::ready(text)).boxed()
}

async fn computed_stream(ctx: RenderCtx, id: String) -> BoxStream<'static, String> {
    match ctx.executor().execute_computed(&id).await {
        Ok(outcome) => {
            if let Some(deferred) = outcome.deferred {
                ctx.push_deferred(PendingWork::Value { id, deferred });
            }
            text_stream(escape_text(&outcome.value.display_text()))
        }
        Err(e) => {
            warn!(signal_id = %id, error = %e, "computed execution failed; region closes empty");
            empty_stream()
        }
    }
}

async fn stream_signal_stream(ctx: RenderCtx, id: String) -> BoxStream<'static, String> {
    match ctx.executor().execute_stream(&id).await {
        Ok(outcome) => {
            if let Some(deferred) = outcome.deferred {
                ctx.push_deferred(PendingWork::Value { id, deferred });
            }
            text_stream(escape_text(&outcome.value.display_text()))
        }
        Err(e) => {
            warn!(signal_id = %id, error = %e, "stream start failed; region closes empty");
            empty_stream()
        }
    }
}

async fn node_stream(ctx: RenderCtx, id: String) -> BoxStream<'static, String> {
    match ctx.executor().execute_node(&id).await {
        Ok(execution) => {
            if let Some(deferred) = execution.deferred {
                ctx.push_deferred(PendingWork::Node { id, deferred });
            }
            match execution.tree {
                Some(tree) => render_stream(ctx, tree),
                None => empty_stream(),
            }
        }
        Err(e) => {
            warn!(signal_id = %id, error = %e, "node execution failed; region closes empty");
            empty_stream()
        }
    }
}

/// Execute every server-context computed in dependency order before
/// rendering, so the fast path wins on more subtrees.
pub async fn server_prepass(ctx: &RenderCtx, root: &Vnode) -> anyhow::Result<()> {
    register_tree(root, ctx);

    // Dependency order: each round executes every computed none of whose
    // deps is still waiting. An empty round means only cycles remain.
    let mut pending = collect_server_computed(ctx);
    while !pending.is_empty() {
        let waiting: std::collections::HashSet<String> = pending.iter().cloned().collect();
        let (ready, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|id| {
            ctx.registry()
                .dependencies(id)
                .iter()
                .all(|dep| !waiting.contains(&ctx.registry().resolve_target(dep)))
        });
        if ready.is_empty() {
            warn!(stuck = rest.len(), "server pre-pass found cyclic computeds; skipping");
            break;
        }
        for id in ready {
            let outcome = ctx.executor().execute_computed(&id).await?;
            if let Some(deferred) = outcome.deferred {
                ctx.push_deferred(PendingWork::Value { id, deferred });
            }
        }
        pending = rest;
    }
    Ok(())
}

fn collect_server_computed(ctx: &RenderCtx) -> Vec<String> {
    let mut out = Vec::new();
    for id in ctx.registry().ids() {
        if let Some(SignalDef::Computed(def)) = ctx.registry().get(&id) {
            if let Some(SignalDef::Logic(logic)) = ctx.registry().get(&def.logic) {
                if logic.context == Some(ExecutionContext::Server) {
                    out.push(id);
                }
            }
        }
    }
    out.sort();
    out
}
