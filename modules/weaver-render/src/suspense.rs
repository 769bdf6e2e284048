//! The suspense resolver.
//!
//! Children are fully processed into a buffer first; any PENDING reachable
//! from them marks the boundary not-ready. The resolver mutates the
//! suspense definition (pendingDeps, pre-rendered children HTML) in place
//! *before* it is serialized — clients depend on that ordering to know when
//! to swap.

use std::collections::HashSet;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{error, warn};

use weaver_signal::{Signal, SignalDef, SignalValue, Vnode};

use crate::context::{PendingWork, RenderCtx};
use crate::serialize::{token_html, tokens_html};
use crate::token::Token;
use crate::tokenize::tokenize_to_vec;

/// Resolve a suspense boundary into one HTML piece, emitted as a child
/// stream of the parent pipeline.
pub async fn suspense_stream(ctx: RenderCtx, signal: Signal) -> BoxStream<'static, String> {
    let tokens = resolve_suspense(&ctx, &signal).await;
    let html = tokens_html(&tokens, &ctx);
    futures::stream::once(futures::future::ready(html)).boxed()
}

/// Resolve a suspense boundary to its final token run: harvested child
/// definitions, the (mutated) suspense definition, then markers around
/// either the fallback or the buffered children.
pub async fn resolve_suspense(ctx: &RenderCtx, signal: &Signal) -> Vec<Token> {
    let id = signal.id().to_string();
    let suspense_def = match &signal.def {
        SignalDef::Suspense(def) => def.clone(),
        other => {
            error!(signal_id = %id, kind = other.kind(), "suspense resolver got a non-suspense signal");
            return Vec::new();
        }
    };

    // 1. Fully process the children into a buffer — nothing streams yet.
    let children: Vnode = signal
        .children_ref
        .as_ref()
        .map(|c| (**c).clone())
        .unwrap_or(Vnode::Empty);
    let raw = tokenize_to_vec(&children, ctx);
    let buffered = expand_tokens(ctx, raw).await;

    // 2. Scan the buffer for unresolved signals.
    let mut pending_deps: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for token in &buffered {
        let scan_id = match token {
            Token::SignalDefinition(def) => def.id(),
            Token::BindOpen { id } => id.as_str(),
            _ => continue,
        };
        if !seen.insert(scan_id.to_string()) {
            continue;
        }
        if matches!(ctx.registry().get_value(scan_id), Some(SignalValue::Pending)) {
            pending_deps.push(scan_id.to_string());
        }
    }

    // 3./4. Mutate the suspense definition in place before emission: the
    // pending list and the pre-rendered children the client swaps in.
    let children_html = prerender(&buffered);
    let mut def = suspense_def;
    def.pending_deps = pending_deps.clone();
    def.children_html = Some(children_html);
    let def = SignalDef::Suspense(def);
    ctx.registry().update_definition(def.clone());

    // 5. Harvested definitions first, then the suspense definition, then
    // the boundary content between markers.
    let mut out: Vec<Token> = buffered
        .iter()
        .filter(|t| matches!(t, Token::SignalDefinition(_)))
        .cloned()
        .collect();
    out.push(Token::SignalDefinition(def));
    out.push(Token::BindOpen { id: id.clone() });
    if pending_deps.is_empty() {
        out.extend(buffered);
    } else {
        let fallback: Vnode = signal
            .fallback_ref
            .as_ref()
            .map(|f| (**f).clone())
            .unwrap_or(Vnode::Empty);
        let fallback_tokens = tokenize_to_vec(&fallback, ctx);
        out.extend(expand_tokens(ctx, fallback_tokens).await);
    }
    out.push(Token::BindClose { id });
    out
}

/// Pre-render buffered tokens to the `_childrenHtml` string. Definition
/// scripts are excluded — they are hoisted ahead of the boundary and the
/// client already has them by swap time.
fn prerender(tokens: &[Token]) -> String {
    let mut throwaway = HashSet::new();
    let mut out = String::new();
    for token in tokens {
        if matches!(token, Token::SignalDefinition(_)) {
            continue;
        }
        out.push_str(&token_html(token, &mut throwaway));
    }
    out
}

/// Execute every placeholder in a token run, splicing results in place.
/// This is the buffered (non-streaming) counterpart of the pipeline, used
/// where content must be inspected before emission.
pub fn expand_tokens<'a>(
    ctx: &'a RenderCtx,
    tokens: Vec<Token>,
) -> BoxFuture<'a, Vec<Token>> {
    Box::pin(async move {
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token {
                Token::ComputedExec(signal) => {
                    let id = signal.id().to_string();
                    match ctx.executor().execute_computed(&id).await {
                        Ok(outcome) => {
                            if let Some(deferred) = outcome.deferred {
                                ctx.push_deferred(PendingWork::Value { id, deferred });
                            }
                            out.push(Token::Text(outcome.value.display_text()));
                        }
                        Err(e) => {
                            warn!(signal_id = %id, error = %e, "computed execution failed in buffer");
                        }
                    }
                }
                Token::StreamExec(signal) => {
                    let id = signal.id().to_string();
                    match ctx.executor().execute_stream(&id).await {
                        Ok(outcome) => {
                            if let Some(deferred) = outcome.deferred {
                                ctx.push_deferred(PendingWork::Value { id, deferred });
                            }
                            out.push(Token::Text(outcome.value.display_text()));
                        }
                        Err(e) => {
                            warn!(signal_id = %id, error = %e, "stream start failed in buffer");
                        }
                    }
                }
                Token::NodeExec(signal) => {
                    let id = signal.id().to_string();
                    match ctx.executor().execute_node(&id).await {
                        Ok(execution) => {
                            if let Some(deferred) = execution.deferred {
                                ctx.push_deferred(PendingWork::Node { id, deferred });
                            }
                            if let Some(tree) = execution.tree {
                                let sub = tokenize_to_vec(&tree, ctx);
                                out.extend(expand_tokens(ctx, sub).await);
                            }
                        }
                        Err(e) => {
                            warn!(signal_id = %id, error = %e, "node execution failed in buffer");
                        }
                    }
                }
                Token::ComponentExec { func, props } => match func(props).await {
                    Ok(tree) => {
                        let sub = tokenize_to_vec(&tree, ctx);
                        out.extend(expand_tokens(ctx, sub).await);
                    }
                    Err(e) => {
                        error!(error = %e, "function component failed in buffer");
                    }
                },
                Token::SuspenseExec(inner) => {
                    // Nested boundary: resolve it fully; its block nests
                    // verbatim.
                    out.extend(resolve_suspense(ctx, &inner).await);
                }
                other => out.push(other),
            }
        }
        out
    })
}
