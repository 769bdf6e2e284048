//! The tree walk. Produces tokens in source order; async subtrees become
//! executable placeholders expanded by the pipeline.

use weaver_logic::Route;
use weaver_signal::{
    ComputedDef, LogicDef, Prop, Signal, SignalDef, SignalValue, Value, Vnode,
};

use weaver_common::{html_attr_name, ATTR_BIND_PREFIX};

use crate::context::RenderCtx;
use crate::token::Token;

/// Tokenize a tree into `out`.
pub fn tokenize(node: &Vnode, ctx: &RenderCtx, out: &mut Vec<Token>) {
    match node {
        Vnode::Empty => {}
        Vnode::Text(text) => out.push(Token::Text(text.clone())),
        Vnode::Fragment(children) => {
            for child in children {
                tokenize(child, ctx, out);
            }
        }
        Vnode::Element(element) => {
            let mut attrs = Vec::with_capacity(element.props.len());
            for (name, prop) in &element.props {
                match prop {
                    Prop::Value(value) => {
                        if let Some(rendered) = literal_attr(value) {
                            attrs.push((html_attr_name(name).to_string(), rendered));
                        }
                    }
                    Prop::Signal(signal) => {
                        ctx.register(signal);
                        signal_def_tokens(signal, out);
                        if let Some(event) = name.strip_prefix("on") {
                            attrs.push((
                                format!("{ATTR_BIND_PREFIX}on{}", event.to_lowercase()),
                                signal.id().to_string(),
                            ));
                        } else {
                            let attr = html_attr_name(name);
                            attrs.push((attr.to_string(), current_text(ctx, signal.id())));
                            attrs.push((
                                format!("{ATTR_BIND_PREFIX}{attr}"),
                                signal.id().to_string(),
                            ));
                        }
                    }
                }
            }
            out.push(Token::Open { tag: element.tag.clone(), attrs });
            for child in &element.children {
                tokenize(child, ctx, out);
            }
            out.push(Token::Close { tag: element.tag.clone() });
        }
        Vnode::Component { func, props } => {
            out.push(Token::ComponentExec { func: func.clone(), props: props.clone() });
        }
        Vnode::Signal(signal) => signal_tokens(signal, ctx, out),
    }
}

pub fn tokenize_to_vec(node: &Vnode, ctx: &RenderCtx) -> Vec<Token> {
    let mut out = Vec::new();
    tokenize(node, ctx, &mut out);
    out
}

/// Literal attribute rendering. `null`/`false` drop the attribute, `true`
/// renders empty (boolean attribute), everything else renders its text.
fn literal_attr(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn current_text(ctx: &RenderCtx, id: &str) -> String {
    let target = ctx.registry().resolve_target(id);
    ctx.registry()
        .get_value(&target)
        .map(|v| v.display_text())
        .unwrap_or_default()
}

/// Emit the definitions a signal drags along: logic first, then component,
/// then dependencies (each with their own closure), then the signal itself —
/// so every id is resolvable by the time its dependent arrives.
pub fn signal_def_tokens(signal: &Signal, out: &mut Vec<Token>) {
    if let Some(logic_ref) = &signal.logic_ref {
        signal_def_tokens(logic_ref, out);
    }
    if let Some(component_ref) = &signal.component_ref {
        signal_def_tokens(component_ref, out);
    }
    for dep in &signal.deps_ref {
        signal_def_tokens(dep, out);
    }
    out.push(Token::SignalDefinition(signal.def.clone()));
}

fn signal_tokens(signal: &Signal, ctx: &RenderCtx, out: &mut Vec<Token>) {
    ctx.register(signal);
    let id = signal.id().to_string();
    match &signal.def {
        SignalDef::State(_) => {
            signal_def_tokens(signal, out);
            out.push(Token::BindOpen { id: id.clone() });
            out.push(Token::Text(current_text(ctx, &id)));
            out.push(Token::BindClose { id });
        }
        SignalDef::Computed(def) => {
            signal_def_tokens(signal, out);
            out.push(Token::BindOpen { id: id.clone() });
            if needs_async_execution(ctx, def) {
                out.push(Token::ComputedExec(signal.clone()));
            } else {
                out.push(Token::Text(current_text(ctx, &id)));
            }
            out.push(Token::BindClose { id });
        }
        SignalDef::Stream(_) => {
            signal_def_tokens(signal, out);
            out.push(Token::BindOpen { id: id.clone() });
            out.push(Token::StreamExec(signal.clone()));
            out.push(Token::BindClose { id });
        }
        SignalDef::Node(_) => {
            signal_def_tokens(signal, out);
            out.push(Token::BindOpen { id: id.clone() });
            out.push(Token::NodeExec(signal.clone()));
            out.push(Token::BindClose { id });
        }
        SignalDef::Suspense(_) => {
            // The resolver owns the whole block, definitions included.
            out.push(Token::SuspenseExec(signal.clone()));
        }
        SignalDef::Reference(_) | SignalDef::Mutator(_) => {
            signal_def_tokens(signal, out);
            out.push(Token::BindOpen { id: id.clone() });
            out.push(Token::Text(current_text(ctx, &id)));
            out.push(Token::BindClose { id });
        }
        // Logic, component, action, handler: addressable but not renderable.
        _ => signal_def_tokens(signal, out),
    }
}

/// Whether a computed must go through the async pipeline: `timeout = 0`
/// always defers; otherwise anything uncached that would actually execute
/// here.
fn needs_async_execution(ctx: &RenderCtx, def: &ComputedDef) -> bool {
    let logic = match ctx.registry().get(&def.logic) {
        Some(SignalDef::Logic(l)) => l,
        _ => return false,
    };
    if logic.timeout == Some(0) {
        return true;
    }
    if cached(ctx, &def.id) {
        return false;
    }
    !matches!(route_of(ctx, &logic), Route::Pending)
}

fn cached(ctx: &RenderCtx, id: &str) -> bool {
    matches!(ctx.registry().get_value(id), Some(SignalValue::Ready(_)))
}

fn route_of(ctx: &RenderCtx, logic: &LogicDef) -> Route {
    ctx.executor().loader().route(logic)
}

/// Register every signal reachable in a tree, including suspense subtrees.
/// The server pre-pass uses this before any tokenization happens.
pub fn register_tree(node: &Vnode, ctx: &RenderCtx) {
    match node {
        Vnode::Empty | Vnode::Text(_) => {}
        Vnode::Fragment(children) => {
            for child in children {
                register_tree(child, ctx);
            }
        }
        Vnode::Element(element) => {
            for (_, prop) in &element.props {
                if let Prop::Signal(signal) = prop {
                    ctx.register(signal);
                }
            }
            for child in &element.children {
                register_tree(child, ctx);
            }
        }
        // Component subtrees are opaque until executed.
        Vnode::Component { .. } => {}
        Vnode::Signal(signal) => {
            ctx.register(signal);
            if let Some(children) = &signal.children_ref {
                register_tree(children, ctx);
            }
            if let Some(fallback) = &signal.fallback_ref {
                register_tree(fallback, ctx);
            }
        }
    }
}
