//! The element tree authors hand to the renderer. HTML-like element nodes
//! that may embed signals anywhere — in children, in props, as whole
//! subtrees.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;

use crate::signal::{Prop, Props, Signal};

/// An async function component: props in, subtree out.
pub type ComponentFn = Arc<dyn Fn(Props) -> BoxFuture<'static, Result<Vnode>> + Send + Sync>;

#[derive(Clone)]
pub enum Vnode {
    /// null / undefined / boolean — renders nothing.
    Empty,
    Text(String),
    Fragment(Vec<Vnode>),
    Element(Element),
    /// Element whose type is a function. Executed by the pipeline.
    Component { func: ComponentFn, props: Props },
    /// A signal embedded in the tree. Rendered between bind markers.
    Signal(Signal),
}

#[derive(Clone)]
pub struct Element {
    pub tag: String,
    /// Prop order is preserved for attribute emission.
    pub props: Vec<(String, Prop)>,
    pub children: Vec<Vnode>,
}

/// Start an element: `el("div").attr("class", "card").child(text("hi"))`.
pub fn el(tag: impl Into<String>) -> Element {
    Element { tag: tag.into(), props: Vec::new(), children: Vec::new() }
}

/// A text node.
pub fn text(content: impl Into<String>) -> Vnode {
    Vnode::Text(content.into())
}

/// A fragment: children flattened in place.
pub fn fragment(children: Vec<Vnode>) -> Vnode {
    Vnode::Fragment(children)
}

impl Element {
    /// Literal attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.props.push((name.into(), Prop::Value(value.into())));
        self
    }

    /// Signal-bound attribute. Serializes the current value plus a
    /// `data-w-{attr}` binding for the client.
    pub fn bind(mut self, name: impl Into<String>, signal: &Signal) -> Self {
        self.props.push((name.into(), Prop::Signal(signal.clone())));
        self
    }

    /// Event handler binding: `on("click", &handler)` becomes
    /// `data-w-onclick="{handler.id}"`.
    pub fn on(mut self, event: impl AsRef<str>, handler: &Signal) -> Self {
        self.props.push((format!("on{}", event.as_ref()), Prop::Signal(handler.clone())));
        self
    }

    pub fn child(mut self, child: impl Into<Vnode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: Vec<Vnode>) -> Self {
        self.children.extend(children);
        self
    }
}

impl From<Element> for Vnode {
    fn from(e: Element) -> Self {
        Vnode::Element(e)
    }
}

impl From<&Signal> for Vnode {
    fn from(s: &Signal) -> Self {
        Vnode::Signal(s.clone())
    }
}

impl From<Signal> for Vnode {
    fn from(s: Signal) -> Self {
        Vnode::Signal(s)
    }
}

impl From<&str> for Vnode {
    fn from(s: &str) -> Self {
        Vnode::Text(s.to_string())
    }
}

impl From<String> for Vnode {
    fn from(s: String) -> Self {
        Vnode::Text(s)
    }
}

/// Build a function-component node.
pub fn component_el(func: ComponentFn, props: Props) -> Vnode {
    Vnode::Component { func, props }
}

/// Ids of all signals reachable in a tree, document order, first occurrence
/// wins. Component subtrees are opaque until executed.
pub fn collect_signal_ids(node: &Vnode) -> Vec<String> {
    let mut out = Vec::new();
    walk_ids(node, &mut out);
    out
}

fn walk_ids(node: &Vnode, out: &mut Vec<String>) {
    let mut push = |id: &str| {
        if !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    };
    match node {
        Vnode::Empty | Vnode::Text(_) => {}
        Vnode::Fragment(children) => {
            for child in children {
                walk_ids(child, out);
            }
        }
        Vnode::Element(element) => {
            for (_, prop) in &element.props {
                if let Prop::Signal(sig) = prop {
                    push(sig.id());
                }
            }
            for child in &element.children {
                walk_ids(child, out);
            }
        }
        Vnode::Component { props, .. } => {
            for prop in props.values() {
                if let Prop::Signal(sig) = prop {
                    push(sig.id());
                }
            }
        }
        Vnode::Signal(sig) => push(sig.id()),
    }
}

impl fmt::Debug for Vnode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vnode::Empty => write!(f, "Empty"),
            Vnode::Text(t) => write!(f, "Text({t:?})"),
            Vnode::Fragment(c) => write!(f, "Fragment[{}]", c.len()),
            Vnode::Element(e) => write!(f, "<{} ({} children)>", e.tag, e.children.len()),
            Vnode::Component { .. } => write!(f, "Component"),
            Vnode::Signal(s) => write!(f, "{s:?}"),
        }
    }
}
