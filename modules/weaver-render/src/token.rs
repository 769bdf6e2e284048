//! Tokens: the lazy sequence the tree walk produces. Plain items serialize
//! directly; executable placeholders are expanded by the pipeline, in
//! source position but off the hot path.

use std::fmt;

use weaver_signal::{ComponentFn, Props, Signal, SignalDef};

#[derive(Clone)]
pub enum Token {
    Text(String),
    Open { tag: String, attrs: Vec<(String, String)> },
    Close { tag: String },
    BindOpen { id: String },
    BindClose { id: String },
    SignalDefinition(SignalDef),
    /// Pre-serialized HTML, passed through untouched (fast path, suspense
    /// pre-render).
    RawHtml(String),
    /// A computed signal needing async execution, between its bind markers.
    ComputedExec(Signal),
    /// A stream signal to start, between its bind markers.
    StreamExec(Signal),
    /// A node signal to execute and render, between its bind markers.
    NodeExec(Signal),
    /// A suspense boundary; the resolver emits the whole block.
    SuspenseExec(Signal),
    /// An element whose type is a function.
    ComponentExec { func: ComponentFn, props: Props },
}

impl Token {
    /// Placeholders need the pipeline; everything else serializes directly.
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            Token::ComputedExec(_)
                | Token::StreamExec(_)
                | Token::NodeExec(_)
                | Token::SuspenseExec(_)
                | Token::ComponentExec { .. }
        )
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Text(t) => write!(f, "Text({t:?})"),
            Token::Open { tag, attrs } => write!(f, "Open(<{tag}> {} attrs)", attrs.len()),
            Token::Close { tag } => write!(f, "Close(</{tag}>)"),
            Token::BindOpen { id } => write!(f, "BindOpen({id})"),
            Token::BindClose { id } => write!(f, "BindClose({id})"),
            Token::SignalDefinition(def) => write!(f, "SignalDefinition({} {})", def.kind(), def.id()),
            Token::RawHtml(h) => write!(f, "RawHtml({} bytes)", h.len()),
            Token::ComputedExec(s) => write!(f, "ComputedExec({})", s.id()),
            Token::StreamExec(s) => write!(f, "StreamExec({})", s.id()),
            Token::NodeExec(s) => write!(f, "NodeExec({})", s.id()),
            Token::SuspenseExec(s) => write!(f, "SuspenseExec({})", s.id()),
            Token::ComponentExec { .. } => write!(f, "ComponentExec"),
        }
    }
}
