//! The client agent: boots from the inline bootstrap scripts in streamed
//! HTML, reconstructs the signal registry, indexes bind markers and
//! attribute bindings, and applies surgical updates in response to events —
//! no component re-execution, no reconciliation.
//!
//! The DOM here is an in-memory fragment tree parsed from the renderer's
//! output. A browser backend would implement the same sink surface over
//! real comment ranges.

pub mod agent;
pub mod dom;
pub mod sink;

pub use agent::ClientAgent;
pub use dom::{Dom, DomNode, NodeId};
pub use sink::DomSink;
