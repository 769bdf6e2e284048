//! The signal model: content-addressable identity, typed definitions for
//! every signal kind, and the request-scoped registry holding definitions,
//! values, and dependency edges.
//!
//! Everything that crosses the wire lives in [`def`]; author-facing handles
//! carrying runtime back-references live in [`signal`]; the element tree the
//! renderer consumes lives in [`vnode`].

pub mod def;
pub mod id;
pub mod registry;
pub mod signal;
pub mod value;
pub mod vnode;

pub use def::{
    ActionDef, ComponentDef, ComputedDef, ExecutionContext, HandlerDef, LogicDef, MutatorDef,
    NodeDef, ReferenceDef, SignalDef, StateDef, StreamDef, SuspenseDef,
};
pub use id::{content_id, derived_id, IdScope};
pub use registry::Registry;
pub use signal::{
    action, component, computed, computed_with_init, handler, logic, mutator, node, reference,
    state, stream, suspense, LogicBuilder, Prop, Props, Signal,
};
pub use value::{SignalValue, Value};
pub use vnode::{el, fragment, text, ComponentFn, Element, Vnode};
