//! The reactive propagation engine.
//!
//! Consumes signal-update and handler-execute events, fans updates out
//! through the dependency graph in topological order, re-renders dependent
//! node signals, and delivers deferred completions after the synchronous
//! portion has drained.
//!
//! Consumers plug in an [`UpdateSink`] (where updates land: the DOM on the
//! client, post-stream scripts on the server) and a [`FragmentRenderer`]
//! (how a node subtree becomes HTML).

pub mod engine;
pub mod event;
pub mod traits;

pub use engine::Engine;
pub use event::EngineEvent;
pub use traits::{FragmentRenderer, NullRenderer, RecordingSink, UpdateSink};
