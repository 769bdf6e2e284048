//! Engine events. These are also a wire format: post-stream scripts and
//! client sync messages serialize them verbatim.

use serde::{Deserialize, Serialize};

use weaver_signal::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// Write `value` to `id` and cascade through its dependents.
    SignalUpdate { id: String, value: Value },
    /// Invoke the handler `id` with a DOM event, then emit updates for its
    /// dependencies.
    HandlerExecute { id: String, event: Value },
}

impl EngineEvent {
    pub fn update(id: impl Into<String>, value: impl Into<Value>) -> Self {
        EngineEvent::SignalUpdate { id: id.into(), value: value.into() }
    }

    pub fn handler(id: impl Into<String>, event: impl Into<Value>) -> Self {
        EngineEvent::HandlerExecute { id: id.into(), event: event.into() }
    }
}
