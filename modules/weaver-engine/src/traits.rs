//! Seams the engine is generic over.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use weaver_signal::{Value, Vnode};

/// Receives every update an engine pass produces, in emission order.
///
/// Implemented by the client sink (DOM swaps) and by the render session's
/// root writer (post-stream `weaver.push` scripts). Also implemented for
/// `Arc<S>` so tests can keep a handle for assertions.
#[async_trait]
pub trait UpdateSink: Send + Sync {
    async fn apply(&self, id: &str, value: &Value) -> Result<()>;
}

#[async_trait]
impl<S: UpdateSink + ?Sized> UpdateSink for std::sync::Arc<S> {
    async fn apply(&self, id: &str, value: &Value) -> Result<()> {
        (**self).apply(id, value).await
    }
}

/// Renders a node signal's subtree to an HTML string for an update.
#[async_trait]
pub trait FragmentRenderer: Send + Sync {
    async fn render_fragment(&self, tree: Vnode) -> Result<String>;
}

/// For engines that never meet node signals (unit tests, chain execution).
pub struct NullRenderer;

#[async_trait]
impl FragmentRenderer for NullRenderer {
    async fn render_fragment(&self, _tree: Vnode) -> Result<String> {
        Ok(String::new())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink (tests — no DOM required)
// ---------------------------------------------------------------------------

/// In-memory sink recording every update, for test assertions.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(String, Value)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.updates.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl UpdateSink for RecordingSink {
    async fn apply(&self, id: &str, value: &Value) -> Result<()> {
        self.updates.lock().unwrap().push((id.to_string(), value.clone()));
        Ok(())
    }
}
