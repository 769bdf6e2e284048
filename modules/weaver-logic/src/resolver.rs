//! Module resolution: `src` path → callable.
//!
//! The hook is pluggable so host bundlers can inject transform-time paths.
//! It is scoped per runtime handle, never process-wide — two concurrent
//! requests must never see each other's module resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use weaver_common::WeaverError;

use crate::module::LogicModule;

/// Which build of the runtime is executing: the server render or the client
/// agent. Drives the loader's context routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

/// Resolves a module path to its default export.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, src: &str) -> Result<Arc<dyn LogicModule>, WeaverError>;
}

/// In-memory resolver: an explicit `src → module` table. Hosts register
/// their bundle output here; tests register closures.
#[derive(Default)]
pub struct MapResolver {
    modules: HashMap<String, Arc<dyn LogicModule>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, src: impl Into<String>, module: Arc<dyn LogicModule>) -> Self {
        self.modules.insert(src.into(), module);
        self
    }

    pub fn insert(&mut self, src: impl Into<String>, module: Arc<dyn LogicModule>) {
        self.modules.insert(src.into(), module);
    }
}

#[async_trait]
impl ModuleResolver for MapResolver {
    async fn resolve(&self, src: &str) -> Result<Arc<dyn LogicModule>, WeaverError> {
        self.modules
            .get(src)
            .cloned()
            .ok_or_else(|| WeaverError::load(src, "module not registered"))
    }
}

/// Resolvers behind an Arc resolve transparently, so one table can be shared
/// between the loader and a worker pool.
#[async_trait]
impl<R: ModuleResolver + ?Sized> ModuleResolver for Arc<R> {
    async fn resolve(&self, src: &str) -> Result<Arc<dyn LogicModule>, WeaverError> {
        (**self).resolve(src).await
    }
}
