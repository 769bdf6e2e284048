//! HTTP surface of the runtime.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::info;

use weaver_common::Config;
use weaver_logic::{
    execute_chain, ExecuteRequest, ExecuteResponse, Executor, Loader, ModuleResolver, Side,
    WorkerPool,
};
use weaver_render::RenderSession;
use weaver_signal::{Registry, Vnode};

/// Server-wide state: the module table and runtime config. Render-pass
/// state stays per request.
pub struct AppState {
    pub resolver: Arc<dyn ModuleResolver>,
    pub config: Config,
}

impl AppState {
    /// A fresh request-scoped runtime: its own registry (strict in dev),
    /// its own loader, worker pool from the shared module table.
    pub fn session(&self) -> RenderSession {
        let registry = Registry::new(self.config.dev);
        let workers = Arc::new(WorkerPool::new(
            self.resolver.clone(),
            self.config.worker_idle_ms,
        ));
        let loader = Loader::new(Side::Server, self.resolver.clone(), workers);
        let executor = Executor::new(registry, Arc::new(loader));
        RenderSession::new(executor).chunk_bytes(self.config.chunk_bytes)
    }
}

/// Init tracing for a server binary: env-filtered fmt subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// The runtime's routes, ready to merge into a host router:
/// `POST /weaver/execute`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/weaver/execute", post(execute_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /weaver/execute` — rebuild a registry from the posted signal
/// chain, execute the target server-side, return `{value}` or `{error}`.
pub async fn execute_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    info!(target_id = %request.target_id, signals = request.signals.len(), "execute chain");
    let response: ExecuteResponse = execute_chain(request, state.resolver.clone()).await;
    if response.error.is_some() {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
    } else {
        Json(response).into_response()
    }
}

/// Wrap a render session's chunk stream as a streaming HTML response.
pub fn stream_response(chunks: BoxStream<'static, String>) -> Response {
    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Render a tree as the streamed response body: chunked HTML first, then
/// deferred follow-up scripts as they complete.
pub fn render_response(session: RenderSession, root: Vnode) -> Response {
    stream_response(session.into_stream(root))
}
