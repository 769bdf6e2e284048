use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use weaver_common::Config;
use weaver_logic::MapResolver;
use weaver_server::{init_tracing, router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env();

    // The standalone binary serves the runtime routes with an empty module
    // table; embedders register their bundle output on the resolver before
    // building the state.
    let resolver = Arc::new(MapResolver::new());
    let state = Arc::new(AppState { resolver, config: config.clone() });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(host = %config.host, port = config.port, "weaver server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
