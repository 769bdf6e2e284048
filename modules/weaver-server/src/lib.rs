//! Axum glue: a streaming page route helper and the signal-chain execute
//! endpoint. The host application owns the router; this crate contributes
//! the runtime pieces.

pub mod routes;

pub use routes::{
    execute_handler, init_tracing, render_response, router, stream_response, AppState,
};
