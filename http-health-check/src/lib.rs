//! A minimal `/healthz` server, used only as a fixture in `netx-http`'s integration tests
//! (§10.5: test tooling).

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

fn router() -> Router {
    Router::new().route("/healthz", get(|| async { "" }))
}

/// Binds `addr` and serves until the process exits or the task is aborted.
pub async fn serve(addr: impl Into<SocketAddr>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr.into()).await?;

    serve_listener(listener).await
}

/// Serves on an already-bound `listener`, so callers that need to know the assigned port ahead
/// of time (e.g. binding to `127.0.0.1:0` in a test) can read it back before the server starts
/// accepting.
pub async fn serve_listener(listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, router().into_make_service()).await
}
