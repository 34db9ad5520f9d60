use axum::{extract::State, routing::get, Json, Router};
use listener_engine::{EngineHealth, StatusTracker};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Liveness endpoint for orchestration probes. Always answers 200 no matter
/// what the pipeline is doing; `/health` adds an advisory snapshot.
pub fn build_router(status: StatusTracker) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(status)
}

async fn root() -> &'static str {
    "OK"
}

async fn health(State(status): State<StatusTracker>) -> Json<EngineHealth> {
    Json(status.snapshot())
}

pub async fn serve(port: u16, status: StatusTracker) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("health endpoint listening on http://{addr}");
    axum::serve(listener, build_router(status)).await?;
    Ok(())
}
