//! HTTP server and route table.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use chatitp_engine::ConversationEngine;

use crate::{health_api, llm_api};

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub engine: Arc<ConversationEngine>,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_api::root))
        .route("/api/health", get(health_api::get_health))
        .nest("/llm", llm_api::router())
        .with_state(state)
}

/// Serve `app` on `addr` until Ctrl-C.
#[instrument(skip(app))]
pub async fn start_server(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Gateway HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
