//! HTTP transport
//!
//! A thin axum layer in front of the pool:
//! - `POST /publish` decodes a JSON `PublishRequest` and hands it to the pool
//! - `GET /health` reports liveness and the number of pooled connections
//!
//! Status mapping lives in the `IntoResponse` impl for `GatewayError`:
//! malformed input is a bare 400, broker failures are 502 carrying the
//! upstream error text, bounded waits that elapsed are 504.

use std::fmt::Display;
use std::future::Future;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::pool::{ConnectionPool, PublishRequest};
use crate::transport::message::HealthResponse;
use crate::utils::GatewayError;

#[derive(Clone)]
pub struct AppState {
    pub pool: ConnectionPool,
}

pub fn router(pool: ConnectionPool) -> Router {
    Router::new()
        .route("/publish", post(publish))
        .route("/health", get(health))
        .with_state(AppState { pool })
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn start_http_server<F>(addr: &str, pool: ConnectionPool, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP gateway listening on http://{addr}");
    serve(listener, pool, shutdown).await
}

pub async fn serve<F>(listener: TcpListener, pool: ConnectionPool, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(pool))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves once `signal` fires.
///
/// A signal that cannot be installed never resolves, so the server keeps
/// running instead of shutting down at startup.
pub async fn wait_for_shutdown<F, E>(signal: F)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match signal.await {
        Ok(()) => info!("Shutdown signal received. Draining connections."),
        Err(e) => {
            warn!(error = %e, "cannot listen for shutdown signal, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}

async fn publish(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, GatewayError> {
    let request: PublishRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

    state.pool.publish(&request).await?;
    Ok(StatusCode::OK)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.pool.len().await,
    })
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::InvalidRequest(reason) => {
                debug!(%reason, "rejected publish request");
                StatusCode::BAD_REQUEST.into_response()
            }
            GatewayError::Timeout { .. } => {
                warn!(error = %self, "publish request timed out");
                (StatusCode::GATEWAY_TIMEOUT, self.to_string()).into_response()
            }
            _ => {
                warn!(error = %self, "publish request failed");
                (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
            }
        }
    }
}
