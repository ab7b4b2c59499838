//! HTTP control surface.
//!
//! | route          | purpose                                        |
//! |----------------|------------------------------------------------|
//! | `GET /`        | service status and cached connection flag      |
//! | `GET /health`  | live Docker ping, `503` when unavailable       |
//! | `GET /hosts`   | hostnames currently in the managed region      |
//! | `POST /refresh`| force a full scan, then report the region      |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use log::{debug, info};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::control::Controller;
use crate::runtime::Health;
use crate::types::HostnameSet;

type AppState = Arc<Controller>;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub monitoring: &'static str,
    pub docker_connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HealthResponse {
    Ok {
        status: &'static str,
        docker_connected: bool,
    },
    Error {
        status: &'static str,
        detail: String,
    },
}

#[derive(Debug, Serialize)]
pub struct HostsResponse {
    pub managed_hosts: HostnameSet,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
    pub managed_hosts: HostnameSet,
}

pub fn build_router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/hosts", get(hosts))
        .route("/refresh", post(refresh))
        .with_state(controller)
}

/// Binds `addr` and serves until the task is aborted.
pub async fn serve(addr: SocketAddr, controller: Arc<Controller>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP control surface listening on {}", addr);
    axum::serve(listener, build_router(controller)).await?;
    Ok(())
}

pub async fn root(State(controller): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "running",
        monitoring: "docker_events",
        docker_connected: controller.status().connected,
    })
}

pub async fn health(State(controller): State<AppState>) -> impl IntoResponse {
    debug!("GET /health");
    match controller.health().await {
        Health::Ok => (
            StatusCode::OK,
            Json(HealthResponse::Ok {
                status: "ok",
                docker_connected: true,
            }),
        ),
        Health::Unavailable(detail) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::Error {
                status: "error",
                detail,
            }),
        ),
    }
}

pub async fn hosts(State(controller): State<AppState>) -> Json<HostsResponse> {
    Json(HostsResponse {
        managed_hosts: controller.list_managed_hosts().await,
    })
}

pub async fn refresh(State(controller): State<AppState>) -> Json<RefreshResponse> {
    info!("POST /refresh");
    Json(RefreshResponse {
        status: "refreshed",
        managed_hosts: controller.force_refresh().await,
    })
}
