/*
 * Douro - Hosting Infrastructure Exporter
 * Copyright (C) 2025 Douro Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! HTTP endpoints: Prometheus scrape target and health probes.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json},
    routing::get,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::core::health::HealthMonitor;
use crate::core::metrics::DouroMetrics;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Bind an endpoint port; a failure here is a startup failure.
pub async fn bind(port: u16) -> std::io::Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await
}

/// Serve `GET /metrics` on a pre-bound listener.
pub async fn run_metrics_server(
    metrics: Arc<DouroMetrics>,
    listener: tokio::net::TcpListener,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route("/", get(index))
        .route("/metrics", get(serve_metrics))
        .layer(CorsLayer::permissive())
        .with_state(metrics);

    if let Ok(addr) = listener.local_addr() {
        info!("Metrics endpoint listening on http://{}/metrics", addr);
    }
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    "Douro hosting infrastructure exporter\n\nMetrics: /metrics\n"
}

async fn serve_metrics(State(metrics): State<Arc<DouroMetrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        metrics.render(),
    )
}

/// Serve `GET /health`, `/ready` and `/live` on a pre-bound listener.
pub async fn run_health_server(
    health: Arc<HealthMonitor>,
    listener: tokio::net::TcpListener,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route("/health", get(serve_health))
        .route("/ready", get(serve_ready))
        .route("/live", get(serve_live))
        .layer(CorsLayer::permissive())
        .with_state(health);

    if let Ok(addr) = listener.local_addr() {
        info!("Health endpoints listening on http://{}/health", addr);
    }
    axum::serve(listener, app).await?;
    Ok(())
}

async fn serve_health(State(health): State<Arc<HealthMonitor>>) -> impl IntoResponse {
    let status = health.status();
    // degraded still serves traffic; only unhealthy flips the status code
    let code = if status.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(status))
}

async fn serve_ready(State(health): State<Arc<HealthMonitor>>) -> impl IntoResponse {
    let snapshot = health.status();
    if health.is_ready() {
        (
            StatusCode::OK,
            Json(json!({"status": "ready", "timestamp": snapshot.timestamp})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not_ready", "timestamp": snapshot.timestamp})),
        )
    }
}

async fn serve_live(State(health): State<Arc<HealthMonitor>>) -> impl IntoResponse {
    let snapshot = health.status();
    Json(json!({
        "status": "alive",
        "timestamp": snapshot.timestamp,
        "uptime_seconds": snapshot.uptime_seconds,
    }))
}
