//! Health check handlers for stream workers.
//!
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`): Redis plus any registered [`ReadinessProbe`]
//! - Stream monitoring (`/stream/info`)
//! - Prometheus metrics (`/metrics`)

use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::consumer::StreamConsumer;
use crate::metrics;

/// Extra dependency checked by `/ready`, e.g. the worker's database pool.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

#[derive(Clone)]
pub struct HealthState {
    pub redis: Arc<ConnectionManager>,
    pub app_name: String,
    pub app_version: String,
    consumer: StreamConsumer,
    probes: Vec<Arc<dyn ReadinessProbe>>,
}

impl HealthState {
    pub fn new(
        redis: Arc<ConnectionManager>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            consumer: StreamConsumer::new(redis.clone(), config.clone()),
            redis,
            app_name: app_name.into(),
            app_version: app_version.into(),
            probes: Vec::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probes.push(probe);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// Always OK while the process serves HTTP.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// 200 only when Redis answers `PING` and every probe passes.
pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let mut checks = Map::new();
    let mut ready = true;

    let mut conn = (*state.redis).clone();
    let ping: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    let redis_check = match ping {
        Ok(response) if response == "PONG" => "ok".to_string(),
        Ok(response) => {
            ready = false;
            format!("unexpected response: {}", response)
        }
        Err(e) => {
            ready = false;
            format!("error: {}", e)
        }
    };
    checks.insert("redis".to_string(), Value::String(redis_check));

    for probe in &state.probes {
        let outcome = match probe.check().await {
            Ok(()) => "ok".to_string(),
            Err(e) => {
                ready = false;
                format!("error: {}", e)
            }
        };
        checks.insert(probe.name().to_string(), Value::String(outcome));
    }

    readiness_response(ready, checks)
}

fn readiness_response(ready: bool, checks: Map<String, Value>) -> (StatusCode, Json<Value>) {
    let (code, status) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };
    (code, Json(json!({ "status": status, "checks": checks })))
}

/// Stream length and the group's pending backlog.
pub async fn stream_info_handler(
    State(state): State<HealthState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.consumer.stream_info().await {
        Ok(info) => Ok(Json(json!(info))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("Failed to get stream info: {}", e) })),
        )),
    }
}

/// Prometheus text format for scraping.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::metrics_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized. Call init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

pub fn health_router(state: HealthState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/stream/info", get(stream_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            name: "rag-worker".to_string(),
            version: "0.1.0".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"name\":\"rag-worker\""));
    }

    #[test]
    fn test_readiness_response_reports_failing_check() {
        let mut checks = Map::new();
        checks.insert("redis".to_string(), Value::String("ok".to_string()));
        checks.insert(
            "postgres".to_string(),
            Value::String("error: pool timed out".to_string()),
        );

        let (code, Json(body)) = readiness_response(false, checks);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["checks"]["postgres"], "error: pool timed out");
    }

    #[test]
    fn test_readiness_response_ready() {
        let (code, Json(body)) = readiness_response(true, Map::new());
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }
}
