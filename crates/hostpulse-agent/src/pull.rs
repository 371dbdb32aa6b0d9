// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! On-demand metrics.
//!
//! - `GET /metrics` - a freshly sampled payload as JSON. Requires
//!   `Authorization: Bearer <auth_key>`.

use crate::config::CollectorsConfig;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hostpulse_delivery::SharedKey;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const METRICS_ENDPOINT_PATH: &str = "/metrics";

#[derive(Clone)]
pub struct PullState {
    pub key: SharedKey,
    pub agent_id: Arc<str>,
    pub collectors: Arc<CollectorsConfig>,
}

pub fn router(state: PullState) -> Router {
    Router::new()
        .route(METRICS_ENDPOINT_PATH, get(metrics))
        .fallback(not_found)
        .with_state(state)
}

/// Serves until `cancel` fires, then drains open requests.
pub async fn serve(
    listener: TcpListener,
    state: PullState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics endpoint listening on {addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            debug!("Metrics endpoint shutting down");
        })
        .await
}

async fn metrics(State(state): State<PullState>, headers: HeaderMap) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !state.key.authorizes(authorization) {
        warn!("Rejected /metrics request without valid credentials");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    info!("Received /metrics request");
    let payload = state
        .collectors
        .sampler_set()
        .sample_all(&state.agent_id)
        .await;

    match serde_json::to_vec(&payload) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics response: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response").into_response()
        }
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DockerConfig, LogCollectorConfig, RedisConfig, Toggle};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn only_memory() -> CollectorsConfig {
        let off = Toggle { enabled: false };
        CollectorsConfig {
            cpu: off.clone(),
            mem: Toggle { enabled: true },
            net: off.clone(),
            disk: off.clone(),
            ports: off.clone(),
            host: off,
            docker: DockerConfig::default(),
            redis: RedisConfig::default(),
            log: LogCollectorConfig::default(),
        }
    }

    fn state() -> PullState {
        PullState {
            key: SharedKey::new("pull-secret"),
            agent_id: Arc::from("agent-pull"),
            collectors: Arc::new(only_memory()),
        }
    }

    fn request(authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(METRICS_ENDPOINT_PATH);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn missing_or_wrong_credentials_are_rejected() {
        for authorization in [None, Some("Bearer nope"), Some("pull-secret")] {
            let response = router(state())
                .oneshot(request(authorization))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body");
            assert_eq!(&body[..], b"Unauthorized");
        }
    }

    #[tokio::test]
    async fn authorized_request_gets_fresh_payload() {
        let response = router(state())
            .oneshot(request(Some("Bearer pull-secret")))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["agent_id"], "agent-pull");
        assert!(payload["memory"]["total"].as_u64().is_some());
        assert!(payload.get("cpu").is_none());
        assert!(payload["timestamp"].as_i64().is_some());
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
