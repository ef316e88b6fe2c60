//! API端点实现

use super::{ApiResponse, WebAppState};
use crate::probe::ordering::ProbeSnapshot;
use crate::probe::record::Record;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 探针详情：快照加完整历史
#[derive(Debug, Serialize)]
pub struct ProbeDetail {
    #[serde(flatten)]
    pub snapshot: ProbeSnapshot,
    pub records: Vec<Record>,
}

/// 静默请求体
#[derive(Debug, Deserialize)]
pub struct SilenceRequest {
    /// 从现在起静默的秒数
    pub seconds: u64,
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub probes: usize,
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(format!("探针不存在: {name}"))),
    )
        .into_response()
}

/// `GET /health`
pub async fn health(State(state): State<WebAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        uptime_seconds: (chrono::Utc::now() - state.start_time).num_seconds(),
        probes: state.probes.len(),
    })
}

/// `GET /api/v1/probes`，按严重程度排序
pub async fn list_probes(
    State(state): State<WebAppState>,
) -> Json<ApiResponse<Vec<ProbeSnapshot>>> {
    Json(ApiResponse::success(state.probes.sorted_snapshots()))
}

/// `GET /api/v1/probes/{name}`
pub async fn get_probe(State(state): State<WebAppState>, Path(name): Path<String>) -> Response {
    match state.probes.get(&name) {
        Some(probe) => {
            let detail = ProbeDetail {
                snapshot: probe.snapshot(),
                records: probe.records().iter().cloned().collect(),
            };
            Json(ApiResponse::success(detail)).into_response()
        }
        None => not_found(&name),
    }
}

/// `POST /api/v1/probes/{name}/silence`
pub async fn silence_probe(
    State(state): State<WebAppState>,
    Path(name): Path<String>,
    Json(request): Json<SilenceRequest>,
) -> Response {
    let Some(probe) = state.probes.get(&name) else {
        return not_found(&name);
    };

    let now = probe.clock().now();
    let seconds = i64::try_from(request.seconds).unwrap_or(i64::MAX);
    let until = chrono::Duration::try_seconds(seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
    probe.silence(until);
    info!("[{}] 通过API静默 {} 秒", name, request.seconds);

    Json(ApiResponse::success(probe.snapshot())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use crate::probe::check::Check;
    use crate::probe::outcome::Outcome;
    use crate::probe::record::RecordLog;
    use crate::probe::state::Probe;
    use crate::probe::ProbeSet;
    use crate::web::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{DateTime, Utc};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StaticCheck;

    #[async_trait]
    impl Check for StaticCheck {
        async fn probe(&self) -> Outcome {
            Outcome::passed()
        }

        async fn alert(
            &self,
            _: &str,
            _: &str,
            _: u64,
            _: &RecordLog,
            _: DateTime<Utc>,
        ) -> Result<(), AlertError> {
            Ok(())
        }
    }

    fn state() -> WebAppState {
        let calm = Arc::new(Probe::new(Arc::new(StaticCheck), "calm", "all good", []).unwrap());
        let flaky = Arc::new(Probe::new(Arc::new(StaticCheck), "flaky", "often down", []).unwrap());
        calm.handle_outcome(Outcome::passed());
        flaky.handle_outcome(Outcome::failed_with("boom"));
        WebAppState::new(vec![calm, flaky].into_iter().collect::<ProbeSet>())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = build_router(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["probes"], 2);
    }

    #[tokio::test]
    async fn test_list_probes_sorted_by_severity() {
        let response = build_router(state())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/probes")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let names: Vec<&str> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["flaky", "calm"]);
        assert_eq!(json["data"][0]["score"], 10);
    }

    #[tokio::test]
    async fn test_get_probe_detail_and_missing() {
        let app = build_router(state());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/probes/flaky")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["description"], "often down");
        assert_eq!(json["data"]["records"].as_array().unwrap().len(), 1);
        assert_eq!(json["data"]["records"][0]["outcome"]["code"], "fail");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/probes/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_silence_probe() {
        let state = state();
        let probe = Arc::clone(state.probes.get("flaky").unwrap());
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/probes/flaky/silence")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"seconds": 3600}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["silenced"], true);
        assert!(probe.is_silenced());
    }
}
