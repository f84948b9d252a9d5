//! Thin HTTP surface (`spec.md` §6): session CRUD, GPU inventory reads,
//! health probe, permissive CORS. No business logic lives here — handlers
//! translate requests into `SessionEngine` calls and engine errors into
//! status codes.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sandman_protocol::{
    AvailableResponse, CreateSessionRequest, ErrorResponse, GpusResponse, HealthResponse,
    MessageResponse, ProfilesResponse,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::engine::SessionEngine;
use crate::error::EngineError;
use crate::gpu_inventory::GpuInventory;

const MAX_REQUEST_BODY_BYTES: usize = 65_536;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub gpu_inventory: Arc<dyn GpuInventory>,
    pub service_name: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    // Permissive CORS with credentials allowed (spec.md §6). A wildcard
    // origin/methods/headers can't be combined with `allow_credentials(true)`
    // (tower_http panics building the router), so any-origin-plus-credentials
    // is expressed by mirroring the request back instead.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/sessions", post(create_session).get(list_sessions).delete(delete_all_sessions))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/gpus", get(list_gpus))
        .route("/gpus/profiles", get(list_profiles))
        .route("/gpus/available", get(list_available))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.service_name,
    })
}

/// Ambient observability endpoint: lifetime counters plus a snapshot of
/// current pool pressure. Not a Prometheus exposition — no metrics crate in
/// this stack's dependency set, so this mirrors the teacher's own
/// JSON-counters-on-a-debug-route convention instead.
async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.engine.metrics_snapshot();
    let free_gpus = state.engine.gpu_pool().snapshot_free().await.len();
    let sessions_active = state.engine.store().list_all().await.map(|v| v.len()).unwrap_or(0);
    Json(serde_json::json!({
        "sessions_created_total": snapshot.sessions_created_total,
        "sessions_deleted_total": snapshot.sessions_deleted_total,
        "sessions_reaped_total": snapshot.sessions_reaped_total,
        "creation_failures_total": snapshot.creation_failures_total,
        "sessions_active": sessions_active,
        "gpus_free": free_gpus,
    }))
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Response, EngineError> {
    let resp = state.engine.create_session(req).await?;
    Ok((StatusCode::CREATED, Json(resp)).into_response())
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, EngineError> {
    let record = state
        .engine
        .store()
        .get(id)
        .await
        .map_err(EngineError::RuntimeFault)?
        .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
    Ok(Json(record).into_response())
}

async fn list_sessions(State(state): State<AppState>) -> Result<Response, EngineError> {
    let records = state
        .engine
        .store()
        .list_all()
        .await
        .map_err(EngineError::RuntimeFault)?;
    Ok(Json(records).into_response())
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, EngineError> {
    state.engine.delete_session(id).await?;
    Ok(Json(MessageResponse {
        message: format!("session {id} deleted"),
    })
    .into_response())
}

async fn delete_all_sessions(State(state): State<AppState>) -> Result<Response, EngineError> {
    let summary = state.engine.delete_all_sessions().await?;
    Ok(Json(MessageResponse {
        message: format!("deleted {} session(s)", summary.deleted),
    })
    .into_response())
}

async fn list_gpus(State(state): State<AppState>) -> Json<GpusResponse> {
    let gpus = state.engine.gpu_pool().snapshot_all().await;
    Json(GpusResponse {
        count: gpus.len(),
        gpus,
    })
}

async fn list_profiles(State(state): State<AppState>) -> Json<ProfilesResponse> {
    Json(ProfilesResponse {
        profiles: state.gpu_inventory.profiles(),
    })
}

async fn list_available(State(state): State<AppState>) -> Json<AvailableResponse> {
    let available_instances = state.engine.gpu_pool().snapshot_free().await;
    Json(AvailableResponse {
        count: available_instances.len(),
        available_instances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_runtime::FakeContainerRuntime;
    use crate::gpu_inventory::FakeGpuInventory;
    use crate::identity::RsaIdentityMinter;
    use crate::pools::{GpuPool, IpPool, PortPool};
    use crate::store::SessionStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use sandman_protocol::GpuSliceDescriptor;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let slices = vec![GpuSliceDescriptor {
            uuid: "GPU-1".to_string(),
            profile_name: "3g.20gb".to_string(),
            compute_slices: 3,
            memory_slices: 4,
            memory_bytes: 20 * 1024 * 1024 * 1024,
        }];
        let gpu_inventory: Arc<dyn GpuInventory> = Arc::new(FakeGpuInventory::new(slices.clone()));
        let gpu_pool = GpuPool::new(slices);
        let port_pool = PortPool::new(10000, 10001);
        let ip_pool = IpPool::new("10.100.0.0/16", 100, 101, "sandman_worknet".to_string());
        let store = SessionStore::open_in_memory().await.unwrap();
        let runtime = Arc::new(FakeContainerRuntime::new());
        let identity_minter = Arc::new(RsaIdentityMinter);

        let engine = Arc::new(SessionEngine::new(
            gpu_pool,
            port_pool,
            ip_pool,
            store,
            runtime,
            identity_minter,
            "/tmp/sandman-web-test".to_string(),
            "sandman_worknet".to_string(),
        ));

        AppState {
            engine,
            gpu_inventory,
            service_name: "sandman".to_string(),
        }
    }

    #[tokio::test]
    async fn healthz_reports_service_name() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_sessions_is_empty_array_not_null() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"[]");
    }

    #[tokio::test]
    async fn get_missing_session_is_404() {
        let app = build_router(test_state().await);
        let id = Uuid::new_v4();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_session_returns_201() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({"user_id": "alice", "mig_profile": "3g.20gb"});
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn create_session_with_empty_user_id_is_400() {
        let app = build_router(test_state().await);
        let body = serde_json::json!({"user_id": ""});
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
