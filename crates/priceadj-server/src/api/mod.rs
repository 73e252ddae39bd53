mod franchisees;
mod runs;
mod sessions;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use priceadj_core::CoreError;
use priceadj_pipeline::{PipelineContext, PipelineError, RunLedger, StoreError};

use crate::middleware::{
    alert_on_internal_error, enforce_rate_limit, request_id, require_bearer_auth, AlertState,
    AuthState, InternalFailure, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineContext,
    pub ledger: Arc<dyn RunLedger>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
    /// Full error chain of an internal failure; never serialized.
    #[serde(skip)]
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
            detail: None,
        }
    }

    /// A 500 whose `detail` is reported to maintainers but not to the caller.
    pub fn internal(
        request_id: impl Into<String>,
        message: impl Into<String>,
        detail: String,
    ) -> Self {
        Self {
            detail: Some(detail),
            ..Self::new(request_id, "internal_error", message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = self.detail.clone();
        let mut response = (status, Json(self)).into_response();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            response.extensions_mut().insert(InternalFailure(
                detail.unwrap_or_else(|| "unspecified internal error".to_string()),
            ));
        }
        response
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

/// `error` followed by each of its sources, one per line.
pub(super) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

pub(super) fn map_store_error(request_id: String, error: &StoreError) -> ApiError {
    match error {
        StoreError::NotFound { .. } => ApiError::new(request_id, "not_found", error.to_string()),
        StoreError::InvalidTransition(_) | StoreError::Conflict(_) => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        StoreError::Decode(_) | StoreError::Backend(_) => {
            tracing::error!(error = %error, "api: store operation failed");
            ApiError::internal(request_id, "store operation failed", error_chain(error))
        }
    }
}

pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::Store(e) => map_store_error(request_id, e),
        PipelineError::Core(CoreError::InvalidSession(_)) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        PipelineError::Core(CoreError::InvalidTransition { .. }) => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        _ => {
            tracing::error!(error = %error, "api: pipeline operation failed");
            ApiError::internal(request_id, "pipeline operation failed", error_chain(error))
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/api/v1/sessions/current", get(sessions::current_session))
        .route("/api/v1/sessions/{session_id}", get(sessions::get_session))
        .route(
            "/api/v1/sessions/{session_id}/rules",
            put(sessions::update_session_rules),
        )
        .route(
            "/api/v1/sessions/{session_id}/franchisees",
            get(franchisees::list_franchisee_statuses),
        )
        .route(
            "/api/v1/sessions/{session_id}/franchisees/{franchisee_id}",
            get(franchisees::get_franchisee_record).put(franchisees::save_franchisee_record),
        )
        .route(
            "/api/v1/sessions/{session_id}/franchisees/{franchisee_id}/refresh",
            post(franchisees::refresh_franchisee_record),
        )
        .route(
            "/api/v1/sessions/{session_id}/franchisees/{franchisee_id}/confirm-all",
            post(franchisees::confirm_all),
        )
        .route(
            "/api/v1/sessions/{session_id}/franchisees/{franchisee_id}/opt-out",
            post(franchisees::opt_out),
        )
        .route(
            "/api/v1/sessions/{session_id}/franchisees/{franchisee_id}/reinstate",
            post(franchisees::reinstate),
        )
        .route("/api/v1/runs", get(runs::list_runs).post(runs::trigger_run))
        .route("/api/v1/runs/{run_id}", get(runs::get_run))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let alerts = AlertState {
        notifier: Arc::clone(&state.pipeline.notifier),
        recipients: state.pipeline.directory.maintainers.clone(),
    };
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id))
                .layer(axum::middleware::from_fn_with_state(
                    alerts,
                    alert_on_internal_error,
                )),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.pipeline.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
