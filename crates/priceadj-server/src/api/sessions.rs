use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use priceadj_core::{AdjustmentSession, NewSession, PricingRule, SessionStatus};
use priceadj_pipeline::SessionFilter;

use crate::middleware::RequestId;

use super::{map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SessionsQuery {
    pub effective_date: Option<NaiveDate>,
    pub status: Option<SessionStatus>,
    pub accepting_input_on: Option<NaiveDate>,
    #[serde(default)]
    pub exclude_completed: bool,
}

impl From<SessionsQuery> for SessionFilter {
    fn from(query: SessionsQuery) -> Self {
        Self {
            effective_date: query.effective_date,
            status: query.status,
            accepting_input_on: query.accepting_input_on,
            exclude_completed: query.exclude_completed,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateRulesBody {
    pub pricing_rules: Vec<PricingRule>,
}

pub(super) async fn list_sessions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<ApiResponse<Vec<AdjustmentSession>>>, ApiError> {
    let sessions = state
        .pipeline
        .store
        .list_sessions(&query.into())
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(sessions, req_id.0))
}

/// The session that is not yet completed, or `null`.
pub(super) async fn current_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Option<AdjustmentSession>>>, ApiError> {
    let session = state
        .pipeline
        .store
        .current_session()
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(session, req_id.0))
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(session_id): Path<i64>,
) -> Result<Json<ApiResponse<AdjustmentSession>>, ApiError> {
    let session = state
        .pipeline
        .store
        .load_session(session_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(session, req_id.0))
}

pub(super) async fn create_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(input): Json<NewSession>,
) -> Result<(StatusCode, Json<ApiResponse<AdjustmentSession>>), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.to_string()))?;

    let session = state
        .pipeline
        .store
        .create_session(&input)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    tracing::info!(
        session_id = session.id,
        effective_date = %session.effective_date(),
        "api: session created"
    );

    Ok((StatusCode::CREATED, ApiResponse::new(session, req_id.0)))
}

pub(super) async fn update_session_rules(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(session_id): Path<i64>,
    Json(body): Json<UpdateRulesBody>,
) -> Result<Json<ApiResponse<AdjustmentSession>>, ApiError> {
    let store = &state.pipeline.store;
    let session = store
        .load_session(session_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    if session.status == SessionStatus::Completed {
        return Err(ApiError::new(
            req_id.0,
            "conflict",
            format!("session {session_id} is completed"),
        ));
    }

    let session = store
        .update_session_rules(session_id, &body.pricing_rules)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(session, req_id.0))
}
