use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use priceadj_pipeline::{run_and_record, RecordedRun, RunItem, RunRecord, Trigger};

use crate::middleware::RequestId;

use super::{map_pipeline_error, map_store_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TriggerRunQuery {
    /// Business date to run as; today in the business timezone when omitted.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunDetail {
    #[serde(flatten)]
    run: RunRecord,
    items: Vec<RunItem>,
}

/// Run the pipeline now and answer once the run is recorded.
pub(super) async fn trigger_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<TriggerRunQuery>,
) -> Result<(StatusCode, Json<ApiResponse<RecordedRun>>), ApiError> {
    let recorded = run_and_record(
        &state.pipeline,
        state.ledger.as_ref(),
        Trigger::Api,
        query.date,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok((StatusCode::CREATED, ApiResponse::new(recorded, req_id.0)))
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ApiResponse<Vec<RunRecord>>>, ApiError> {
    let runs = state
        .ledger
        .list_runs(normalize_limit(query.limit))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(runs, req_id.0))
}

pub(super) async fn get_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<i64>,
) -> Result<Json<ApiResponse<RunDetail>>, ApiError> {
    let run = state
        .ledger
        .get_run(run_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
    let items = state
        .ledger
        .list_run_items(run_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(RunDetail { run, items }, req_id.0))
}
