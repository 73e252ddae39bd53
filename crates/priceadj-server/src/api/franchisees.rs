use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use priceadj_core::{
    format_dmy, AdjustmentSession, FranchiseeAdjustmentRecord, PricingRule, ServiceAdjustmentRow,
    SessionStatus,
};
use priceadj_pipeline::{build_franchisee_snapshot, franchisee_statuses, FranchiseeStatusRow, Mail};

use crate::middleware::RequestId;

use super::{error_chain, map_pipeline_error, map_store_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SaveRecordBody {
    pub rows: Vec<ServiceAdjustmentRow>,
    /// Keeps the stored rules (or the session's) when omitted.
    pub pricing_rules: Option<Vec<PricingRule>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OptOutBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RefreshQuery {
    #[serde(default)]
    pub reapply_rules: bool,
}

async fn editable_session(
    state: &AppState,
    request_id: &str,
    session_id: i64,
) -> Result<AdjustmentSession, ApiError> {
    let session = state
        .pipeline
        .store
        .load_session(session_id)
        .await
        .map_err(|e| map_store_error(request_id.to_string(), &e))?;

    if session.status == SessionStatus::Completed {
        return Err(ApiError::new(
            request_id,
            "conflict",
            format!("session {session_id} is completed"),
        ));
    }
    Ok(session)
}

async fn existing_record(
    state: &AppState,
    request_id: &str,
    session_id: i64,
    franchisee_id: i64,
) -> Result<FranchiseeAdjustmentRecord, ApiError> {
    state
        .pipeline
        .store
        .find_franchisee_record(session_id, franchisee_id)
        .await
        .map_err(|e| map_store_error(request_id.to_string(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                request_id,
                "not_found",
                format!("no adjustment record for franchisee {franchisee_id} in session {session_id}"),
            )
        })
}

fn reject_opted_out(
    record: &FranchiseeAdjustmentRecord,
    request_id: &str,
) -> Result<(), ApiError> {
    if record.is_opted_out() {
        return Err(ApiError::new(
            request_id,
            "conflict",
            format!(
                "franchisee {} has opted out of this session",
                record.franchisee_id
            ),
        ));
    }
    Ok(())
}

fn with_confirmation(rows: &[ServiceAdjustmentRow], confirmed: bool) -> Vec<ServiceAdjustmentRow> {
    rows.iter()
        .cloned()
        .map(|row| ServiceAdjustmentRow { confirmed, ..row })
        .collect()
}

/// Session status of every reportable franchisee, most advanced first.
pub(super) async fn list_franchisee_statuses(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(session_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<FranchiseeStatusRow>>>, ApiError> {
    let store = state.pipeline.store.as_ref();
    store
        .load_session(session_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    let rows = franchisee_statuses(
        store,
        session_id,
        &state.pipeline.directory.excluded_franchisee_ids,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(rows, req_id.0))
}

pub(super) async fn get_franchisee_record(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((session_id, franchisee_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<FranchiseeAdjustmentRecord>>, ApiError> {
    let record = existing_record(&state, &req_id.0, session_id, franchisee_id).await?;
    Ok(ApiResponse::new(record, req_id.0))
}

pub(super) async fn save_franchisee_record(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((session_id, franchisee_id)): Path<(i64, i64)>,
    Json(body): Json<SaveRecordBody>,
) -> Result<Json<ApiResponse<FranchiseeAdjustmentRecord>>, ApiError> {
    let session = editable_session(&state, &req_id.0, session_id).await?;
    let store = &state.pipeline.store;

    let existing = store
        .find_franchisee_record(session_id, franchisee_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;
    if let Some(record) = &existing {
        reject_opted_out(record, &req_id.0)?;
    }

    let rules = body.pricing_rules.unwrap_or_else(|| match existing {
        Some(record) if !record.pricing_rules.is_empty() => record.pricing_rules,
        _ => session.pricing_rules,
    });

    let record = store
        .save_franchisee_record(session_id, franchisee_id, &body.rows, &rules)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    tracing::info!(
        session_id,
        franchisee_id,
        rows = record.rows.len(),
        "api: franchisee adjustments saved"
    );

    Ok(ApiResponse::new(record, req_id.0))
}

/// Rebuild the franchisee's sheet from the current services.
pub(super) async fn refresh_franchisee_record(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((session_id, franchisee_id)): Path<(i64, i64)>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<ApiResponse<FranchiseeAdjustmentRecord>>, ApiError> {
    let session = editable_session(&state, &req_id.0, session_id).await?;

    let ctx = &state.pipeline;
    let record = build_franchisee_snapshot(
        ctx.store.as_ref(),
        &ctx.directory,
        ctx.business_today(),
        &session,
        franchisee_id,
        query.reapply_rules,
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(record, req_id.0))
}

pub(super) async fn confirm_all(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((session_id, franchisee_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<FranchiseeAdjustmentRecord>>, ApiError> {
    editable_session(&state, &req_id.0, session_id).await?;
    let record = existing_record(&state, &req_id.0, session_id, franchisee_id).await?;
    reject_opted_out(&record, &req_id.0)?;

    let rows = with_confirmation(&record.rows, true);
    let record = state
        .pipeline
        .store
        .save_franchisee_record(session_id, franchisee_id, &rows, &record.pricing_rules)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(record, req_id.0))
}

/// Record the reason, unconfirm every row and tell the administrators.
pub(super) async fn opt_out(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((session_id, franchisee_id)): Path<(i64, i64)>,
    Json(body): Json<OptOutBody>,
) -> Result<Json<ApiResponse<FranchiseeAdjustmentRecord>>, ApiError> {
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "an opt-out reason is required",
        ));
    }

    let session = editable_session(&state, &req_id.0, session_id).await?;
    let ctx = &state.pipeline;
    let franchisee = ctx
        .store
        .load_franchisee(franchisee_id)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    let record = ctx
        .store
        .set_opt_out_reason(session_id, franchisee_id, Some(reason))
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    let record = if record.rows.iter().any(|row| row.confirmed) {
        ctx.store
            .save_franchisee_record(
                session_id,
                franchisee_id,
                &with_confirmation(&record.rows, false),
                &record.pricing_rules,
            )
            .await
            .map_err(|e| map_store_error(req_id.0.clone(), &e))?
    } else {
        record
    };

    let mail = Mail {
        recipients: ctx.directory.opt_out_recipients.clone(),
        bcc: ctx.directory.opt_out_bcc.clone(),
        subject: format!(
            "{} opted out of Price Increase",
            franchisee.company_name
        ),
        body: format!(
            "Franchisee {} has decided to opt out of this Price Increase period which has \
             effective date on {} with the following reason:\n\n{reason}",
            franchisee.company_name,
            format_dmy(session.effective_date())
        ),
        attachments: Vec::new(),
    };
    ctx.notifier.send_mail(&mail).await.map_err(|e| {
        tracing::error!(session_id, franchisee_id, error = %e, "api: opt-out notification failed");
        ApiError::internal(
            req_id.0.clone(),
            "opt-out saved but administrators could not be notified",
            error_chain(&e),
        )
    })?;

    tracing::info!(session_id, franchisee_id, "api: franchisee opted out");

    Ok(ApiResponse::new(record, req_id.0))
}

pub(super) async fn reinstate(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((session_id, franchisee_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<FranchiseeAdjustmentRecord>>, ApiError> {
    editable_session(&state, &req_id.0, session_id).await?;
    existing_record(&state, &req_id.0, session_id, franchisee_id).await?;

    let record = state
        .pipeline
        .store
        .set_opt_out_reason(session_id, franchisee_id, None)
        .await
        .map_err(|e| map_store_error(req_id.0.clone(), &e))?;

    tracing::info!(session_id, franchisee_id, "api: franchisee reinstated");

    Ok(ApiResponse::new(record, req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn row(confirmed: bool) -> ServiceAdjustmentRow {
        ServiceAdjustmentRow {
            service_id: 1,
            service_type_id: 2,
            service_name: "Office clean".to_string(),
            current_price: Decimal::new(10_000, 2),
            adjustment: Decimal::new(500, 2),
            confirmed,
            customer_id: 3,
            customer_entity_id: "C-3".to_string(),
            customer_name: "Acme".to_string(),
            franchisee_id: 4,
            franchisee_name: "North".to_string(),
            national_account: false,
        }
    }

    #[test]
    fn with_confirmation_sets_every_row() {
        let rows = vec![row(true), row(false)];
        assert!(with_confirmation(&rows, true).iter().all(|r| r.confirmed));
        assert!(with_confirmation(&rows, false).iter().all(|r| !r.confirmed));
    }
}
