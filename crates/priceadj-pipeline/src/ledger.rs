//! Audit trail of processor runs and their per-item outcomes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(StoreError::Decode(format!("unknown run status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: RunStatus,
    pub business_date: NaiveDate,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_processed: i32,
    pub items_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Succeeded,
    Dropped,
    Failed,
}

impl ItemOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ItemOutcome::Succeeded => "succeeded",
            ItemOutcome::Dropped => "dropped",
            ItemOutcome::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ItemOutcome {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(ItemOutcome::Succeeded),
            "dropped" => Ok(ItemOutcome::Dropped),
            "failed" => Ok(ItemOutcome::Failed),
            other => Err(StoreError::Decode(format!("unknown item outcome '{other}'"))),
        }
    }
}

/// One keyed outcome within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunItem {
    pub key: String,
    pub stage: String,
    pub outcome: ItemOutcome,
    pub message: Option<String>,
}

/// Persistence for run bookkeeping. Transitions follow
/// `queued -> running -> succeeded | failed`.
#[async_trait]
pub trait RunLedger: Send + Sync + 'static {
    async fn create_run(
        &self,
        trigger_source: &str,
        business_date: NaiveDate,
    ) -> Result<RunRecord, StoreError>;

    async fn start_run(&self, run_id: i64) -> Result<(), StoreError>;

    async fn record_items(&self, run_id: i64, items: &[RunItem]) -> Result<(), StoreError>;

    async fn complete_run(
        &self,
        run_id: i64,
        items_processed: i32,
        items_failed: i32,
    ) -> Result<(), StoreError>;

    async fn fail_run(&self, run_id: i64, error_message: &str) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: i64) -> Result<RunRecord, StoreError>;

    /// Most recent runs first.
    async fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>, StoreError>;

    async fn list_run_items(&self, run_id: i64) -> Result<Vec<RunItem>, StoreError>;
}
