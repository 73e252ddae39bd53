//! Values that flow between pipeline stages, one per (session, customer).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use priceadj_core::{Frequency, ServiceAdjustmentRow};

/// Which trigger window produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Effective date is one lead time away: tell the customer.
    Notify,
    /// Effective date is today: apply the new prices.
    Process,
}

impl Phase {
    fn check_prefix(self) -> &'static str {
        match self {
            Phase::Notify => "CheckCustomerToNotify",
            Phase::Process => "CheckCustomerToProcess",
        }
    }

    fn revalidated_prefix(self) -> &'static str {
        match self {
            Phase::Notify => "NotifyCustomer",
            Phase::Process => "ProcessCustomer",
        }
    }

    fn completed_prefix(self) -> &'static str {
        match self {
            Phase::Notify => "NotifiedCustomer",
            Phase::Process => "ProcessedCustomer",
        }
    }
}

/// Who launched a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduler,
    Api,
    Cli,
}

impl Trigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Scheduler => "scheduler",
            Trigger::Api => "api",
            Trigger::Cli => "cli",
        }
    }
}

/// Output of discovery: a customer's rows in one due session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub phase: Phase,
    pub session_id: i64,
    pub effective_date: NaiveDate,
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_entity_id: String,
    pub franchisee_id: i64,
    pub franchisee_name: String,
    pub rows: Vec<ServiceAdjustmentRow>,
}

impl WorkItem {
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}_{}", self.phase.check_prefix(), self.customer_id)
    }
}

/// A row that survived revalidation, paired with its live visit frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateService {
    pub row: ServiceAdjustmentRow,
    pub frequency: Frequency,
}

/// Output of revalidation: only services that are still live remain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevalidatedItem {
    pub phase: Phase,
    pub session_id: i64,
    pub effective_date: NaiveDate,
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_entity_id: String,
    pub franchisee_id: i64,
    pub franchisee_name: String,
    pub services: Vec<CandidateService>,
}

impl RevalidatedItem {
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}_{}", self.phase.revalidated_prefix(), self.customer_id)
    }

    /// Services that are confirmed with a non-zero delta.
    pub fn actionable(&self) -> impl Iterator<Item = &CandidateService> {
        self.services.iter().filter(|s| s.row.is_actionable())
    }

    #[must_use]
    pub fn has_actionable(&self) -> bool {
        self.actionable().next().is_some()
    }
}

/// Output of dispatch, consumed by reconciliation and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedItem {
    pub item: RevalidatedItem,
    /// Nothing was written because the customer already carried this
    /// session's increase.
    pub already_committed: bool,
    pub financials_refreshed: bool,
}

impl CompletedItem {
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}_{}",
            self.item.phase.completed_prefix(),
            self.item.customer_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(phase: Phase) -> RevalidatedItem {
        RevalidatedItem {
            phase,
            session_id: 1,
            effective_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            customer_id: 42,
            customer_name: "Acme".to_string(),
            customer_entity_id: "C-42".to_string(),
            franchisee_id: 3,
            franchisee_name: "Sydney North".to_string(),
            services: vec![],
        }
    }

    #[test]
    fn keys_follow_stage_naming() {
        let notify = item(Phase::Notify);
        assert_eq!(notify.key(), "NotifyCustomer_42");
        let done = CompletedItem {
            item: notify,
            already_committed: false,
            financials_refreshed: false,
        };
        assert_eq!(done.key(), "NotifiedCustomer_42");

        let process = item(Phase::Process);
        assert_eq!(process.key(), "ProcessCustomer_42");
        let done = CompletedItem {
            item: process,
            already_committed: false,
            financials_refreshed: false,
        };
        assert_eq!(done.key(), "ProcessedCustomer_42");
    }

    #[test]
    fn check_key_uses_discovery_prefix() {
        let w = WorkItem {
            phase: Phase::Process,
            session_id: 1,
            effective_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            customer_id: 9,
            customer_name: String::new(),
            customer_entity_id: String::new(),
            franchisee_id: 3,
            franchisee_name: String::new(),
            rows: vec![],
        };
        assert_eq!(w.key(), "CheckCustomerToProcess_9");
    }
}
