use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing_rules::PricingRule;
use crate::CoreError;

/// One service line of a franchisee's adjustment sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAdjustmentRow {
    pub service_id: i64,
    pub service_type_id: i64,
    pub service_name: String,
    pub current_price: Decimal,
    /// Proposed price delta.
    pub adjustment: Decimal,
    pub confirmed: bool,
    pub customer_id: i64,
    pub customer_entity_id: String,
    pub customer_name: String,
    pub franchisee_id: i64,
    pub franchisee_name: String,
    #[serde(default)]
    pub national_account: bool,
}

impl ServiceAdjustmentRow {
    /// Confirmed with a non-zero delta. Only these rows change anything.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.confirmed && !self.adjustment.is_zero()
    }

    #[must_use]
    pub fn new_price(&self) -> Decimal {
        self.current_price + self.adjustment
    }

    #[must_use]
    pub fn report_status(&self) -> ReportStatus {
        ReportStatus::from_flags(!self.adjustment.is_zero(), self.confirmed)
    }
}

/// Per-row outcome shown in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    NotConfirmed,
    AdjustedNotConfirmed,
    ConfirmedAndApplied,
    ConfirmedWithoutAdjustment,
}

impl ReportStatus {
    #[must_use]
    pub fn from_flags(adjusted: bool, confirmed: bool) -> Self {
        match (adjusted, confirmed) {
            (false, false) => ReportStatus::NotConfirmed,
            (true, false) => ReportStatus::AdjustedNotConfirmed,
            (true, true) => ReportStatus::ConfirmedAndApplied,
            (false, true) => ReportStatus::ConfirmedWithoutAdjustment,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ReportStatus::NotConfirmed => "Not confirmed",
            ReportStatus::AdjustedNotConfirmed => "Adjusted but not confirmed",
            ReportStatus::ConfirmedAndApplied => "Confirmed and applied",
            ReportStatus::ConfirmedWithoutAdjustment => "Confirmed without adjustment",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The persisted form of a record's rows: one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentData(pub Vec<ServiceAdjustmentRow>);

impl AdjustmentData {
    /// # Errors
    ///
    /// Returns [`CoreError::AdjustmentData`] if serialization fails.
    pub fn encode(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode stored rows. An empty payload is an empty sheet; unknown or
    /// missing fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AdjustmentData`] if the payload does not match the row shape.
    pub fn decode(payload: &str) -> Result<Self, CoreError> {
        if payload.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self(serde_json::from_str(payload)?))
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<ServiceAdjustmentRow> {
        self.0
    }
}

/// A franchisee's adjustment sheet for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FranchiseeAdjustmentRecord {
    pub id: i64,
    pub session_id: i64,
    pub franchisee_id: i64,
    pub rows: Vec<ServiceAdjustmentRow>,
    pub opt_out_reason: Option<String>,
    pub pricing_rules: Vec<PricingRule>,
    pub updated_at: DateTime<Utc>,
}

impl FranchiseeAdjustmentRecord {
    #[must_use]
    pub fn is_opted_out(&self) -> bool {
        self.opt_out_reason
            .as_deref()
            .is_some_and(|reason| !reason.trim().is_empty())
    }
}

/// Where a franchisee stands in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FranchiseeSessionStatus {
    AllServicesConfirmed,
    InProgress { confirmed: usize },
    InProgressNoneConfirmed,
    InitiatedButNoProgress,
    OptedOut,
    NoEligibleCustomer,
    NotStarted,
}

impl FranchiseeSessionStatus {
    #[must_use]
    pub fn label(self) -> String {
        match self {
            FranchiseeSessionStatus::AllServicesConfirmed => "All Services Confirmed".to_string(),
            FranchiseeSessionStatus::InProgress { confirmed } => {
                format!("In Progress ({confirmed} confirmed services)")
            }
            FranchiseeSessionStatus::InProgressNoneConfirmed => {
                "In Progress (0 confirmed services)".to_string()
            }
            FranchiseeSessionStatus::InitiatedButNoProgress => {
                "Initiated But No Progress".to_string()
            }
            FranchiseeSessionStatus::OptedOut => "Opted Out".to_string(),
            FranchiseeSessionStatus::NoEligibleCustomer => "No Eligible Customer".to_string(),
            FranchiseeSessionStatus::NotStarted => "Not Started".to_string(),
        }
    }

    /// Sort key for activity reports, most advanced first.
    #[must_use]
    pub fn order(self) -> u8 {
        match self {
            FranchiseeSessionStatus::AllServicesConfirmed => 0,
            FranchiseeSessionStatus::InProgress { .. } => 1,
            FranchiseeSessionStatus::InProgressNoneConfirmed => 2,
            FranchiseeSessionStatus::InitiatedButNoProgress => 3,
            FranchiseeSessionStatus::OptedOut => 4,
            FranchiseeSessionStatus::NoEligibleCustomer => 5,
            FranchiseeSessionStatus::NotStarted => 6,
        }
    }
}

/// Classify a franchisee's progress from its adjustment record, if any.
#[must_use]
pub fn franchisee_session_status(
    record: Option<&FranchiseeAdjustmentRecord>,
) -> FranchiseeSessionStatus {
    let Some(record) = record else {
        return FranchiseeSessionStatus::NotStarted;
    };

    if record.is_opted_out() {
        return FranchiseeSessionStatus::OptedOut;
    }

    if record.rows.is_empty() {
        return FranchiseeSessionStatus::NoEligibleCustomer;
    }

    let confirmed = record.rows.iter().filter(|row| row.confirmed).count();
    if confirmed == record.rows.len() {
        FranchiseeSessionStatus::AllServicesConfirmed
    } else if confirmed > 0 {
        FranchiseeSessionStatus::InProgress { confirmed }
    } else if record.rows.iter().any(|row| !row.adjustment.is_zero()) {
        FranchiseeSessionStatus::InProgressNoneConfirmed
    } else {
        FranchiseeSessionStatus::InitiatedButNoProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(service_id: i64, adjustment: i64, confirmed: bool) -> ServiceAdjustmentRow {
        ServiceAdjustmentRow {
            service_id,
            service_type_id: 22,
            service_name: "Daily Clean".to_string(),
            current_price: Decimal::new(4000, 2),
            adjustment: Decimal::new(adjustment, 0),
            confirmed,
            customer_id: 7,
            customer_entity_id: "C-7".to_string(),
            customer_name: "Acme Pty Ltd".to_string(),
            franchisee_id: 3,
            franchisee_name: "Sydney North".to_string(),
            national_account: false,
        }
    }

    fn record(rows: Vec<ServiceAdjustmentRow>, opt_out: Option<&str>) -> FranchiseeAdjustmentRecord {
        FranchiseeAdjustmentRecord {
            id: 1,
            session_id: 1,
            franchisee_id: 3,
            rows,
            opt_out_reason: opt_out.map(str::to_string),
            pricing_rules: vec![],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn actionable_requires_confirmation_and_delta() {
        assert!(row(1, 5, true).is_actionable());
        assert!(!row(1, 0, true).is_actionable());
        assert!(!row(1, 5, false).is_actionable());
    }

    #[test]
    fn report_status_truth_table() {
        assert_eq!(row(1, 0, false).report_status().label(), "Not confirmed");
        assert_eq!(
            row(1, 5, false).report_status().label(),
            "Adjusted but not confirmed"
        );
        assert_eq!(row(1, 5, true).report_status().label(), "Confirmed and applied");
        assert_eq!(
            row(1, 0, true).report_status().label(),
            "Confirmed without adjustment"
        );
    }

    #[test]
    fn adjustment_data_decodes_what_it_encodes() {
        let data = AdjustmentData(vec![row(1, 5, true), row(2, 0, false)]);
        let encoded = data.encode().unwrap();
        assert_eq!(AdjustmentData::decode(&encoded).unwrap(), data);
    }

    #[test]
    fn adjustment_data_rejects_unknown_fields() {
        let err = AdjustmentData::decode(r#"[{"service_id":1,"highlight":"x"}]"#).unwrap_err();
        assert!(matches!(err, CoreError::AdjustmentData(_)));
    }

    #[test]
    fn empty_payload_is_empty_sheet() {
        assert!(AdjustmentData::decode("").unwrap().0.is_empty());
    }

    #[test]
    fn session_status_classification() {
        assert_eq!(
            franchisee_session_status(None),
            FranchiseeSessionStatus::NotStarted
        );
        assert_eq!(
            franchisee_session_status(Some(&record(vec![row(1, 5, true)], Some("retiring")))),
            FranchiseeSessionStatus::OptedOut
        );
        assert_eq!(
            franchisee_session_status(Some(&record(vec![], None))),
            FranchiseeSessionStatus::NoEligibleCustomer
        );
        assert_eq!(
            franchisee_session_status(Some(&record(vec![row(1, 5, true), row(2, 0, true)], None))),
            FranchiseeSessionStatus::AllServicesConfirmed
        );
        let in_progress =
            franchisee_session_status(Some(&record(vec![row(1, 5, true), row(2, 0, false)], None)));
        assert_eq!(in_progress, FranchiseeSessionStatus::InProgress { confirmed: 1 });
        assert_eq!(in_progress.label(), "In Progress (1 confirmed services)");
        assert_eq!(
            franchisee_session_status(Some(&record(vec![row(1, 5, false)], None))),
            FranchiseeSessionStatus::InProgressNoneConfirmed
        );
        assert_eq!(
            franchisee_session_status(Some(&record(vec![row(1, 0, false)], None))),
            FranchiseeSessionStatus::InitiatedButNoProgress
        );
    }

    #[test]
    fn blank_opt_out_reason_is_not_an_opt_out() {
        assert!(!record(vec![], Some("   ")).is_opted_out());
    }

    #[test]
    fn status_order_matches_report_ranking() {
        let orders: Vec<u8> = [
            FranchiseeSessionStatus::AllServicesConfirmed,
            FranchiseeSessionStatus::InProgress { confirmed: 2 },
            FranchiseeSessionStatus::InProgressNoneConfirmed,
            FranchiseeSessionStatus::InitiatedButNoProgress,
            FranchiseeSessionStatus::OptedOut,
            FranchiseeSessionStatus::NoEligibleCustomer,
            FranchiseeSessionStatus::NotStarted,
        ]
        .into_iter()
        .map(FranchiseeSessionStatus::order)
        .collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
