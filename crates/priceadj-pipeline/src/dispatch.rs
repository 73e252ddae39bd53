use chrono::NaiveDate;

use priceadj_core::NoticeTemplate;

use crate::commit::commit_customer;
use crate::error::PipelineError;
use crate::financial::{refresh_pricing_lines, should_refresh};
use crate::notice::send_customer_notice;
use crate::notifier::Notifier;
use crate::store::RecordStore;
use crate::work_item::{CompletedItem, Phase, RevalidatedItem};

/// What to do with a revalidated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Notify,
    Commit { refresh_financials: bool },
}

#[must_use]
pub fn classify(item: &RevalidatedItem, today: NaiveDate, financial_cutoff_day: u32) -> Action {
    match item.phase {
        Phase::Notify => Action::Notify,
        Phase::Process => Action::Commit {
            refresh_financials: should_refresh(item, today, financial_cutoff_day),
        },
    }
}

/// Borrowed collaborators for [`dispatch`].
pub struct DispatchDeps<'a> {
    pub store: &'a dyn RecordStore,
    pub notifier: &'a dyn Notifier,
    pub template: &'a NoticeTemplate,
    pub today: NaiveDate,
    pub financial_cutoff_day: u32,
}

/// Perform the side effects for one item.
///
/// # Errors
///
/// Returns the first error from the notice, the commit or the pricing refresh.
pub async fn dispatch(
    deps: &DispatchDeps<'_>,
    item: RevalidatedItem,
) -> Result<CompletedItem, PipelineError> {
    match classify(&item, deps.today, deps.financial_cutoff_day) {
        Action::Notify => {
            send_customer_notice(deps.store, deps.notifier, deps.template, &item, deps.today)
                .await?;
            Ok(CompletedItem {
                item,
                already_committed: false,
                financials_refreshed: false,
            })
        }
        Action::Commit { refresh_financials } => {
            let outcome = commit_customer(deps.store, &item).await?;
            if refresh_financials {
                refresh_pricing_lines(deps.store, item.customer_id).await?;
            }
            Ok(CompletedItem {
                item,
                already_committed: outcome.already_committed,
                financials_refreshed: refresh_financials,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_item::CandidateService;
    use priceadj_core::{Frequency, ServiceAdjustmentRow};
    use rust_decimal::Decimal;

    fn item(phase: Phase, adjustment: i64, confirmed: bool) -> RevalidatedItem {
        RevalidatedItem {
            phase,
            session_id: 1,
            effective_date: NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
            customer_id: 7,
            customer_name: "Acme".to_string(),
            customer_entity_id: "C-7".to_string(),
            franchisee_id: 3,
            franchisee_name: "Sydney North".to_string(),
            services: vec![CandidateService {
                row: ServiceAdjustmentRow {
                    service_id: 1,
                    service_type_id: 22,
                    service_name: "Daily Clean".to_string(),
                    current_price: Decimal::new(40, 0),
                    adjustment: Decimal::new(adjustment, 0),
                    confirmed,
                    customer_id: 7,
                    customer_entity_id: "C-7".to_string(),
                    customer_name: "Acme".to_string(),
                    franchisee_id: 3,
                    franchisee_name: "Sydney North".to_string(),
                    national_account: false,
                },
                frequency: Frequency(vec![1]),
            }],
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn notify_items_only_notify() {
        assert_eq!(classify(&item(Phase::Notify, 5, true), day(20), 15), Action::Notify);
    }

    #[test]
    fn process_refreshes_financials_from_cutoff_day() {
        assert_eq!(
            classify(&item(Phase::Process, 5, true), day(15), 15),
            Action::Commit {
                refresh_financials: true
            }
        );
        assert_eq!(
            classify(&item(Phase::Process, 5, true), day(14), 15),
            Action::Commit {
                refresh_financials: false
            }
        );
    }

    #[test]
    fn no_refresh_without_actionable_rows() {
        assert_eq!(
            classify(&item(Phase::Process, 5, false), day(20), 15),
            Action::Commit {
                refresh_financials: false
            }
        );
        assert_eq!(
            classify(&item(Phase::Process, 0, true), day(20), 15),
            Action::Commit {
                refresh_financials: false
            }
        );
    }
}
