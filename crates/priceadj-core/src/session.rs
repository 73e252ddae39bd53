use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::{date_as_instant, normalize_to_calendar_date};
use crate::pricing_rules::PricingRule;
use crate::CoreError;

/// Lifecycle of an adjustment session. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Notified,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Notified => "notified",
            SessionStatus::Completed => "completed",
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Open, SessionStatus::Notified)
                | (SessionStatus::Notified, SessionStatus::Completed)
        )
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] for anything other than
    /// `open -> notified` or `notified -> completed`.
    pub fn transition(self, next: SessionStatus) -> Result<SessionStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                entity: "session",
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "notified" => Ok(SessionStatus::Notified),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(CoreError::UnknownValue {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentSession {
    pub id: i64,
    /// Stored instant of the effective date. Use [`Self::effective_date`] for
    /// the calendar date.
    pub effective_at: DateTime<Utc>,
    pub opening_date: NaiveDate,
    pub deadline: NaiveDate,
    pub status: SessionStatus,
    pub notified_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pricing_rules: Vec<PricingRule>,
    pub created_at: DateTime<Utc>,
}

impl AdjustmentSession {
    #[must_use]
    pub fn effective_date(&self) -> NaiveDate {
        normalize_to_calendar_date(self.effective_at)
    }

    #[must_use]
    pub fn effective_year(&self) -> i32 {
        self.effective_date().year()
    }

    #[must_use]
    pub fn effective_month(&self) -> u32 {
        self.effective_date().month()
    }

    /// True while franchisees may still edit their adjustments.
    #[must_use]
    pub fn is_accepting_input(&self, today: NaiveDate) -> bool {
        self.status != SessionStatus::Completed
            && self.opening_date <= today
            && today <= self.deadline
    }
}

/// Administrator input for a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub effective_date: NaiveDate,
    pub opening_date: NaiveDate,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub pricing_rules: Vec<PricingRule>,
}

impl NewSession {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSession`] unless
    /// `opening_date < deadline < effective_date`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.opening_date >= self.deadline {
            return Err(CoreError::InvalidSession(format!(
                "opening date {} must be before deadline {}",
                self.opening_date, self.deadline
            )));
        }
        if self.deadline >= self.effective_date {
            return Err(CoreError::InvalidSession(format!(
                "deadline {} must be before effective date {}",
                self.deadline, self.effective_date
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn effective_at(&self) -> DateTime<Utc> {
        date_as_instant(self.effective_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert_eq!(
            SessionStatus::Open.transition(SessionStatus::Notified).unwrap(),
            SessionStatus::Notified
        );
        assert_eq!(
            SessionStatus::Notified
                .transition(SessionStatus::Completed)
                .unwrap(),
            SessionStatus::Completed
        );
    }

    #[test]
    fn completion_requires_notification() {
        let err = SessionStatus::Open
            .transition(SessionStatus::Completed)
            .unwrap_err();
        assert!(err.to_string().contains("open -> completed"));
    }

    #[test]
    fn no_transition_back_to_open() {
        assert!(!SessionStatus::Notified.can_transition_to(SessionStatus::Open));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Notified));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn status_parses_from_storage_form() {
        assert_eq!(
            "notified".parse::<SessionStatus>().unwrap(),
            SessionStatus::Notified
        );
        assert!("archived".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn new_session_requires_ordered_dates() {
        let ok = NewSession {
            effective_date: date(2024, 7, 1),
            opening_date: date(2024, 5, 1),
            deadline: date(2024, 6, 1),
            pricing_rules: vec![],
        };
        assert!(ok.validate().is_ok());

        let late_deadline = NewSession {
            deadline: date(2024, 7, 1),
            ..ok.clone()
        };
        assert!(late_deadline.validate().is_err());

        let late_opening = NewSession {
            opening_date: date(2024, 6, 2),
            ..ok
        };
        assert!(late_opening.validate().is_err());
    }

    #[test]
    fn effective_date_round_trips_through_stored_instant() {
        let input = NewSession {
            effective_date: date(2024, 7, 1),
            opening_date: date(2024, 5, 1),
            deadline: date(2024, 6, 1),
            pricing_rules: vec![],
        };
        let session = AdjustmentSession {
            id: 1,
            effective_at: input.effective_at(),
            opening_date: input.opening_date,
            deadline: input.deadline,
            status: SessionStatus::Open,
            notified_at: None,
            completed_at: None,
            pricing_rules: vec![],
            created_at: input.effective_at(),
        };
        assert_eq!(session.effective_date(), date(2024, 7, 1));
        assert_eq!(session.effective_year(), 2024);
        assert_eq!(session.effective_month(), 7);
        assert!(session.is_accepting_input(date(2024, 5, 20)));
        assert!(!session.is_accepting_input(date(2024, 6, 2)));
    }
}
