//! Live business records the pipeline reads and mutates: customers,
//! franchisees, services, and the two audit ledgers written at commit time.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Service category holding recurring services. Other categories are never adjusted.
pub const SERVICES_CATEGORY: i32 = 1;

/// Weekly services recorded on commencement entries created by a price increase.
pub const PRICE_INCREASE_WEEKLY_SERVICES: i16 = 5;

/// Change type written on service changes created by a price increase.
pub const PRICE_INCREASE_CHANGE_TYPE: &str = "Price Increase";

// ---------------------------------------------------------------------------
// Commencement register
// ---------------------------------------------------------------------------

/// Status of a commencement register entry.
///
/// The pipeline only produces `Signed` and `Changed`; other statuses already in
/// the register are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum CommencementStatus {
    Signed,
    Changed,
    Other(String),
}

impl CommencementStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            CommencementStatus::Signed => "signed",
            CommencementStatus::Changed => "changed",
            CommencementStatus::Other(s) => s.as_str(),
        }
    }

    /// # Errors
    ///
    /// Only `signed -> changed` is a valid move.
    pub fn transition(&self, next: &CommencementStatus) -> Result<CommencementStatus, CoreError> {
        match (self, next) {
            (CommencementStatus::Signed, CommencementStatus::Changed) => {
                Ok(CommencementStatus::Changed)
            }
            _ => Err(CoreError::InvalidTransition {
                entity: "commencement entry",
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            }),
        }
    }
}

impl From<String> for CommencementStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "signed" => CommencementStatus::Signed,
            "changed" => CommencementStatus::Changed,
            _ => CommencementStatus::Other(value),
        }
    }
}

impl From<CommencementStatus> for String {
    fn from(value: CommencementStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for CommencementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SaleType {
    PriceIncrease,
    Other(String),
}

impl SaleType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SaleType::PriceIncrease => "price_increase",
            SaleType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for SaleType {
    fn from(value: String) -> Self {
        if value == "price_increase" {
            SaleType::PriceIncrease
        } else {
            SaleType::Other(value)
        }
    }
}

impl From<SaleType> for String {
    fn from(value: SaleType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommencementRegisterEntry {
    pub id: i64,
    pub customer_id: i64,
    pub franchisee_id: i64,
    pub sale_type: SaleType,
    pub inbound: bool,
    pub status: CommencementStatus,
    pub entry_date: NaiveDate,
    pub commencement_date: NaiveDate,
    pub signup_date: NaiveDate,
    pub weekly_services: i16,
    /// State or territory of the franchisee at the time of entry.
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommencementEntry {
    pub customer_id: i64,
    pub franchisee_id: i64,
    pub sale_type: SaleType,
    pub inbound: bool,
    pub status: CommencementStatus,
    pub date: NaiveDate,
    pub weekly_services: i16,
    pub state: Option<String>,
}

impl NewCommencementEntry {
    /// Signed inbound entry recording a price increase effective on `date`.
    #[must_use]
    pub fn price_increase(
        customer_id: i64,
        franchisee_id: i64,
        date: NaiveDate,
        state: Option<String>,
    ) -> Self {
        Self {
            customer_id,
            franchisee_id,
            sale_type: SaleType::PriceIncrease,
            inbound: true,
            status: CommencementStatus::Signed,
            date,
            weekly_services: PRICE_INCREASE_WEEKLY_SERVICES,
            state,
        }
    }
}

// ---------------------------------------------------------------------------
// Service changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceChangeStatus {
    Active,
    Ceased,
}

impl ServiceChangeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceChangeStatus::Active => "active",
            ServiceChangeStatus::Ceased => "ceased",
        }
    }

    /// # Errors
    ///
    /// Only `active -> ceased` is a valid move.
    pub fn transition(self, next: ServiceChangeStatus) -> Result<ServiceChangeStatus, CoreError> {
        if self == ServiceChangeStatus::Active && next == ServiceChangeStatus::Ceased {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                entity: "service change",
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for ServiceChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceChangeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ServiceChangeStatus::Active),
            "ceased" => Ok(ServiceChangeStatus::Ceased),
            other => Err(CoreError::UnknownValue {
                kind: "service change status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceChangeEntry {
    pub id: i64,
    pub service_id: i64,
    pub commencement_entry_id: Option<i64>,
    pub status: ServiceChangeStatus,
    pub change_type: String,
    pub effective_date: NaiveDate,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub old_frequency: Frequency,
    pub new_frequency: Frequency,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewServiceChange {
    pub service_id: i64,
    pub commencement_entry_id: i64,
    pub status: ServiceChangeStatus,
    pub change_type: String,
    pub effective_date: NaiveDate,
    pub old_price: Decimal,
    pub new_price: Decimal,
    pub old_frequency: Frequency,
    pub new_frequency: Frequency,
}

impl NewServiceChange {
    /// Active price-increase change moving `old_price` by `adjustment`; the
    /// visit frequency is unchanged.
    #[must_use]
    pub fn price_increase(
        service_id: i64,
        commencement_entry_id: i64,
        effective_date: NaiveDate,
        old_price: Decimal,
        adjustment: Decimal,
        frequency: Frequency,
    ) -> Self {
        Self {
            service_id,
            commencement_entry_id,
            status: ServiceChangeStatus::Active,
            change_type: PRICE_INCREASE_CHANGE_TYPE.to_string(),
            effective_date,
            old_price,
            new_price: old_price + adjustment,
            old_frequency: frequency.clone(),
            new_frequency: frequency,
        }
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Visit days of a service.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDays {
    pub mon: bool,
    pub tue: bool,
    pub wed: bool,
    pub thu: bool,
    pub fri: bool,
    pub adhoc: bool,
}

impl ServiceDays {
    #[must_use]
    pub fn frequency(&self) -> Frequency {
        let flags = [self.mon, self.tue, self.wed, self.thu, self.fri, self.adhoc];
        Frequency(
            (1u8..)
                .zip(flags)
                .filter_map(|(index, set)| set.then_some(index))
                .collect(),
        )
    }
}

/// Day indices `1..=6` (Mon..Fri, then ad hoc) on which a service runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frequency(pub Vec<u8>);

impl Frequency {
    /// Shorthand label: `Daily` for Mon-Fri, `Adhoc` when empty, otherwise the
    /// concatenated day shorthands (`MWF`, `TTh`, ...).
    #[must_use]
    pub fn label(&self) -> String {
        const SHORTHANDS: [&str; 6] = ["M", "T", "W", "Th", "F", "Adhoc"];

        let joined: String = self
            .0
            .iter()
            .filter_map(|&day| SHORTHANDS.get(usize::from(day).wrapping_sub(1)).copied())
            .collect();

        match joined.as_str() {
            "" => "Adhoc".to_string(),
            "MTWThF" => "Daily".to_string(),
            _ => joined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: i64,
    pub customer_id: i64,
    pub franchisee_id: i64,
    pub service_type_id: i64,
    pub name: String,
    pub price: Decimal,
    pub category: i32,
    pub inactive: bool,
    pub days: ServiceDays,
    /// Billing item the service is invoiced under.
    pub item_id: Option<i64>,
}

impl ServiceRecord {
    /// Live and in the recurring services category.
    #[must_use]
    pub fn is_active_service(&self) -> bool {
        !self.inactive && self.category == SERVICES_CATEGORY
    }
}

// ---------------------------------------------------------------------------
// Customers and franchisees
// ---------------------------------------------------------------------------

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Unit / level line.
    pub addr1: Option<String>,
    /// Street line.
    pub addr2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub default_billing: bool,
    pub default_shipping: bool,
    pub residential: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: i64,
    pub entity_id: String,
    pub company_name: String,
    pub franchisee_id: Option<i64>,
    pub email: Option<String>,
    pub service_email: Option<String>,
    pub accounts_cc_email: Option<String>,
    pub addresses: Vec<Address>,
    pub last_price_increase: Option<NaiveDate>,
    pub national_account: bool,
    pub signed: bool,
}

impl CustomerRecord {
    /// Notice recipients in order: primary, service, accounts cc. Blank
    /// addresses are skipped.
    #[must_use]
    pub fn notice_recipients(&self) -> Vec<String> {
        [&self.email, &self.service_email, &self.accounts_cc_email]
            .into_iter()
            .filter_map(|email| email.as_deref().map(str::trim))
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Default billing, else default shipping, else residential, else the first
    /// address on file.
    #[must_use]
    pub fn billing_address(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.default_billing)
            .or_else(|| self.addresses.iter().find(|a| a.default_shipping))
            .or_else(|| self.addresses.iter().find(|a| a.residential))
            .or_else(|| self.addresses.first())
    }

    /// Whether the customer's last increase is old enough to allow another
    /// one effective on `effective_date`.
    #[must_use]
    pub fn due_for_increase(&self, effective_date: NaiveDate) -> bool {
        match self.last_price_increase {
            None => true,
            Some(last) => effective_date
                .checked_sub_months(chrono::Months::new(12))
                .is_some_and(|cutoff| last <= cutoff),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FranchiseeRecord {
    pub id: i64,
    pub company_name: String,
    /// State or territory the franchisee operates in.
    pub state: Option<String>,
    pub active: bool,
}

impl FranchiseeRecord {
    /// Legacy (`old ...`) and test franchisees are left out of activity reports.
    #[must_use]
    pub fn is_reportable(&self, excluded_ids: &[i64]) -> bool {
        let name = self.company_name.to_lowercase();
        self.active
            && !name.starts_with("old ")
            && !name.starts_with("test")
            && !excluded_ids.contains(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub customer_id: i64,
    pub customer_name: String,
    pub tran_date: NaiveDate,
}

/// One line of a customer's pricing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingLine {
    pub item_id: Option<i64>,
    pub service_name: String,
    pub price: Decimal,
    pub frequency_label: String,
}

impl PricingLine {
    #[must_use]
    pub fn from_service(service: &ServiceRecord) -> Self {
        Self {
            item_id: service.item_id,
            service_name: service.name.clone(),
            price: service.price,
            frequency_label: service.days.frequency().label(),
        }
    }
}
