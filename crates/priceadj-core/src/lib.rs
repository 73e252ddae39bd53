pub mod adjustment;
pub mod app_config;
pub mod config;
pub mod dates;
pub mod directory;
pub mod money;
pub mod pricing_rules;
pub mod records;
pub mod session;

pub use adjustment::{
    franchisee_session_status, AdjustmentData, FranchiseeAdjustmentRecord,
    FranchiseeSessionStatus, ReportStatus, ServiceAdjustmentRow,
};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use dates::{
    business_today, date_as_instant, format_dmy, format_ymd_unpadded, normalize_to_calendar_date,
};
pub use directory::{load_directory, parse_directory, Directory, NoticeTemplate};
pub use money::format_aud;
pub use pricing_rules::{apply_rules, AdjustmentType, Operator, PricingRule, RuleCondition};
pub use records::{
    Address, CommencementRegisterEntry, CommencementStatus, CustomerRecord, Frequency,
    FranchiseeRecord, InvoiceSummary, NewCommencementEntry, NewServiceChange, PricingLine,
    SaleType, ServiceChangeEntry, ServiceChangeStatus, ServiceDays, ServiceRecord,
    SERVICES_CATEGORY,
};
pub use session::{AdjustmentSession, NewSession, SessionStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid status transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("unknown {kind} value: '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("adjustment data could not be decoded: {0}")]
    AdjustmentData(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read directory file {path}: {source}")]
    DirectoryFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse directory file: {0}")]
    DirectoryFileParse(#[from] serde_yaml::Error),

    #[error("directory validation failed: {0}")]
    Validation(String),
}
