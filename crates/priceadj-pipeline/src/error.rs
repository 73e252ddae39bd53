use priceadj_core::CoreError;

/// Errors returned by a [`crate::RecordStore`] or [`crate::RunLedger`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// Stored data did not match the expected shape.
    #[error("invalid stored data: {0}")]
    Decode(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// The write would break a uniqueness rule, e.g. a second open session.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A backend-specific failure (connection, query, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { .. } => StoreError::InvalidTransition(err.to_string()),
            other => StoreError::Decode(other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("customer {customer_id} has no valid address")]
    NoValidAddress { customer_id: i64 },

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("report rendering failed: {0}")]
    Csv(#[from] csv::Error),
}
