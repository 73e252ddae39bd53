use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Revalidate,
    Dispatch,
    Report,
    Reconcile,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Revalidate => "revalidate",
            Stage::Dispatch => "dispatch",
            Stage::Report => "report",
            Stage::Reconcile => "reconcile",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A keyed failure captured at an item boundary. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub key: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, key: impl Into<String>, error: &dyn std::fmt::Display) -> Self {
        Self {
            stage,
            key: key.into(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.key, self.message)
    }
}
