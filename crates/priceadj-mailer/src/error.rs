use thiserror::Error;

/// Errors returned by the mail relay client.
#[derive(Debug, Error)]
pub enum MailerError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-2xx status.
    #[error("mail relay rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The relay accepted the request but the body was not a receipt.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid mail relay configuration: {0}")]
    InvalidConfig(String),
}
