pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod types;

use std::sync::Arc;

use priceadj_core::AppConfig;
use priceadj_pipeline::{LoggingNotifier, Notifier};

pub use client::MailRelayClient;
pub use error::MailerError;
pub use types::{DeliveryReceipt, MessageKind, RelayAttachment, RelayMessage};

/// The relay client when a relay URL is configured, otherwise a notifier
/// that only logs.
///
/// # Errors
///
/// Returns [`MailerError`] if the relay client cannot be built.
pub fn notifier_from_config(config: &AppConfig) -> Result<Arc<dyn Notifier>, MailerError> {
    match config.mail_relay_url.as_deref() {
        Some(url) if !url.trim().is_empty() => {
            let client = MailRelayClient::new(
                url,
                config.mail_relay_token.as_deref(),
                config.mail_timeout_secs,
            )?
            .with_max_retries(config.mail_max_retries);
            tracing::info!(relay = %client.messages_url(), "mailer: relay configured");
            Ok(Arc::new(client))
        }
        _ => {
            tracing::warn!("mailer: no relay configured, messages will only be logged");
            Ok(Arc::new(LoggingNotifier))
        }
    }
}
