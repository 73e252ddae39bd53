//! HTTP client for the outbound mail relay.
//!
//! Every message is a JSON `POST` to `{base}/v1/messages` with an optional
//! bearer token. Transient failures are retried with back-off; the relay's
//! own rejections are surfaced as [`MailerError::Rejected`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use priceadj_pipeline::{CustomerNotice, Mail, MaintainerAlert, Notifier, NotifyError};

use crate::error::MailerError;
use crate::retry::retry_with_backoff;
use crate::types::{DeliveryReceipt, RelayErrorBody, RelayMessage};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Client for the mail relay.
///
/// Use [`MailRelayClient::new`] with the configured relay URL; tests point it
/// at a wiremock server the same way.
#[derive(Debug, Clone)]
pub struct MailRelayClient {
    client: Client,
    token: Option<String>,
    messages_url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl MailRelayClient {
    /// # Errors
    ///
    /// Returns [`MailerError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`MailerError::InvalidConfig`] if
    /// `base_url` is not a valid URL.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, MailerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("priceadj/0.1 (mail-relay)")
            .build()?;

        // One trailing slash so `join` appends instead of replacing the last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let messages_url = Url::parse(&normalised)
            .and_then(|base| base.join("v1/messages"))
            .map_err(|e| MailerError::InvalidConfig(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            token: token.filter(|t| !t.trim().is_empty()).map(str::to_owned),
            messages_url,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        })
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    #[must_use]
    pub fn messages_url(&self) -> &Url {
        &self.messages_url
    }

    /// Deliver one message, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`MailerError::Rejected`] if the relay answers with a non-2xx status
    ///   (after retries for 429 and 5xx).
    /// - [`MailerError::Http`] on network failure.
    /// - [`MailerError::Deserialize`] if the receipt cannot be parsed.
    pub async fn send(&self, message: &RelayMessage) -> Result<DeliveryReceipt, MailerError> {
        let receipt = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.post_once(message)
        })
        .await?;

        tracing::info!(
            kind = ?message.kind,
            recipients = message.to.len(),
            receipt_id = %receipt.id,
            "mailer: message accepted by relay"
        );
        Ok(receipt)
    }

    async fn post_once(&self, message: &RelayMessage) -> Result<DeliveryReceipt, MailerError> {
        let mut request = self.client.post(self.messages_url.clone()).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<RelayErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(MailerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| MailerError::Deserialize {
            context: self.messages_url.to_string(),
            source: e,
        })
    }

    async fn deliver(&self, message: RelayMessage) -> Result<(), NotifyError> {
        self.send(&message).await.map(|_| ()).map_err(|err| {
            tracing::error!(kind = ?message.kind, error = %err, "mailer: delivery failed");
            match err {
                MailerError::Rejected { status, message } if status < 500 && status != 429 => {
                    NotifyError::Rejected(format!("{status}: {message}"))
                }
                other => NotifyError::Delivery(other.to_string()),
            }
        })
    }
}

#[async_trait]
impl Notifier for MailRelayClient {
    async fn send_customer_notice(&self, notice: &CustomerNotice) -> Result<(), NotifyError> {
        self.deliver(RelayMessage::from(notice)).await
    }

    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError> {
        self.deliver(RelayMessage::from(mail)).await
    }

    async fn alert_maintainers(&self, alert: &MaintainerAlert) -> Result<(), NotifyError> {
        self.deliver(RelayMessage::from(alert)).await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
