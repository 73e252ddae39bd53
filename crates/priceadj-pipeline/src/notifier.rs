//! Outbound messages and the seam that delivers them.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Price adjustment notice addressed to one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerNotice {
    pub customer_id: i64,
    pub recipients: Vec<String>,
    pub subject: String,
    /// HTML body with every placeholder substituted.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    #[must_use]
    pub fn csv(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: "text/csv".to_string(),
            content: content.into(),
        }
    }
}

/// Internal mail: reports and opt-out notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    pub recipients: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Out-of-band failure report for the people who run the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintainerAlert {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send_customer_notice(&self, notice: &CustomerNotice) -> Result<(), NotifyError>;

    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError>;

    async fn alert_maintainers(&self, alert: &MaintainerAlert) -> Result<(), NotifyError>;
}

/// Writes every message to the log instead of delivering it. Used when no
/// mail relay is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_customer_notice(&self, notice: &CustomerNotice) -> Result<(), NotifyError> {
        tracing::info!(
            customer_id = notice.customer_id,
            recipients = ?notice.recipients,
            subject = %notice.subject,
            "notifier: customer notice (not delivered, no mail relay configured)"
        );
        Ok(())
    }

    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError> {
        tracing::info!(
            recipients = ?mail.recipients,
            subject = %mail.subject,
            attachments = mail.attachments.len(),
            "notifier: mail (not delivered, no mail relay configured)"
        );
        Ok(())
    }

    async fn alert_maintainers(&self, alert: &MaintainerAlert) -> Result<(), NotifyError> {
        tracing::warn!(
            subject = %alert.subject,
            body = %alert.body,
            "notifier: maintainer alert (not delivered, no mail relay configured)"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Notice(CustomerNotice),
    Mail(Mail),
    Alert(MaintainerAlert),
}

/// Keeps every message in memory. Customer notices can be made to fail per
/// customer.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing_customers: Mutex<HashSet<i64>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_notices_for(&self, customer_id: i64) {
        if let Ok(mut failing) = self.failing_customers.lock() {
            failing.insert(customer_id);
        }
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<CustomerNotice> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                SentMessage::Notice(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn mails(&self) -> Vec<Mail> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                SentMessage::Mail(mail) => Some(mail),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<MaintainerAlert> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                SentMessage::Alert(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    fn push(&self, message: SentMessage) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("recording notifier poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_customer_notice(&self, notice: &CustomerNotice) -> Result<(), NotifyError> {
        let failing = self
            .failing_customers
            .lock()
            .map(|f| f.contains(&notice.customer_id))
            .unwrap_or(false);
        if failing {
            return Err(NotifyError::Delivery(format!(
                "relay refused notice for customer {}",
                notice.customer_id
            )));
        }
        self.push(SentMessage::Notice(notice.clone()))
    }

    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError> {
        self.push(SentMessage::Mail(mail.clone()))
    }

    async fn alert_maintainers(&self, alert: &MaintainerAlert) -> Result<(), NotifyError> {
        self.push(SentMessage::Alert(alert.clone()))
    }
}
