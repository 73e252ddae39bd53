//! Wire types for the mail relay's `/v1/messages` endpoint.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use priceadj_pipeline::{Attachment, CustomerNotice, Mail, MaintainerAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    CustomerNotice,
    Report,
    MaintainerAlert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayAttachment {
    pub file_name: String,
    pub content_type: String,
    /// Standard base64 of the raw bytes.
    pub content_base64: String,
}

impl From<&Attachment> for RelayAttachment {
    fn from(attachment: &Attachment) -> Self {
        Self {
            file_name: attachment.file_name.clone(),
            content_type: attachment.content_type.clone(),
            content_base64: BASE64.encode(&attachment.content),
        }
    }
}

/// One outbound message as the relay expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub kind: MessageKind,
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<RelayAttachment>,
    /// Customer the message concerns, kept by the relay for its own audit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
}

impl From<&CustomerNotice> for RelayMessage {
    fn from(notice: &CustomerNotice) -> Self {
        Self {
            kind: MessageKind::CustomerNotice,
            to: notice.recipients.clone(),
            bcc: Vec::new(),
            subject: notice.subject.clone(),
            html_body: Some(notice.body.clone()),
            text_body: None,
            attachments: Vec::new(),
            customer_id: Some(notice.customer_id),
        }
    }
}

impl From<&Mail> for RelayMessage {
    fn from(mail: &Mail) -> Self {
        Self {
            kind: MessageKind::Report,
            to: mail.recipients.clone(),
            bcc: mail.bcc.clone(),
            subject: mail.subject.clone(),
            html_body: None,
            text_body: Some(mail.body.clone()),
            attachments: mail.attachments.iter().map(RelayAttachment::from).collect(),
            customer_id: None,
        }
    }
}

impl From<&MaintainerAlert> for RelayMessage {
    fn from(alert: &MaintainerAlert) -> Self {
        Self {
            kind: MessageKind::MaintainerAlert,
            to: alert.recipients.clone(),
            bcc: Vec::new(),
            subject: alert.subject.clone(),
            html_body: None,
            text_body: Some(alert.body.clone()),
            attachments: Vec::new(),
            customer_id: None,
        }
    }
}

/// Body of a 2xx relay response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeliveryReceipt {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body the relay sends with non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct RelayErrorBody {
    pub error: String,
}
