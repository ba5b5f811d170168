//! Mail transport trait and error types

use crate::domain::ResolvedAttachment;
use async_trait::async_trait;
use serde::Serialize;

/// Transport-level error for one recipient's send
///
/// These errors are recorded into the delivery ledger and never abort a
/// campaign. The one exception is `Unauthorized`: the scheduler responds to
/// it with a single forced token refresh before recording a failure.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("provider rejected the access token")]
    Unauthorized,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("send timed out after {0}s")]
    Timeout(u64),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("attachment: {0}")]
    Attachment(String),

    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A fully rendered message, ready for MIME assembly
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<ResolvedAttachment>,
}

/// Provider acknowledgment of an accepted message
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub provider_message_id: Option<String>,
}

/// Trait for the provider's "send one message" operation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        access_token: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, TransportError>;
}
