//! Delivery ledger domain types

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status of one delivery attempt
///
/// The engine itself only ever records `sent` (accepted by the provider) and
/// `failed`. `delivered`, `bounced` and `complained` are reserved for an
/// external delivery-notification collaborator; the engine treats them as
/// terminal when it encounters them in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Bounced,
    Failed,
    Complained,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "bounced" => Ok(Self::Bounced),
            "failed" => Ok(Self::Failed),
            "complained" => Ok(Self::Complained),
            _ => Err(format!("Unknown delivery status: {}", s)),
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Bounced => write!(f, "bounced"),
            Self::Failed => write!(f, "failed"),
            Self::Complained => write!(f, "complained"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for DeliveryStatus {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for DeliveryStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for DeliveryStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = self.to_string();
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s.as_str(), buf)
    }
}

/// One recorded outcome of trying to send to one recipient
///
/// Attempts are append-only: a retry creates a new row, so the ledger keeps
/// the full history per recipient. The most recent attempt determines the
/// recipient's current status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryAttempt {
    pub id: StringUuid,
    pub campaign_id: StringUuid,
    pub recipient_email: String,
    pub recipient_name: String,
    pub status: DeliveryStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// Attempt recording a provider-accepted send
    pub fn sent(
        campaign_id: StringUuid,
        recipient: &crate::domain::Recipient,
        provider_message_id: Option<String>,
    ) -> Self {
        Self {
            id: StringUuid::new_v4(),
            campaign_id,
            recipient_email: recipient.email.clone(),
            recipient_name: recipient.name.clone(),
            status: DeliveryStatus::Sent,
            provider_message_id,
            error: None,
            attempted_at: Utc::now(),
        }
    }

    /// Attempt recording a failure, with the error text for the audit trail
    pub fn failed(
        campaign_id: StringUuid,
        recipient: &crate::domain::Recipient,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: StringUuid::new_v4(),
            campaign_id,
            recipient_email: recipient.email.clone(),
            recipient_name: recipient.name.clone(),
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            error: Some(error.into()),
            attempted_at: Utc::now(),
        }
    }
}

/// Per-status aggregate over the latest attempt of every recipient
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounts {
    pub pending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub bounced: i64,
    pub failed: i64,
    pub complained: i64,
}

impl DeliveryCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.sent + self.delivered + self.bounced + self.failed + self.complained
    }

    /// Recipients whose latest attempt is terminal
    pub fn terminal(&self) -> i64 {
        self.total() - self.pending
    }

    pub fn add(&mut self, status: DeliveryStatus, count: i64) {
        match status {
            DeliveryStatus::Pending => self.pending += count,
            DeliveryStatus::Sent => self.sent += count,
            DeliveryStatus::Delivered => self.delivered += count,
            DeliveryStatus::Bounced => self.bounced += count,
            DeliveryStatus::Failed => self.failed += count,
            DeliveryStatus::Complained => self.complained += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Recipient;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Bounced,
            DeliveryStatus::Failed,
            DeliveryStatus::Complained,
        ] {
            let parsed: DeliveryStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(DeliveryStatus::Sent.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(DeliveryStatus::Bounced.is_terminal());
    }

    #[test]
    fn test_attempt_constructors() {
        let campaign_id = StringUuid::new_v4();
        let recipient = Recipient::new("alice@example.com", "Alice");

        let sent = DeliveryAttempt::sent(campaign_id, &recipient, Some("msg-1".to_string()));
        assert_eq!(sent.status, DeliveryStatus::Sent);
        assert_eq!(sent.provider_message_id.as_deref(), Some("msg-1"));
        assert!(sent.error.is_none());

        let failed = DeliveryAttempt::failed(campaign_id, &recipient, "connection reset");
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert!(failed.provider_message_id.is_none());
        assert_eq!(failed.error.as_deref(), Some("connection reset"));
        // Distinct rows, same recipient
        assert_ne!(sent.id, failed.id);
    }

    #[test]
    fn test_counts_total() {
        let mut counts = DeliveryCounts::default();
        counts.add(DeliveryStatus::Sent, 20);
        counts.add(DeliveryStatus::Failed, 5);
        assert_eq!(counts.total(), 25);
        assert_eq!(counts.terminal(), 25);

        counts.add(DeliveryStatus::Pending, 3);
        assert_eq!(counts.total(), 28);
        assert_eq!(counts.terminal(), 25);
    }
}
