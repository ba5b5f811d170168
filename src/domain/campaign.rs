//! Campaign domain types

use super::common::StringUuid;
use super::delivery::DeliveryCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Campaign lifecycle status
///
/// `draft -> scheduled -> sending -> completed | failed`. `scheduled` only
/// exists for campaigns created with a future `scheduled_at`. `sending` is the
/// only state from which batches are dispatched, and the persisted status
/// doubles as the per-campaign lock: operations against the same campaign are
/// serialized by atomic status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Scheduled,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Whether this status allows a fresh send to start
    pub fn can_start_send(&self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }

    /// Whether the campaign has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "sending" => Ok(Self::Sending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown campaign status: {}", s)),
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Sending => write!(f, "sending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for CampaignStatus {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for CampaignStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for CampaignStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = self.to_string();
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s.as_str(), buf)
    }
}

/// Campaign entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: StringUuid,
    /// Recipient batch this campaign draws from (participant storage ref)
    pub batch_id: StringUuid,
    pub subject: String,
    pub body_template: String,
    pub status: CampaignStatus,
    pub total_recipients: i64,
    pub sent: i64,
    pub delivered: i64,
    pub failed: i64,
    /// Human-readable reason when status is `failed`
    pub failure_reason: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Campaign {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: StringUuid::new_v4(),
            batch_id: StringUuid::new_v4(),
            subject: String::new(),
            body_template: String::new(),
            status: CampaignStatus::default(),
            total_recipients: 0,
            sent: 0,
            delivered: 0,
            failed: 0,
            failure_reason: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a campaign
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCampaignInput {
    pub batch_id: StringUuid,

    #[validate(length(min = 1, max = 255))]
    pub subject: String,

    #[validate(length(min = 1))]
    pub body_template: String,

    /// When present and in the future, the campaign is created `scheduled`
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Outcome of a completed send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignResult {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
}

/// Point-in-time view of a campaign, queryable mid-send
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatusReport {
    pub status: CampaignStatus,
    /// Attempted recipients as a percentage of the total, 0-100
    pub progress_pct: u8,
    pub counts: DeliveryCounts,
}
