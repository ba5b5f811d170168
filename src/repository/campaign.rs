//! Campaign repository

use crate::domain::{
    Campaign, CampaignStatus, CreateCampaignInput, DeliveryCounts, StringUuid,
};
use crate::error::{MailerError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Create a new campaign in the given initial status
    async fn create(&self, input: &CreateCampaignInput, status: CampaignStatus)
        -> Result<Campaign>;

    /// Find campaign by ID
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Campaign>>;

    /// Atomically transition `id` from one of `from` into `to`.
    ///
    /// Returns false when the campaign is not currently in any of the `from`
    /// statuses. This single UPDATE is what serializes operations against the
    /// same campaign: whoever wins the transition owns the send.
    async fn try_transition(
        &self,
        id: StringUuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool>;

    /// Record the size of the loaded recipient set
    async fn set_total_recipients(&self, id: StringUuid, total: i64) -> Result<()>;

    /// Finalize a campaign as completed, persisting counters recomputed from
    /// the delivery ledger
    async fn mark_completed(&self, id: StringUuid, counts: &DeliveryCounts) -> Result<Campaign>;

    /// Finalize a campaign as failed with a human-readable reason
    async fn mark_failed(&self, id: StringUuid, reason: &str) -> Result<Campaign>;
}

pub struct MySqlCampaignRepository {
    pool: MySqlPool,
}

impl MySqlCampaignRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for MySqlCampaignRepository {
    async fn create(
        &self,
        input: &CreateCampaignInput,
        status: CampaignStatus,
    ) -> Result<Campaign> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, batch_id, subject, body_template, status, scheduled_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(input.batch_id)
        .bind(&input.subject)
        .bind(&input.body_template)
        .bind(status)
        .bind(input.scheduled_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| MailerError::Internal(anyhow::anyhow!("Failed to create campaign")))
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Campaign>> {
        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            SELECT id, batch_id, subject, body_template, status, total_recipients, sent,
                   delivered, failed, failure_reason, scheduled_at, started_at, completed_at,
                   created_at, updated_at
            FROM campaigns
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(campaign)
    }

    async fn try_transition(
        &self,
        id: StringUuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool> {
        // The IN-list is built from our own enum display values, never from
        // caller input.
        let from_list = from
            .iter()
            .map(|s| format!("'{}'", s))
            .collect::<Vec<_>>()
            .join(", ");

        let started_at = if to == CampaignStatus::Sending {
            ", started_at = COALESCE(started_at, NOW())"
        } else {
            ""
        };

        let sql = format!(
            "UPDATE campaigns SET status = ?, updated_at = NOW(){} WHERE id = ? AND status IN ({})",
            started_at, from_list
        );

        let result = sqlx::query(&sql).bind(to).bind(id).execute(&self.pool).await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_total_recipients(&self, id: StringUuid, total: i64) -> Result<()> {
        sqlx::query("UPDATE campaigns SET total_recipients = ?, updated_at = NOW() WHERE id = ?")
            .bind(total)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_completed(&self, id: StringUuid, counts: &DeliveryCounts) -> Result<Campaign> {
        // Bounces and complaints count as failures at the campaign level
        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'completed', sent = ?, delivered = ?, failed = ?,
                completed_at = NOW(), updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(counts.sent)
        .bind(counts.delivered)
        .bind(counts.failed + counts.bounced + counts.complained)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| MailerError::NotFound(format!("Campaign {} not found", id)))
    }

    async fn mark_failed(&self, id: StringUuid, reason: &str) -> Result<Campaign> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'failed', failure_reason = ?, completed_at = NOW(), updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| MailerError::NotFound(format!("Campaign {} not found", id)))
    }
}
