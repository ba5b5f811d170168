//! Delivery ledger repository
//!
//! The ledger is append-only: attempts are inserted, never updated or
//! deleted. All read queries are keyed off the *latest* attempt per
//! recipient (by insertion order), so a recipient that failed once and
//! succeeded later counts as succeeded.

use crate::domain::{DeliveryAttempt, DeliveryCounts, DeliveryStatus, StringUuid};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryAttemptRepository: Send + Sync {
    /// Append one attempt to the ledger
    async fn record(&self, attempt: &DeliveryAttempt) -> Result<()>;

    /// Latest attempt status per recipient of a campaign
    async fn latest_statuses(
        &self,
        campaign_id: StringUuid,
    ) -> Result<Vec<(String, DeliveryStatus)>>;

    /// Counts per status over the latest attempt of every recipient
    async fn aggregate(&self, campaign_id: StringUuid) -> Result<DeliveryCounts>;

    /// Recipients whose latest attempt is `failed`
    async fn failed_recipients(&self, campaign_id: StringUuid) -> Result<Vec<String>>;

    /// Total attempts recorded for one recipient (full history)
    async fn count_attempts(&self, campaign_id: StringUuid, recipient_email: &str) -> Result<i64>;
}

pub struct MySqlDeliveryAttemptRepository {
    pool: MySqlPool,
}

impl MySqlDeliveryAttemptRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Fold (status, count) rows from an aggregate query into DeliveryCounts
fn fold_counts(rows: Vec<(DeliveryStatus, i64)>) -> DeliveryCounts {
    let mut counts = DeliveryCounts::default();
    for (status, count) in rows {
        counts.add(status, count);
    }
    counts
}

#[async_trait]
impl DeliveryAttemptRepository for MySqlDeliveryAttemptRepository {
    async fn record(&self, attempt: &DeliveryAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_attempts
                (id, campaign_id, recipient_email, recipient_name, status,
                 provider_message_id, error, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.campaign_id)
        .bind(&attempt.recipient_email)
        .bind(&attempt.recipient_name)
        .bind(attempt.status)
        .bind(&attempt.provider_message_id)
        .bind(&attempt.error)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_statuses(
        &self,
        campaign_id: StringUuid,
    ) -> Result<Vec<(String, DeliveryStatus)>> {
        let rows = sqlx::query_as::<_, (String, DeliveryStatus)>(
            r#"
            SELECT t.recipient_email, t.status
            FROM delivery_attempts t
            JOIN (
                SELECT recipient_email, MAX(seq) AS max_seq
                FROM delivery_attempts
                WHERE campaign_id = ?
                GROUP BY recipient_email
            ) latest ON t.recipient_email = latest.recipient_email AND t.seq = latest.max_seq
            WHERE t.campaign_id = ?
            "#,
        )
        .bind(campaign_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn aggregate(&self, campaign_id: StringUuid) -> Result<DeliveryCounts> {
        let rows = sqlx::query_as::<_, (DeliveryStatus, i64)>(
            r#"
            SELECT t.status, COUNT(*)
            FROM delivery_attempts t
            JOIN (
                SELECT recipient_email, MAX(seq) AS max_seq
                FROM delivery_attempts
                WHERE campaign_id = ?
                GROUP BY recipient_email
            ) latest ON t.recipient_email = latest.recipient_email AND t.seq = latest.max_seq
            WHERE t.campaign_id = ?
            GROUP BY t.status
            "#,
        )
        .bind(campaign_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fold_counts(rows))
    }

    async fn failed_recipients(&self, campaign_id: StringUuid) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT t.recipient_email
            FROM delivery_attempts t
            JOIN (
                SELECT recipient_email, MAX(seq) AS max_seq
                FROM delivery_attempts
                WHERE campaign_id = ?
                GROUP BY recipient_email
            ) latest ON t.recipient_email = latest.recipient_email AND t.seq = latest.max_seq
            WHERE t.campaign_id = ? AND t.status = 'failed'
            ORDER BY t.seq
            "#,
        )
        .bind(campaign_id)
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(email,)| email).collect())
    }

    async fn count_attempts(&self, campaign_id: StringUuid, recipient_email: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM delivery_attempts WHERE campaign_id = ? AND recipient_email = ?",
        )
        .bind(campaign_id)
        .bind(recipient_email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_counts() {
        let counts = fold_counts(vec![
            (DeliveryStatus::Sent, 18),
            (DeliveryStatus::Failed, 6),
            (DeliveryStatus::Bounced, 1),
        ]);

        assert_eq!(counts.sent, 18);
        assert_eq!(counts.failed, 6);
        assert_eq!(counts.bounced, 1);
        assert_eq!(counts.total(), 25);
    }

    #[test]
    fn test_fold_counts_empty() {
        let counts = fold_counts(vec![]);
        assert_eq!(counts, DeliveryCounts::default());
        assert_eq!(counts.total(), 0);
    }

    #[tokio::test]
    async fn test_mock_failed_recipients_latest_only() {
        let mut mock = MockDeliveryAttemptRepository::new();
        let campaign_id = StringUuid::new_v4();

        // A recipient that later succeeded must not reappear as failed
        mock.expect_failed_recipients()
            .returning(|_| Ok(vec!["still-failing@example.com".to_string()]));

        let failed = mock.failed_recipients(campaign_id).await.unwrap();
        assert_eq!(failed, vec!["still-failing@example.com".to_string()]);
    }
}
