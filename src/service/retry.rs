//! Retry of previously failed recipients with exponential backoff
//!
//! A retry run takes the same status lock as a send (`completed -> sending`),
//! snapshots the recipients whose latest ledger entry is `failed`, and
//! replays the scheduler's per-recipient path for each of them. Every attempt
//! lands in the ledger; nothing is ever rewritten. Recipients that exhaust
//! their attempts stay failed until someone invokes another retry - the
//! engine never self-schedules one.

use crate::config::RetryConfig;
use crate::domain::{
    Campaign, CampaignStatus, DeliveryAttempt, DeliveryStatus, Recipient, StringUuid,
};
use crate::error::{MailerError, Result};
use crate::repository::{CampaignRepository, DeliveryAttemptRepository};
use crate::service::campaign::CampaignService;
use crate::source::RecipientSource;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-run retry tuning
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryOptions {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
        }
    }
}

/// Outcome of one retry run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrySummary {
    /// Recipients in the failed snapshot
    pub attempted: usize,
    /// Recipients now succeeding
    pub succeeded: usize,
    /// Recipients still failing after exhausting their attempts
    pub still_failing: usize,
    pub success_rate_pct: f64,
}

/// Exponential backoff with ±10% jitter: base * 2^(attempt-1)
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let exponential = base.saturating_mul(1u32 << exponent);
    let jitter = rand::thread_rng().gen_range(0.9..=1.1);
    exponential.mul_f64(jitter)
}

pub struct RetryService<C: CampaignRepository, D: DeliveryAttemptRepository> {
    scheduler: Arc<CampaignService<C, D>>,
    campaigns: Arc<C>,
    ledger: Arc<D>,
    recipients: Arc<dyn RecipientSource>,
}

impl<C: CampaignRepository, D: DeliveryAttemptRepository> RetryService<C, D> {
    pub fn new(
        scheduler: Arc<CampaignService<C, D>>,
        campaigns: Arc<C>,
        ledger: Arc<D>,
        recipients: Arc<dyn RecipientSource>,
    ) -> Self {
        Self {
            scheduler,
            campaigns,
            ledger,
            recipients,
        }
    }

    /// Retry every recipient whose latest attempt is `failed`
    pub async fn retry_failed(
        &self,
        id: StringUuid,
        options: RetryOptions,
    ) -> Result<RetrySummary> {
        let campaign = self
            .campaigns
            .find_by_id(id)
            .await?
            .ok_or_else(|| MailerError::NotFound(format!("Campaign {} not found", id)))?;

        // Same lock as a send: a campaign mid-send, or one already being
        // retried, loses this transition.
        let owns_retry = self
            .campaigns
            .try_transition(id, &[CampaignStatus::Completed], CampaignStatus::Sending)
            .await?;

        if !owns_retry {
            return Err(MailerError::InvalidState(format!(
                "campaign {} is {} and cannot be retried",
                id, campaign.status
            )));
        }

        let outcome = self.run_retry(&campaign, &options).await;

        // Restore `completed` with counters recomputed from the ledger,
        // whether or not the run got through every recipient.
        let finalized = async {
            let counts = self.ledger.aggregate(id).await?;
            self.campaigns.mark_completed(id, &counts).await?;
            Ok::<(), MailerError>(())
        }
        .await;

        match outcome {
            Ok(summary) => {
                finalized?;
                tracing::info!(
                    campaign_id = %id,
                    attempted = summary.attempted,
                    succeeded = summary.succeeded,
                    "retry run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::warn!(campaign_id = %id, error = %err, "retry run aborted");
                Err(err)
            }
        }
    }

    async fn run_retry(&self, campaign: &Campaign, options: &RetryOptions) -> Result<RetrySummary> {
        // Snapshot taken once: recipients failing again during this run are
        // handled inside it, not by a second invocation.
        let failed = self.ledger.failed_recipients(campaign.id).await?;
        if failed.is_empty() {
            return Ok(RetrySummary {
                attempted: 0,
                succeeded: 0,
                still_failing: 0,
                success_rate_pct: 0.0,
            });
        }

        metrics::counter!("mailer.retry_runs").increment(1);
        tracing::info!(
            campaign_id = %campaign.id,
            failed = failed.len(),
            max_attempts = options.max_attempts,
            "retry run started"
        );

        let roster: HashMap<String, Recipient> = self
            .recipients
            .load_recipients(campaign.batch_id)
            .await?
            .into_iter()
            .map(|recipient| (recipient.email.clone(), recipient))
            .collect();

        let mut succeeded = 0usize;
        let mut still_failing = 0usize;

        for email in &failed {
            match roster.get(email) {
                Some(recipient) => {
                    if self.resend_with_backoff(campaign, recipient, options).await? {
                        succeeded += 1;
                    } else {
                        still_failing += 1;
                    }
                }
                None => {
                    // The batch changed under us; keep the audit trail honest
                    let ghost = Recipient::new(email.clone(), String::new());
                    let attempt = DeliveryAttempt::failed(
                        campaign.id,
                        &ghost,
                        "recipient no longer in batch",
                    );
                    self.ledger.record(&attempt).await?;
                    still_failing += 1;
                }
            }
        }

        let attempted = failed.len();
        Ok(RetrySummary {
            attempted,
            succeeded,
            still_failing,
            success_rate_pct: succeeded as f64 * 100.0 / attempted as f64,
        })
    }

    /// Up to `max_attempts` sends for one recipient, stopping on the first
    /// success. Returns whether the recipient ended up sent.
    async fn resend_with_backoff(
        &self,
        campaign: &Campaign,
        recipient: &Recipient,
        options: &RetryOptions,
    ) -> Result<bool> {
        let max_attempts = options.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let recorded = self.scheduler.send_to_recipient(campaign, recipient).await?;
            if recorded.status == DeliveryStatus::Sent {
                return Ok(true);
            }

            if attempt < max_attempts {
                let delay = backoff_delay(options.base_delay, attempt);
                tracing::debug!(
                    campaign_id = %campaign.id,
                    recipient = %recipient.email,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retry attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Ok(false)
    }
}
