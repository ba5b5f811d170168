//! Campaign scheduler: lifecycle, batched dispatch, finalization
//!
//! One send per campaign at a time. The persisted campaign status is the
//! lock: the atomic `draft|scheduled -> sending` transition decides who owns
//! the send, so a second concurrent call (or a retry racing a send) loses
//! with `InvalidState`. Per-recipient failures are recorded into the ledger
//! and never abort the campaign; setup failures (no recipients, unusable
//! credential) mark the whole campaign failed before any attempt exists.

use crate::config::SendingConfig;
use crate::domain::{
    Campaign, CampaignResult, CampaignStatus, CampaignStatusReport, CreateCampaignInput,
    DeliveryAttempt, DeliveryStatus, Recipient, StringUuid,
};
use crate::error::{MailerError, Result};
use crate::repository::{CampaignRepository, DeliveryAttemptRepository};
use crate::service::progress::{ProgressEvent, ProgressObserver};
use crate::source::{AttachmentResolver, RecipientSource};
use crate::template;
use crate::token::TokenStore;
use crate::transport::{MailTransport, OutboundMessage, SendReceipt, TransportError};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use validator::Validate;

/// Cooperative cancellation flag, checked between batches
///
/// Cancelling takes effect within one batch's worth of sends: the current
/// batch finishes, later batches are skipped, and the campaign finalizes
/// from whatever the ledger holds.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one dispatch to the provider, before it is recorded
enum DispatchOutcome {
    Accepted(SendReceipt),
    Failed(TransportError),
}

pub struct CampaignService<C: CampaignRepository, D: DeliveryAttemptRepository> {
    campaigns: Arc<C>,
    ledger: Arc<D>,
    recipients: Arc<dyn RecipientSource>,
    attachments: Arc<dyn AttachmentResolver>,
    transport: Arc<dyn MailTransport>,
    tokens: Arc<dyn TokenStore>,
    sending: SendingConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl<C: CampaignRepository, D: DeliveryAttemptRepository> CampaignService<C, D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<C>,
        ledger: Arc<D>,
        recipients: Arc<dyn RecipientSource>,
        attachments: Arc<dyn AttachmentResolver>,
        transport: Arc<dyn MailTransport>,
        tokens: Arc<dyn TokenStore>,
        sending: SendingConfig,
    ) -> Self {
        Self {
            campaigns,
            ledger,
            recipients,
            attachments,
            transport,
            tokens,
            sending,
            observer: None,
        }
    }

    /// Register the progress observer notified after each batch
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Create a campaign in `draft`, or `scheduled` when a future
    /// `scheduled_at` is supplied
    pub async fn create_campaign(&self, input: CreateCampaignInput) -> Result<Campaign> {
        input.validate()?;

        let status = match input.scheduled_at {
            Some(at) if at > Utc::now() => CampaignStatus::Scheduled,
            _ => CampaignStatus::Draft,
        };

        let campaign = self.campaigns.create(&input, status).await?;
        tracing::info!(campaign_id = %campaign.id, status = %campaign.status, "campaign created");
        Ok(campaign)
    }

    /// Send a campaign to its full recipient batch
    pub async fn send_campaign(&self, id: StringUuid) -> Result<CampaignResult> {
        self.send_campaign_with_cancel(id, CancelHandle::new()).await
    }

    /// Send with an externally held cancellation handle
    pub async fn send_campaign_with_cancel(
        &self,
        id: StringUuid,
        cancel: CancelHandle,
    ) -> Result<CampaignResult> {
        let campaign = self
            .campaigns
            .find_by_id(id)
            .await?
            .ok_or_else(|| MailerError::NotFound(format!("Campaign {} not found", id)))?;

        let owns_send = self
            .campaigns
            .try_transition(
                id,
                &[CampaignStatus::Draft, CampaignStatus::Scheduled],
                CampaignStatus::Sending,
            )
            .await?;

        if !owns_send {
            return Err(MailerError::InvalidState(format!(
                "campaign {} is {} and cannot start sending",
                id, campaign.status
            )));
        }

        match self.run_send(&campaign, &cancel).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let reason = err.user_message();
                tracing::warn!(campaign_id = %id, reason = %reason, "campaign send failed");
                // Best effort: when storage itself is down this write fails
                // too, and the original error is the one worth surfacing.
                let _ = self.campaigns.mark_failed(id, &reason).await;
                Err(err)
            }
        }
    }

    async fn run_send(&self, campaign: &Campaign, cancel: &CancelHandle) -> Result<CampaignResult> {
        // Token preflight: an unusable credential must fail the campaign
        // before a single attempt row exists.
        self.tokens.get().await?;

        let recipients = self.recipients.load_recipients(campaign.batch_id).await?;
        if recipients.is_empty() {
            return Err(MailerError::EmptyRecipientSet(campaign.id));
        }

        let total = recipients.len();
        self.campaigns
            .set_total_recipients(campaign.id, total as i64)
            .await?;

        tracing::info!(
            campaign_id = %campaign.id,
            total,
            batch_size = self.sending.batch_size,
            "campaign send started"
        );

        let mut processed = 0usize;
        let mut succeeded = 0usize;

        for (batch_index, batch) in recipients.chunks(self.sending.batch_size.max(1)).enumerate() {
            if batch_index > 0 {
                if cancel.is_cancelled() {
                    tracing::info!(campaign_id = %campaign.id, processed, "campaign send cancelled");
                    break;
                }
                tokio::time::sleep(self.sending.inter_batch_delay).await;
            }

            for recipient in batch {
                let attempt = self.send_to_recipient(campaign, recipient).await?;
                processed += 1;
                if attempt.status == DeliveryStatus::Sent {
                    succeeded += 1;
                }
            }

            self.emit_progress(campaign.id, processed, total, succeeded);
        }

        // Counters come from the ledger, not from in-memory tallies, so the
        // persisted numbers cannot drift from the audit trail.
        let counts = self.ledger.aggregate(campaign.id).await?;
        let finalized = self.campaigns.mark_completed(campaign.id, &counts).await?;

        tracing::info!(
            campaign_id = %campaign.id,
            sent = finalized.sent,
            failed = finalized.failed,
            "campaign completed"
        );

        Ok(CampaignResult {
            total: finalized.total_recipients,
            sent: finalized.sent,
            failed: finalized.failed,
        })
    }

    /// Send one recipient's message and append the outcome to the ledger.
    ///
    /// Returns the recorded attempt. Errors from this method are fatal to the
    /// whole run (unusable credential, ledger write failure); everything
    /// recipient-scoped is folded into the recorded attempt instead.
    pub(crate) async fn send_to_recipient(
        &self,
        campaign: &Campaign,
        recipient: &Recipient,
    ) -> Result<DeliveryAttempt> {
        let attempt = match self.dispatch(campaign, recipient).await? {
            DispatchOutcome::Accepted(receipt) => {
                metrics::counter!("mailer.recipients_sent").increment(1);
                DeliveryAttempt::sent(campaign.id, recipient, receipt.provider_message_id)
            }
            DispatchOutcome::Failed(err) => {
                metrics::counter!("mailer.recipients_failed").increment(1);
                tracing::warn!(
                    campaign_id = %campaign.id,
                    recipient = %recipient.email,
                    error = %err,
                    "recipient send failed"
                );
                DeliveryAttempt::failed(campaign.id, recipient, err.to_string())
            }
        };

        self.ledger.record(&attempt).await?;
        Ok(attempt)
    }

    async fn dispatch(
        &self,
        campaign: &Campaign,
        recipient: &Recipient,
    ) -> Result<DispatchOutcome> {
        let subject = template::render_subject(&campaign.subject, &recipient.substitutions);
        let html_body = template::render_html(&campaign.body_template, &recipient.substitutions);

        let attachment = match self.attachments.resolve(recipient).await {
            Ok(attachment) => attachment,
            Err(err) => {
                return Ok(DispatchOutcome::Failed(TransportError::Attachment(
                    err.user_message(),
                )));
            }
        };

        let message = OutboundMessage {
            to_email: recipient.email.clone(),
            to_name: Some(recipient.name.clone()),
            subject,
            html_body,
            attachment,
        };

        let credential = self.tokens.get().await?;

        match self.timed_send(&credential.access_token, &message).await {
            Ok(receipt) => Ok(DispatchOutcome::Accepted(receipt)),
            Err(TransportError::Unauthorized) => {
                // The provider disagreed with a token the store considered
                // fresh; redeem the refresh token once and resend.
                let refreshed = self.tokens.force_refresh().await?;
                match self.timed_send(&refreshed.access_token, &message).await {
                    Ok(receipt) => Ok(DispatchOutcome::Accepted(receipt)),
                    Err(err) => Ok(DispatchOutcome::Failed(err)),
                }
            }
            Err(err) => Ok(DispatchOutcome::Failed(err)),
        }
    }

    async fn timed_send(
        &self,
        access_token: &str,
        message: &OutboundMessage,
    ) -> std::result::Result<SendReceipt, TransportError> {
        match tokio::time::timeout(
            self.sending.send_timeout,
            self.transport.send(access_token, message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.sending.send_timeout.as_secs())),
        }
    }

    fn emit_progress(&self, campaign_id: StringUuid, processed: usize, total: usize, succeeded: usize) {
        if let Some(observer) = &self.observer {
            observer.on_progress(&ProgressEvent {
                campaign_id,
                processed,
                total,
                succeeded,
            });
        }
    }

    /// Campaign status and delivery stats, queryable mid-send
    pub async fn campaign_status(&self, id: StringUuid) -> Result<CampaignStatusReport> {
        let campaign = self
            .campaigns
            .find_by_id(id)
            .await?
            .ok_or_else(|| MailerError::NotFound(format!("Campaign {} not found", id)))?;

        let counts = self.ledger.aggregate(id).await?;

        let progress_pct = if campaign.total_recipients > 0 {
            (counts.total() * 100 / campaign.total_recipients).min(100) as u8
        } else {
            0
        };

        Ok(CampaignStatusReport {
            status: campaign.status,
            progress_pct,
            counts,
        })
    }
}
