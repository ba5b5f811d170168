//! Domain models for the mailer engine

pub mod campaign;
pub mod common;
pub mod credential;
pub mod delivery;
pub mod recipient;

pub use campaign::{
    Campaign, CampaignResult, CampaignStatus, CampaignStatusReport, CreateCampaignInput,
};
pub use common::StringUuid;
pub use credential::Credential;
pub use delivery::{DeliveryAttempt, DeliveryCounts, DeliveryStatus};
pub use recipient::{AttachmentRef, Recipient, ResolvedAttachment};
