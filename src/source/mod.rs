//! Collaborator interfaces provided by the rest of the platform
//!
//! The engine never reads participant storage or renders certificates itself;
//! the web application wires implementations of these traits in. Both are
//! narrow on purpose: a batch id in, recipients out; a recipient in,
//! attachment bytes out.

use crate::domain::{Recipient, ResolvedAttachment, StringUuid};
use crate::error::Result;
use async_trait::async_trait;

/// Recipient batches, provided by participant storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Load the full recipient list for a batch, in stable order
    async fn load_recipients(&self, batch_id: StringUuid) -> Result<Vec<Recipient>>;
}

/// Attachment bytes, provided by the certificate-generation subsystem
///
/// `Ok(None)` means the recipient simply has nothing to attach. An `Err` is a
/// per-recipient failure: the scheduler records a failed attempt with an
/// attachment-prefixed error and moves on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    async fn resolve(&self, recipient: &Recipient) -> Result<Option<ResolvedAttachment>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_recipient_source() {
        let mut mock = MockRecipientSource::new();
        let batch_id = StringUuid::new_v4();

        mock.expect_load_recipients().returning(|_| {
            Ok(vec![
                Recipient::new("a@example.com", "A"),
                Recipient::new("b@example.com", "B"),
            ])
        });

        let recipients = mock.load_recipients(batch_id).await.unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].email, "a@example.com");
    }

    #[tokio::test]
    async fn test_mock_attachment_resolver_none() {
        let mut mock = MockAttachmentResolver::new();

        mock.expect_resolve().returning(|_| Ok(None));

        let recipient = Recipient::new("a@example.com", "A");
        let resolved = mock.resolve(&recipient).await.unwrap();
        assert!(resolved.is_none());
    }
}
