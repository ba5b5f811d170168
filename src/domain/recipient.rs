//! Recipient domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque handle to an attachment held by the certificate subsystem
///
/// The engine never interprets the handle; it is resolved to bytes by an
/// [`crate::source::AttachmentResolver`] at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentRef(pub String);

impl AttachmentRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

impl std::fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One member of a campaign's recipient batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
    /// Per-recipient template substitutions ({{name}}, {{certificate_id}},
    /// arbitrary batch columns). Missing keys render as empty strings.
    #[serde(default)]
    pub substitutions: HashMap<String, String>,
    pub attachment: Option<AttachmentRef>,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let email = email.into();
        let name = name.into();
        let mut substitutions = HashMap::new();
        substitutions.insert("email".to_string(), email.clone());
        substitutions.insert("name".to_string(), name.clone());
        Self {
            email,
            name,
            substitutions,
            attachment: None,
        }
    }

    pub fn with_substitution(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.substitutions.insert(key.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, handle: impl Into<String>) -> Self {
        self.attachment = Some(AttachmentRef::new(handle));
        self
    }
}

/// An attachment resolved to bytes, ready to be attached to a message
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_builder() {
        let recipient = Recipient::new("alice@example.com", "Alice")
            .with_substitution("certificate_id", "CERT-2026-001")
            .with_attachment("certificates/CERT-2026-001.pdf");

        assert_eq!(recipient.email, "alice@example.com");
        assert_eq!(
            recipient.substitutions.get("certificate_id").unwrap(),
            "CERT-2026-001"
        );
        assert_eq!(
            recipient.attachment.as_ref().unwrap().to_string(),
            "certificates/CERT-2026-001.pdf"
        );
    }

    #[test]
    fn test_recipient_default_substitutions() {
        let recipient = Recipient::new("bob@example.com", "Bob");
        assert_eq!(recipient.substitutions.get("name").unwrap(), "Bob");
        assert_eq!(
            recipient.substitutions.get("email").unwrap(),
            "bob@example.com"
        );
        assert!(recipient.attachment.is_none());
    }
}
