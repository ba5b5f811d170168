//! Unified error handling for the CertHub mailer

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, MailerError>;

/// Mailer error types
///
/// Per-recipient transport failures are not represented here: they are
/// recorded into the delivery ledger as failed attempts and never abort a
/// campaign (see [`crate::transport::TransportError`]).
#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Campaign {0} has no recipients")]
    EmptyRecipientSet(crate::domain::StringUuid),

    #[error("Re-authentication required: {0}")]
    ReauthenticationRequired(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MailerError {
    /// Human-readable reason suitable for persisting on a failed campaign
    /// and for display to operators.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyRecipientSet(_) => "no recipients".to_string(),
            Self::ReauthenticationRequired(_) => "re-authentication required".to_string(),
            Self::InvalidState(msg) => msg.clone(),
            Self::NotFound(msg) => msg.clone(),
            Self::Validation(msg) => msg.clone(),
            Self::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "storage unavailable".to_string()
            }
            Self::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "internal error".to_string()
            }
        }
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for MailerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        MailerError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StringUuid;

    #[test]
    fn test_error_display() {
        let err = MailerError::InvalidState("campaign is already sending".to_string());
        assert_eq!(err.to_string(), "Invalid state: campaign is already sending");
    }

    #[test]
    fn test_error_conversion() {
        let err: MailerError = anyhow::anyhow!("Something went wrong").into();
        assert!(matches!(err, MailerError::Internal(_)));
    }

    #[test]
    fn test_user_message_empty_recipients() {
        let err = MailerError::EmptyRecipientSet(StringUuid::new_v4());
        assert_eq!(err.user_message(), "no recipients");
    }

    #[test]
    fn test_user_message_reauthentication() {
        let err = MailerError::ReauthenticationRequired("refresh token revoked".to_string());
        assert_eq!(err.user_message(), "re-authentication required");
    }
}
