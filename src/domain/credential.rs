//! OAuth credential domain type

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The OAuth credential pair for the mail-sending identity
///
/// A single shared resource: one row in storage, mutated only by the token
/// store under its own serialization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    #[sqlx(json)]
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        scopes: Vec<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            scopes,
            expires_at,
            updated_at: Utc::now(),
        }
    }

    /// Whether the access token is stale, judged `safety_margin` ahead of the
    /// actual expiry so in-flight sends never race token death.
    pub fn is_expired(&self, safety_margin: Duration) -> bool {
        Utc::now() + safety_margin >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_expiring_in(seconds: i64) -> Credential {
        Credential::new(
            "access-token",
            "refresh-token",
            vec!["mail.send".to_string()],
            Utc::now() + Duration::seconds(seconds),
        )
    }

    #[test]
    fn test_fresh_credential_not_expired() {
        let credential = credential_expiring_in(3600);
        assert!(!credential.is_expired(Duration::seconds(60)));
    }

    #[test]
    fn test_expired_credential() {
        let credential = credential_expiring_in(-10);
        assert!(credential.is_expired(Duration::seconds(60)));
    }

    #[test]
    fn test_safety_margin_counts_as_expired() {
        // Expires in 30s, margin is 60s: treat as expired
        let credential = credential_expiring_in(30);
        assert!(credential.is_expired(Duration::seconds(60)));
        assert!(!credential.is_expired(Duration::seconds(0)));
    }

    #[test]
    fn test_tokens_not_serialized() {
        let credential = credential_expiring_in(3600);
        let json = serde_json::to_string(&credential).unwrap();
        assert!(!json.contains("access-token"));
        assert!(!json.contains("refresh-token"));
        assert!(json.contains("mail.send"));
    }
}
