//! Credential repository
//!
//! Exactly one credential row exists for the sending identity; save replaces
//! it in place. The OAuth-callback handler of the platform writes the initial
//! row, the token store rewrites it on refresh, and disconnect clears it.

use crate::domain::Credential;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Load the current credential, if any has ever been stored
    async fn load(&self) -> Result<Option<Credential>>;

    /// Store the credential, replacing the previous one
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential (disconnect)
    async fn clear(&self) -> Result<()>;
}

pub struct MySqlCredentialRepository {
    pool: MySqlPool,
}

impl MySqlCredentialRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for MySqlCredentialRepository {
    async fn load(&self) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            r#"
            SELECT access_token, refresh_token, scopes, expires_at, updated_at
            FROM mail_credentials
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let scopes_json = serde_json::to_string(&credential.scopes)
            .map_err(|e| crate::error::MailerError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO mail_credentials (id, access_token, refresh_token, scopes, expires_at, updated_at)
            VALUES (1, ?, ?, ?, ?, NOW())
            ON DUPLICATE KEY UPDATE
                access_token = VALUES(access_token),
                refresh_token = VALUES(refresh_token),
                scopes = VALUES(scopes),
                expires_at = VALUES(expires_at),
                updated_at = NOW()
            "#,
        )
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(&scopes_json)
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM mail_credentials WHERE id = 1")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_mock_load_after_save() {
        let mut mock = MockCredentialRepository::new();

        let credential = Credential::new(
            "access",
            "refresh",
            vec!["mail.send".to_string()],
            Utc::now() + Duration::hours(1),
        );
        let stored = credential.clone();

        mock.expect_save().returning(|_| Ok(()));
        mock.expect_load().returning(move || Ok(Some(stored.clone())));

        mock.save(&credential).await.unwrap();
        let loaded = mock.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
    }
}
