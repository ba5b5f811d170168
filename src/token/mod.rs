//! OAuth token store for the mail-sending identity
//!
//! Serves the current access token, refreshing it transparently when stale.
//! The refresh is single-flighted process-wide: concurrent campaigns share
//! one store, and a refresh-token redemption must happen at most once because
//! the provider rejects a second redemption of the same refresh token.

use crate::config::ProviderConfig;
use crate::domain::Credential;
use crate::error::{MailerError, Result};
use crate::repository::CredentialRepository;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current non-expired credential, refreshing first when necessary.
    ///
    /// Fails with [`MailerError::ReauthenticationRequired`] when no credential
    /// was ever stored or the refresh token is rejected; that error is never
    /// retried here and must abort the campaign setup with a readable reason.
    async fn get(&self) -> Result<Credential>;

    /// Refresh now regardless of expiry (after a provider 401 on a token the
    /// store still considered fresh).
    async fn force_refresh(&self) -> Result<Credential>;

    /// Store a credential obtained by the OAuth-callback handler
    async fn save(&self, credential: Credential) -> Result<()>;

    /// Drop the credential (account disconnect)
    async fn clear(&self) -> Result<()>;
}

/// Token refresh response from the OAuth endpoint
#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    /// Some providers rotate the refresh token on every redemption
    refresh_token: Option<String>,
    scope: Option<String>,
}

pub struct OAuthTokenStore<R: CredentialRepository> {
    repo: Arc<R>,
    http_client: reqwest::Client,
    config: ProviderConfig,
    cached: RwLock<Option<Credential>>,
    /// Serializes refresh; get() holds it only on the slow path
    refresh_lock: Mutex<()>,
}

impl<R: CredentialRepository> OAuthTokenStore<R> {
    pub fn new(repo: Arc<R>, config: ProviderConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            repo,
            http_client,
            config,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    fn safety_margin(&self) -> Duration {
        Duration::seconds(self.config.token_safety_margin_secs)
    }

    /// Current credential from cache or storage, without refreshing
    async fn current(&self) -> Result<Credential> {
        if let Some(credential) = self.cached.read().await.clone() {
            return Ok(credential);
        }

        let credential = self.repo.load().await?.ok_or_else(|| {
            MailerError::ReauthenticationRequired(
                "no mail credential stored; connect the sending account first".to_string(),
            )
        })?;

        *self.cached.write().await = Some(credential.clone());
        Ok(credential)
    }

    /// Redeem the refresh token and persist the new credential.
    ///
    /// Caller must hold `refresh_lock`.
    async fn refresh(&self, stale: &Credential) -> Result<Credential> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
            ("refresh_token", &stale.refresh_token),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                MailerError::ReauthenticationRequired(format!("token refresh failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::ReauthenticationRequired(format!(
                "token refresh rejected: {} - {}",
                status, body
            )));
        }

        let refresh_response: RefreshResponse = response.json().await.map_err(|e| {
            MailerError::ReauthenticationRequired(format!("invalid token response: {}", e))
        })?;

        let scopes = match refresh_response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => stale.scopes.clone(),
        };

        let credential = Credential::new(
            refresh_response.access_token,
            // Keep the previous refresh token unless the provider rotated it
            refresh_response
                .refresh_token
                .unwrap_or_else(|| stale.refresh_token.clone()),
            scopes,
            Utc::now() + Duration::seconds(refresh_response.expires_in),
        );

        self.repo.save(&credential).await?;
        *self.cached.write().await = Some(credential.clone());

        metrics::counter!("mailer.token_refreshes").increment(1);
        tracing::info!(expires_at = %credential.expires_at, "mail credential refreshed");

        Ok(credential)
    }
}

#[async_trait]
impl<R: CredentialRepository> TokenStore for OAuthTokenStore<R> {
    async fn get(&self) -> Result<Credential> {
        // Fast path: cached and fresh
        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref() {
                if !credential.is_expired(self.safety_margin()) {
                    return Ok(credential.clone());
                }
            }
        }

        // Slow path: serialize, then re-check in case another caller already
        // refreshed while we waited on the lock.
        let _guard = self.refresh_lock.lock().await;

        let current = self.current().await?;
        if !current.is_expired(self.safety_margin()) {
            return Ok(current);
        }

        self.refresh(&current).await
    }

    async fn force_refresh(&self) -> Result<Credential> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.current().await?;
        self.refresh(&current).await
    }

    async fn save(&self, credential: Credential) -> Result<()> {
        self.repo.save(&credential).await?;
        *self.cached.write().await = Some(credential);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.repo.clear().await?;
        *self.cached.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::credential::MockCredentialRepository;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_config(token_url: String) -> ProviderConfig {
        ProviderConfig {
            send_url: "https://mail.provider.example/v1/messages/send".to_string(),
            token_url,
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            from_email: "certificates@certhub.example".to_string(),
            from_name: Some("CertHub".to_string()),
            token_safety_margin_secs: 60,
        }
    }

    fn expired_credential() -> Credential {
        Credential::new(
            "stale-access",
            "refresh-1",
            vec!["mail.send".to_string()],
            Utc::now() - Duration::seconds(10),
        )
    }

    fn fresh_credential() -> Credential {
        Credential::new(
            "fresh-access",
            "refresh-1",
            vec!["mail.send".to_string()],
            Utc::now() + Duration::hours(1),
        )
    }

    fn refresh_response_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "new-access",
            "expires_in": 3600,
            "refresh_token": "refresh-2",
            "scope": "mail.send"
        })
    }

    #[tokio::test]
    async fn test_get_returns_cached_fresh_credential() {
        let mut repo = MockCredentialRepository::new();
        let credential = fresh_credential();
        let stored = credential.clone();
        repo.expect_load().times(1).returning(move || Ok(Some(stored.clone())));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config("http://unused.example/token".to_string()),
        );

        let first = store.get().await.unwrap();
        // Second get must hit the in-memory cache, not the repository
        let second = store.get().await.unwrap();
        assert_eq!(first.access_token, "fresh-access");
        assert_eq!(second.access_token, "fresh-access");
    }

    #[tokio::test]
    async fn test_get_without_stored_credential_requires_reauthentication() {
        let mut repo = MockCredentialRepository::new();
        repo.expect_load().returning(|| Ok(None));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config("http://unused.example/token".to_string()),
        );

        let result = store.get().await;
        assert!(matches!(
            result,
            Err(MailerError::ReauthenticationRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(refresh_response_body()))
            .expect(1)
            .mount(&server)
            .await;

        let mut repo = MockCredentialRepository::new();
        let stale = expired_credential();
        repo.expect_load().returning(move || Ok(Some(stale.clone())));
        repo.expect_save()
            .withf(|c| c.access_token == "new-access" && c.refresh_token == "refresh-2")
            .times(1)
            .returning(|_| Ok(()));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config(format!("{}/token", server.uri())),
        );

        let credential = store.get().await.unwrap();
        assert_eq!(credential.access_token, "new-access");
        assert!(!credential.is_expired(Duration::seconds(60)));
    }

    #[tokio::test]
    async fn test_refresh_is_single_flighted() {
        let server = MockServer::start().await;
        // The provider rejects a second redemption; exactly one call allowed
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(refresh_response_body()))
            .expect(1)
            .mount(&server)
            .await;

        let mut repo = MockCredentialRepository::new();
        let stale = expired_credential();
        repo.expect_load().returning(move || Ok(Some(stale.clone())));
        repo.expect_save().returning(|_| Ok(()));

        let store = Arc::new(OAuthTokenStore::new(
            Arc::new(repo),
            provider_config(format!("{}/token", server.uri())),
        ));

        let (a, b, c, d) = tokio::join!(store.get(), store.get(), store.get(), store.get());
        for result in [a, b, c, d] {
            assert_eq!(result.unwrap().access_token, "new-access");
        }
    }

    #[tokio::test]
    async fn test_rejected_refresh_surfaces_reauthentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&server)
            .await;

        let mut repo = MockCredentialRepository::new();
        let stale = expired_credential();
        repo.expect_load().returning(move || Ok(Some(stale.clone())));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config(format!("{}/token", server.uri())),
        );

        let result = store.get().await;
        match result {
            Err(MailerError::ReauthenticationRequired(msg)) => {
                assert!(msg.contains("invalid_grant"));
            }
            other => panic!("Expected ReauthenticationRequired, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let mut repo = MockCredentialRepository::new();
        let stale = expired_credential();
        repo.expect_load().returning(move || Ok(Some(stale.clone())));
        repo.expect_save()
            .withf(|c| c.refresh_token == "refresh-1" && c.scopes == vec!["mail.send".to_string()])
            .returning(|_| Ok(()));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config(format!("{}/token", server.uri())),
        );

        let credential = store.get().await.unwrap();
        assert_eq!(credential.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn test_clear_drops_cache_and_storage() {
        let mut repo = MockCredentialRepository::new();
        repo.expect_save().returning(|_| Ok(()));
        repo.expect_clear().times(1).returning(|| Ok(()));
        // After clear, get() falls through to the repository again
        repo.expect_load().returning(|| Ok(None));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config("http://unused.example/token".to_string()),
        );

        store.save(fresh_credential()).await.unwrap();
        store.clear().await.unwrap();

        let result = store.get().await;
        assert!(matches!(
            result,
            Err(MailerError::ReauthenticationRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_save_caches_credential() {
        let mut repo = MockCredentialRepository::new();
        repo.expect_save().times(1).returning(|_| Ok(()));

        let store = OAuthTokenStore::new(
            Arc::new(repo),
            provider_config("http://unused.example/token".to_string()),
        );

        store.save(fresh_credential()).await.unwrap();
        let credential = store.get().await.unwrap();
        assert_eq!(credential.access_token, "fresh-access");
    }
}
