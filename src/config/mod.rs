//! Configuration management for the CertHub mailer

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Mailer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Mail provider configuration
    pub provider: ProviderConfig,
    /// Batch sending configuration
    pub sending: SendingConfig,
    /// Retry configuration
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Mail provider and OAuth endpoints
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider message-send endpoint (e.g. https://mail.provider.example/v1/messages/send)
    pub send_url: String,
    /// OAuth token endpoint used for refresh-token redemption
    pub token_url: String,
    /// OAuth client id of the sending identity
    pub client_id: String,
    /// OAuth client secret of the sending identity
    pub client_secret: String,
    /// From address stamped on every outbound message
    pub from_email: String,
    /// From display name (optional)
    pub from_name: Option<String>,
    /// Seconds before expiry at which a cached token is considered stale
    pub token_safety_margin_secs: i64,
}

/// Batch dispatch tuning
///
/// Defaults are conservative: the provider enforces a per-second cap, so
/// batches are small and dispatched sequentially with a fixed delay between
/// them.
#[derive(Debug, Clone)]
pub struct SendingConfig {
    /// Recipients per batch
    pub batch_size: usize,
    /// Delay between batches
    pub inter_batch_delay: Duration,
    /// Timeout for a single provider send call
    pub send_timeout: Duration,
}

impl Default for SendingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_millis(1000),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Retry tuning for previously failed recipients
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per recipient within one retry run
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and a `.env` file when
    /// present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            provider: ProviderConfig {
                send_url: env::var("MAIL_PROVIDER_SEND_URL")
                    .context("MAIL_PROVIDER_SEND_URL is required")?,
                token_url: env::var("MAIL_PROVIDER_TOKEN_URL")
                    .context("MAIL_PROVIDER_TOKEN_URL is required")?,
                client_id: env::var("MAIL_OAUTH_CLIENT_ID")
                    .context("MAIL_OAUTH_CLIENT_ID is required")?,
                client_secret: env::var("MAIL_OAUTH_CLIENT_SECRET")
                    .context("MAIL_OAUTH_CLIENT_SECRET is required")?,
                from_email: env::var("MAIL_FROM_EMAIL").context("MAIL_FROM_EMAIL is required")?,
                from_name: env::var("MAIL_FROM_NAME").ok(),
                token_safety_margin_secs: env::var("MAIL_TOKEN_SAFETY_MARGIN_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            sending: SendingConfig {
                batch_size: env::var("MAIL_BATCH_SIZE")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                inter_batch_delay: Duration::from_millis(
                    env::var("MAIL_INTER_BATCH_DELAY_MS")
                        .unwrap_or_else(|_| "1000".to_string())
                        .parse()
                        .unwrap_or(1000),
                ),
                send_timeout: Duration::from_secs(
                    env::var("MAIL_SEND_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .unwrap_or(30),
                ),
            },
            retry: RetryConfig {
                max_attempts: env::var("MAIL_RETRY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                base_delay: Duration::from_millis(
                    env::var("MAIL_RETRY_BASE_DELAY_MS")
                        .unwrap_or_else(|_| "2000".to_string())
                        .parse()
                        .unwrap_or(2000),
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sending_defaults() {
        let sending = SendingConfig::default();
        assert_eq!(sending.batch_size, 10);
        assert_eq!(sending.inter_batch_delay, Duration::from_millis(1000));
        assert_eq!(sending.send_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(2000));
    }
}
