//! HTTP mail transport against the provider's REST send API
//!
//! The provider accepts a JSON payload carrying the base64url-encoded raw
//! RFC 5322 message and responds with the provider-side message id. Rate
//! limits and token rejections come back as HTTP statuses and are mapped to
//! the transport error taxonomy here.

use super::mime::build_mime;
use super::provider::{MailTransport, OutboundMessage, SendReceipt, TransportError};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

pub struct HttpMailTransport {
    http_client: reqwest::Client,
    send_url: String,
    from_email: String,
    from_name: Option<String>,
}

#[derive(Deserialize)]
struct SendResponse {
    id: Option<String>,
}

impl HttpMailTransport {
    pub fn new(config: &ProviderConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            send_url: config.send_url.clone(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(
        &self,
        access_token: &str,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, TransportError> {
        let mime = build_mime(&self.from_email, self.from_name.as_deref(), message)?;
        let raw = URL_SAFE_NO_PAD.encode(mime);

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(30)
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => Err(TransportError::Unauthorized),
            429 => Err(TransportError::RateLimited),
            _ if status.is_success() => {
                let body: SendResponse = response
                    .json()
                    .await
                    .unwrap_or(SendResponse { id: None });

                metrics::counter!("mailer.provider_sends").increment(1);

                Ok(SendReceipt {
                    provider_message_id: body.id,
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(TransportError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
