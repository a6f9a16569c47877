//! REST backend client.
//!
//! One `reqwest::Client` serves both the peer directory and the message
//! transport. The request timeout comes from [`CoreConfig`]; there is no
//! automatic retry.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

use super::{DeliveryReceipt, OutgoingGroupMessage, OutgoingMessage, TransportAdapter};
use crate::config::CoreConfig;
use crate::directory::PeerDirectory;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    members: Vec<String>,
}

/// HTTP client for the backend REST API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpBackend {
    /// Create a client for `config.api_base_url`
    pub fn new(config: &CoreConfig) -> Result<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| Error::InvalidConfig(format!("api_base_url: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            bearer_token: None,
        })
    }

    /// Attach the account's API token to every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig("api_base_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// POST a message body; `not_found` is the error a 404 stands for
    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
        not_found: Error,
    ) -> Result<()> {
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail, not_found));
        }
        Ok(())
    }
}

/// Map a non-success delivery status to an error
///
/// 4xx means the request itself is wrong and will fail the same way again,
/// so only 5xx (and anything unexpected) stays retryable.
fn status_error(status: StatusCode, detail: &str, not_found: Error) -> Error {
    if status == StatusCode::NOT_FOUND {
        not_found
    } else if status == StatusCode::REQUEST_TIMEOUT {
        Error::Timeout(format!("backend returned {}", status))
    } else if status.is_client_error() {
        Error::DeliveryRejected(format!("backend returned {}: {}", status, detail))
    } else {
        Error::DeliveryFailed(format!("backend returned {}: {}", status, detail))
    }
}

#[async_trait]
impl PeerDirectory for HttpBackend {
    async fn get_public_key(&self, username: &str) -> Result<String> {
        let url = self.endpoint(&["peer", username, "public_key"])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(Error::PeerKeyUnavailable(username.to_string()))
            }
            status if !status.is_success() => {
                return Err(Error::TransportError(format!(
                    "public key lookup returned {}",
                    status
                )))
            }
            _ => {}
        }

        let body: PublicKeyResponse = response.json().await?;
        match body.public_key {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::PeerKeyUnavailable(username.to_string())),
        }
    }

    async fn get_group_members(&self, group_id: &str) -> Result<BTreeSet<String>> {
        let url = self.endpoint(&["group", group_id, "members"])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(Error::GroupNotFound(group_id.to_string())),
            status if !status.is_success() => {
                return Err(Error::TransportError(format!("roster lookup returned {}", status)))
            }
            _ => {}
        }

        let body: MembersResponse = response.json().await?;
        Ok(body.members.into_iter().collect())
    }
}

#[async_trait]
impl TransportAdapter for HttpBackend {
    async fn send_message(&self, message: &OutgoingMessage) -> Result<DeliveryReceipt> {
        let url = self.endpoint(&["message"])?;
        let not_found = Error::PeerKeyUnavailable(message.recipient.clone());
        self.post(url, message, not_found).await?;

        tracing::debug!(message_id = %message.id, "Direct message accepted");
        Ok(DeliveryReceipt {
            message_id: message.id.clone(),
            recipients: 1,
        })
    }

    async fn send_group_message(&self, message: &OutgoingGroupMessage) -> Result<DeliveryReceipt> {
        let url = self.endpoint(&["group_message"])?;
        let not_found = Error::GroupNotFound(message.group.clone());
        self.post(url, message, not_found).await?;

        tracing::debug!(
            message_id = %message.id,
            group = %message.group,
            "Group message accepted"
        );
        Ok(DeliveryReceipt {
            message_id: message.id.clone(),
            recipients: message.body.ciphertexts().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> HttpBackend {
        let config = CoreConfig {
            api_base_url: base.to_string(),
            ..CoreConfig::default()
        };
        HttpBackend::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let backend = backend("https://chat.example/api/");
        let url = backend.endpoint(&["peer", "bob", "public_key"]).unwrap();
        assert_eq!(url.as_str(), "https://chat.example/api/peer/bob/public_key");
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let backend = backend("https://chat.example/api");
        let url = backend.endpoint(&["message"]).unwrap();
        assert_eq!(url.as_str(), "https://chat.example/api/message");
    }

    #[test]
    fn test_endpoint_escapes_usernames() {
        let backend = backend("https://chat.example/");
        let url = backend.endpoint(&["peer", "a/b c", "public_key"]).unwrap();
        assert_eq!(url.as_str(), "https://chat.example/peer/a%2Fb%20c/public_key");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = CoreConfig {
            api_base_url: "not a url".to_string(),
            ..CoreConfig::default()
        };
        assert!(matches!(HttpBackend::new(&config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_not_found_maps_to_caller_error() {
        let err = status_error(
            StatusCode::NOT_FOUND,
            "",
            Error::GroupNotFound("g".into()),
        );
        assert!(matches!(err, Error::GroupNotFound(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::PAYLOAD_TOO_LARGE,
        ] {
            let err = status_error(status, "nope", Error::PeerKeyUnavailable("bob".into()));
            assert!(matches!(err, Error::DeliveryRejected(_)), "{}", status);
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn test_server_errors_stay_retryable() {
        for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::SERVICE_UNAVAILABLE] {
            let err = status_error(status, "", Error::PeerKeyUnavailable("bob".into()));
            assert!(matches!(err, Error::DeliveryFailed(_)), "{}", status);
            assert!(err.is_recoverable());
        }

        let not_found = Error::PeerKeyUnavailable("bob".into());
        let err = status_error(StatusCode::REQUEST_TIMEOUT, "", not_found);
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let config = CoreConfig {
            api_base_url: "http://127.0.0.1:9/".to_string(),
            request_timeout_secs: 2,
            ..CoreConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();

        let result = backend.get_public_key("bob").await;
        assert!(matches!(result, Err(Error::TransportError(_)) | Err(Error::Timeout(_))));
    }
}
