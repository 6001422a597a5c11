//! Private channel authorization
//!
//! Private channels need a signature from the platform's broadcasting auth
//! endpoint, bound to the transport's socket id.

use async_trait::async_trait;
use chat_resilience::{Classify, ErrorSignal};
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Signature to put in the `auth` field of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("auth endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed auth response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("auth unavailable: no signed-in user")]
    NotSignedIn,
}

impl Classify for AuthError {
    fn signal(&self) -> ErrorSignal {
        match self {
            Self::Request(err) => {
                let signal = ErrorSignal::from_error(self);
                match err.status() {
                    Some(status) => signal.with_status(status.as_u16()),
                    None => signal,
                }
            }
            Self::Status { status, .. } => ErrorSignal::new(self.to_string()).with_status(*status),
            Self::Decode(_) => ErrorSignal::parse(self.to_string()),
            Self::NotSignedIn => ErrorSignal::new(self.to_string()),
        }
    }
}

/// Source of channel signatures
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn auth_for_channel(
        &self,
        channel: &str,
        socket_id: &str,
    ) -> Result<ChannelAuth, AuthError>;
}

/// Calls the platform's broadcasting auth endpoint with the user's token
#[derive(Debug, Clone)]
pub struct HttpAuthProvider {
    endpoint: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpAuthProvider {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(AuthError::Request)?;

        Ok(Self {
            endpoint: endpoint.into(),
            token,
            http,
        })
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn auth_for_channel(
        &self,
        channel: &str,
        socket_id: &str,
    ) -> Result<ChannelAuth, AuthError> {
        let token = self.token.as_deref().ok_or(AuthError::NotSignedIn)?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "socket_id": socket_id,
                "channel_name": channel,
            }))
            .send()
            .await
            .map_err(AuthError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<ChannelAuth>().await.map_err(AuthError::Decode)
    }
}
