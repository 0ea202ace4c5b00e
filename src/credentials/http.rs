//! Refresh client for the backend's `/api/{provider}/refresh` endpoints.

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::RefreshError;
use super::refresh::{RefreshRequest, RefreshedTokens, TokenRefresher};

/// Calls `POST {base_url}/api/{provider}/refresh` with the session bearer.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    user_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_at: ExpiresAt,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresAt {
    Millis(i64),
    Timestamp(String),
}

impl ExpiresAt {
    fn to_millis(&self) -> Result<i64, RefreshError> {
        match self {
            ExpiresAt::Millis(ms) => Ok(*ms),
            ExpiresAt::Timestamp(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|at| at.timestamp_millis())
                .map_err(|err| {
                    RefreshError::Transient(format!("unreadable expires_at {:?}: {}", raw, err))
                }),
        }
    }
}

/// Error bodies carry a `message`, and sometimes an `error` that may be a
/// string or the upstream provider's JSON.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl ErrorBody {
    fn text(self) -> Option<String> {
        self.message.or_else(|| match self.error {
            Some(serde_json::Value::String(error)) => Some(error),
            _ => None,
        })
    }
}

impl HttpTokenRefresher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, request: &RefreshRequest) -> String {
        format!("{}/api/{}/refresh", self.base_url, request.provider)
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, request: RefreshRequest) -> Result<RefreshedTokens, RefreshError> {
        let url = self.endpoint(&request);
        debug!(%url, provider = %request.provider, "calling refresh endpoint");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", request.session_token))
            .json(&RefreshBody {
                user_id: &request.owner_id,
                refresh_token: &request.refresh_token,
            })
            .send()
            .await
            .map_err(|err| RefreshError::Transient(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(ErrorBody::text)
                .unwrap_or(text);
            return Err(RefreshError::from_status(status.as_u16(), message));
        }

        let body = response
            .json::<RefreshResponse>()
            .await
            .map_err(|err| RefreshError::Transient(format!("unreadable refresh response: {}", err)))?;

        Ok(RefreshedTokens {
            expires_at: body.expires_at.to_millis()?,
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            token_type: body.token_type,
        })
    }
}
