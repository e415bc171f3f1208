//! HTTP client for the remote sync authority.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{ChangeEvent, ChangeEventsResponse, SyncBatchRequest, SyncBatchResponse};
use crate::util::{is_http_url, normalize_text_option};

const BATCH_PATH: &str = "/v1/sync/batch";
const EVENTS_PATH: &str = "/v1/sync/events";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Remote request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The single authority that resolves conflicts for every owner
#[allow(async_fn_in_trait)]
pub trait RemoteAuthority {
    /// Submit an ordered batch and receive the owner's full current note set
    async fn submit_batch(&self, request: &SyncBatchRequest) -> RemoteResult<SyncBatchResponse>;
}

#[derive(Clone)]
pub struct HttpRemoteAuthority {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteAuthority {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteAuthority")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteAuthority {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> RemoteResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            token: normalize_text_option(token),
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// List change events recorded for `owner_id` at or after `since`
    pub async fn fetch_events(
        &self,
        owner_id: &str,
        since: Option<i64>,
    ) -> RemoteResult<Vec<ChangeEvent>> {
        let mut query = vec![("owner_id", owner_id.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }

        let response = self
            .authorize(self.client.get(format!("{}{EVENTS_PATH}", self.base_url)))
            .query(&query)
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = check_status(response).await?;
        let payload = response.json::<ChangeEventsResponse>().await?;
        Ok(payload.events)
    }
}

impl RemoteAuthority for HttpRemoteAuthority {
    async fn submit_batch(&self, request: &SyncBatchRequest) -> RemoteResult<SyncBatchResponse> {
        let response = self
            .authorize(self.client.post(format!("{}{BATCH_PATH}", self.base_url)))
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let payload = response.json::<SyncBatchResponse>().await?;
        if payload.notes.iter().any(|note| note.owner_id != request.owner_id) {
            return Err(RemoteError::InvalidPayload(
                "response included notes of another owner".to_string(),
            ));
        }
        Ok(payload)
    }
}

async fn check_status(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Api(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url(" https://sync.example.com/ ".to_string()).unwrap(),
            "https://sync.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, r#"{"error":"missing bearer token"}"#),
            "missing bearer token (401)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "boom (500)"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let authority =
            HttpRemoteAuthority::new("http://localhost:8080", Some("secret".to_string())).unwrap();
        let debug = format!("{authority:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn timeout_error_reports_duration() {
        let error = RemoteError::Timeout(Duration::from_secs(15));
        assert_eq!(error.to_string(), "Remote request timed out after 15000ms");
    }
}
