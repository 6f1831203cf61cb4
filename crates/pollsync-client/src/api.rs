//! HTTP boundary to the poll API.
//!
//! Every response passes through [`intercept`]: success bodies are decoded,
//! failures have their `detail` classified into an [`ErrorCategory`]. Callers
//! never see raw transport errors.

use async_trait::async_trait;
use pollsync_core::{
    classify, CreatePollRequest, CreatePollResponse, ErrorCategory, ErrorDetail, PollSnapshot,
    VoteRequest, VoteResponse,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::metrics;

/// Failure of an API request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{category} (status {status})")]
    Rejected { status: u16, category: ErrorCategory },

    /// No response: connect failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// A success response whose body did not decode.
    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// The user-facing category for this failure.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Rejected { category, .. } => category.clone(),
            ApiError::Network(_) => ErrorCategory::Network,
            ApiError::Decode(_) | ApiError::InvalidBaseUrl(_) => ErrorCategory::Unknown,
        }
    }
}

/// The poll REST API.
#[async_trait]
pub trait PollApi: Send + Sync {
    /// `GET /polls/{id}`
    async fn get_poll(&self, poll_id: &str) -> Result<PollSnapshot, ApiError>;

    /// `POST /polls`
    async fn create_poll(&self, request: &CreatePollRequest) -> Result<CreatePollResponse, ApiError>;

    /// `POST /polls/{id}/vote`
    async fn vote(&self, poll_id: &str, request: &VoteRequest) -> Result<VoteResponse, ApiError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Turn a status and body into a decoded value or a classified error.
///
/// # Errors
///
/// Returns [`ApiError::Rejected`] for non-2xx statuses and
/// [`ApiError::Decode`] for success bodies of the wrong shape.
pub fn intercept<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ApiError> {
    if (200..300).contains(&status) {
        return serde_json::from_slice(body).map_err(|e| {
            error!(status, error = %e, "Undecodable response body");
            metrics::record_error(ErrorCategory::Unknown.kind());
            ApiError::Decode(e.to_string())
        });
    }

    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .and_then(ErrorDetail::from_value);
    let category = match detail {
        Some(detail) => classify(Some(&detail)),
        None => ErrorCategory::Opaque(format!("request failed with status code {status}")),
    };

    warn!(status, code = category.code(), "Request rejected: {}", category);
    metrics::record_error(category.kind());
    Err(ApiError::Rejected { status, category })
}

/// [`PollApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPollApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPollApi {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be a base or the client cannot be
    /// built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Request failed without a response");
            metrics::record_error(ErrorCategory::Network.kind());
            ApiError::Network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        debug!(status, bytes = body.len(), "Response received");

        intercept(status, &body)
    }
}

#[async_trait]
impl PollApi for HttpPollApi {
    async fn get_poll(&self, poll_id: &str) -> Result<PollSnapshot, ApiError> {
        let url = self.endpoint(&["polls", poll_id]);
        self.send(self.client.get(url)).await
    }

    async fn create_poll(&self, request: &CreatePollRequest) -> Result<CreatePollResponse, ApiError> {
        let url = self.endpoint(&["polls"]);
        self.send(self.client.post(url).json(request)).await
    }

    async fn vote(&self, poll_id: &str, request: &VoteRequest) -> Result<VoteResponse, ApiError> {
        let url = self.endpoint(&["polls", poll_id, "vote"]);
        self.send(self.client.post(url).json(request)).await
    }
}
