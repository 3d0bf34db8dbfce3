//! Client for the marketplace backend's metadata preparation endpoints.
//!
//! Before an on-chain write the backend hosts the off-chain document the call
//! will reference and hands back its URI (and, for feedback, its content hash):
//!
//! - `POST api/agents/metadata` → `{ "agentURI" }`
//! - `POST api/feedback/metadata` → `{ "feedbackURI", "feedbackHash" }`
//!
//! Paid bookings go to `api/orders` through the payment client; this module
//! only resolves that URL.

use std::fmt::Display;
use std::time::Duration;

use alloy_primitives::{B256, U256};
use http::{HeaderMap, StatusCode};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};
use url::Url;

use crate::constants::{AGENT_METADATA_PATH, FEEDBACK_METADATA_PATH, ORDERS_PATH};

/// Errors talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The backend answered 2xx with an unusable document.
    #[error("Invalid response: {context}: {reason}")]
    InvalidResponse {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// Agent identity metadata submitted for hosting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Service categories offered.
    #[serde(default)]
    pub services: Vec<String>,
    /// Public endpoint of the agent, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Avatar image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// The hosted registration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedRegistration {
    /// URI passed to `register`.
    #[serde(rename = "agentURI", alias = "agentUri", alias = "uri")]
    pub agent_uri: String,
}

/// Feedback submitted for hosting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackMetadata {
    /// Agent being rated.
    pub agent_id: U256,
    /// Signed fixed-point score.
    pub value: i128,
    /// Decimal places in `value`.
    pub value_decimals: u8,
    /// First tag.
    #[serde(default)]
    pub tag1: String,
    /// Second tag.
    #[serde(default)]
    pub tag2: String,
    /// Endpoint the feedback is about.
    #[serde(default)]
    pub endpoint: String,
    /// Reviewer's comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The hosted feedback document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedFeedback {
    /// URI passed to `giveFeedback`.
    #[serde(rename = "feedbackURI", alias = "feedbackUri", alias = "uri")]
    pub feedback_uri: String,
    /// Content hash passed to `giveFeedback`.
    #[serde(rename = "feedbackHash", alias = "hash")]
    pub feedback_hash: B256,
}

/// A client for the backend's preparation endpoints.
#[derive(Clone, Debug)]
pub struct BackendClient {
    base_url: Url,
    agent_metadata_url: Url,
    feedback_metadata_url: Url,
    orders_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl BackendClient {
    /// Constructs a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UrlParse`] if an endpoint URL cannot be built.
    pub fn try_new(base_url: Url) -> Result<Self, BackendError> {
        let agent_metadata_url = join(
            &base_url,
            AGENT_METADATA_PATH,
            "Failed to construct agent metadata URL",
        )?;
        let feedback_metadata_url = join(
            &base_url,
            FEEDBACK_METADATA_PATH,
            "Failed to construct feedback metadata URL",
        )?;
        let orders_url = join(&base_url, ORDERS_PATH, "Failed to construct orders URL")?;
        Ok(Self {
            base_url,
            agent_metadata_url,
            feedback_metadata_url,
            orders_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Base URL of the backend.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL paid bookings are posted to.
    #[must_use]
    pub const fn orders_url(&self) -> &Url {
        &self.orders_url
    }

    /// Hosts registration metadata and returns its URI.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the request fails or the URI is empty.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "agora.backend.prepare_registration", skip_all, err)
    )]
    pub async fn prepare_registration(
        &self,
        metadata: &AgentMetadata,
    ) -> Result<PreparedRegistration, BackendError> {
        const CONTEXT: &str = "POST api/agents/metadata";
        let prepared: PreparedRegistration = self
            .post_json(&self.agent_metadata_url, CONTEXT, metadata)
            .await?;
        if prepared.agent_uri.trim().is_empty() {
            return Err(BackendError::InvalidResponse {
                context: CONTEXT,
                reason: "empty agentURI",
            });
        }
        Ok(prepared)
    }

    /// Hosts feedback and returns its URI and content hash.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the request fails or the URI is empty.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "agora.backend.prepare_feedback", skip_all, err, fields(agent_id = %feedback.agent_id))
    )]
    pub async fn prepare_feedback(
        &self,
        feedback: &FeedbackMetadata,
    ) -> Result<PreparedFeedback, BackendError> {
        const CONTEXT: &str = "POST api/feedback/metadata";
        let prepared: PreparedFeedback = self
            .post_json(&self.feedback_metadata_url, CONTEXT, feedback)
            .await?;
        if prepared.feedback_uri.trim().is_empty() {
            return Err(BackendError::InvalidResponse {
                context: CONTEXT,
                reason: "empty feedbackURI",
            });
        }
        Ok(prepared)
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, BackendError>
    where
        T: Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        send_json(req, context).await
    }
}

impl TryFrom<&str> for BackendClient {
    type Error = BackendError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_new(normalize_base_url(value)?)
    }
}

impl TryFrom<String> for BackendClient {
    type Error = BackendError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Parses `value` as a base URL ending in exactly one slash, so relative joins append.
pub(crate) fn normalize_base_url(value: &str) -> Result<Url, BackendError> {
    let mut normalized = value.trim_end_matches('/').to_string();
    normalized.push('/');
    Url::parse(&normalized).map_err(|e| BackendError::UrlParse {
        context: "Failed to parse base url",
        source: e,
    })
}

pub(crate) fn join(base: &Url, path: &str, context: &'static str) -> Result<Url, BackendError> {
    base.join(path)
        .map_err(|source| BackendError::UrlParse { context, source })
}

/// Sends `req` and decodes a 200 JSON body, mapping every failure to a [`BackendError`].
pub(crate) async fn send_json<R>(req: RequestBuilder, context: &'static str) -> Result<R, BackendError>
where
    R: serde::de::DeserializeOwned,
{
    let http_response = req
        .send()
        .await
        .map_err(|e| BackendError::Http { context, source: e })?;

    let result = if http_response.status().is_success() {
        http_response
            .json::<R>()
            .await
            .map_err(|e| BackendError::JsonDeserialization { context, source: e })
    } else {
        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| BackendError::ResponseBodyRead { context, source: e })?;
        Err(BackendError::HttpStatus {
            context,
            status,
            body,
        })
    };

    record_result_on_span(&result);

    result
}

#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to backend failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(test)]
mod tests {
    use alloy_primitives::b256;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let client = BackendClient::try_from("http://localhost:3001/v1//").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:3001/v1/");
        assert_eq!(
            client.orders_url().as_str(),
            "http://localhost:3001/v1/api/orders"
        );
        assert!(BackendClient::try_from("not a url").is_err());
    }

    #[tokio::test]
    async fn test_prepare_registration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/metadata"))
            .and(body_partial_json(json!({ "name": "Plumber Bot", "services": ["plumbing"] })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "agentURI": "ipfs://QmAgent" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::try_from(server.uri()).unwrap();
        let prepared = client
            .prepare_registration(&AgentMetadata {
                name: "Plumber Bot".into(),
                description: "Fixes leaks".into(),
                services: vec!["plumbing".into()],
                ..AgentMetadata::default()
            })
            .await
            .unwrap();
        assert_eq!(prepared.agent_uri, "ipfs://QmAgent");
    }

    #[tokio::test]
    async fn test_prepare_feedback_with_custom_headers() {
        let server = MockServer::start().await;
        let hash = b256!("0x9c22ff5f21f0b81b113e63f7db6da94fedef11b2119b4088b89664fb9a3cb658");
        Mock::given(method("POST"))
            .and(path("/api/feedback/metadata"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "feedbackURI": "ipfs://QmFeedback",
                "feedbackHash": hash,
            })))
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        let client = BackendClient::try_from(server.uri())
            .unwrap()
            .with_headers(headers);
        let prepared = client
            .prepare_feedback(&FeedbackMetadata {
                agent_id: U256::from(42u64),
                value: -500,
                value_decimals: 2,
                tag1: String::new(),
                tag2: String::new(),
                endpoint: "https://plumber.example/api".into(),
                comment: Some("late".into()),
            })
            .await
            .unwrap();
        assert_eq!(prepared.feedback_hash, hash);
    }

    #[tokio::test]
    async fn test_preparation_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/metadata"))
            .respond_with(ResponseTemplate::new(500).set_body_string("storage offline"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/feedback/metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "feedbackURI": "  ",
                "feedbackHash": B256::ZERO,
            })))
            .mount(&server)
            .await;

        let client = BackendClient::try_from(server.uri()).unwrap();
        let err = client
            .prepare_registration(&AgentMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::HttpStatus { status, ref body, .. }
                if status == StatusCode::INTERNAL_SERVER_ERROR && body == "storage offline"
        ));

        let err = client
            .prepare_feedback(&FeedbackMetadata {
                agent_id: U256::from(1u8),
                value: 1,
                value_decimals: 0,
                tag1: String::new(),
                tag2: String::new(),
                endpoint: String::new(),
                comment: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse { .. }));
    }
}
