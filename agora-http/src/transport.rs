//! A minimal HTTP capability the negotiation client is written against.
//!
//! [`HttpTransport`] sends one fully-buffered request and returns one
//! fully-buffered response. [`ReqwestTransport`] is the production
//! implementation; tests substitute scripted transports.

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::TransportError;

/// A buffered HTTP request.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    /// Request method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

impl ResourceRequest {
    /// A `GET` of `url`.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A `POST` of `body` as JSON to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `body` cannot be serialized.
    pub fn post_json<T: Serialize + ?Sized>(url: Url, body: &T) -> Result<Self, serde_json::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(Self {
            method: Method::POST,
            url,
            headers,
            body: Some(serde_json::to_vec(body)?),
        })
    }

    /// Adds or replaces a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl ResourceResponse {
    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the body is not `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and buffers the whole response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the request cannot be sent or the body read.
    async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse, TransportError> {
        (**self).send(request).await
    }
}

/// [`HttpTransport`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport over an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(ResourceResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_reqwest_transport_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "ping": true })))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-trace", "abc")
                    .set_body_json(json!({ "pong": true })),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/echo", server.uri())).unwrap();
        let request = ResourceRequest::post_json(url, &json!({ "ping": true })).unwrap();
        let response = ReqwestTransport::new().send(request).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers["x-trace"], "abc");
        assert_eq!(response.json::<Value>().unwrap()["pong"], true);
    }
}
