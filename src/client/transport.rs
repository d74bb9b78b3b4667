//! Network transport seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorCode, FetchError};

/// A request as handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// A raw response. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one network round-trip. Must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, FetchError>;
}

// == Reqwest Transport ==
/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Option<String>,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolves relative request URLs (`/api/...`) against `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if url.starts_with('/') => format!("{}{}", base, url),
            _ => url.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, FetchError> {
        let url = self.resolve(&request.url);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.client.request(request.method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError {
                    code: ErrorCode::Timeout,
                    message: e.to_string(),
                    url: request.url.clone(),
                    status: None,
                }
            } else {
                FetchError::network(&request.url, e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = fold_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(&request.url, e.to_string()))?
            .to_vec();

        debug!(
            url = %url,
            status,
            content_type = headers.get(CONTENT_TYPE.as_str()).map(String::as_str).unwrap_or(""),
            "Received response"
        );

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// Lowercased header map. Repeated fields are joined with `", "` so a
/// `no-store` on one line is not lost to a `max-age` on the next.
fn fold_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut folded: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        folded
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    folded
}
