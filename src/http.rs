//! Thin HTTP client wrapper around `reqwest`.
//!
//! The client issues single GET requests and reports the outcome as-is;
//! retry policy belongs to the downloader, and status interpretation (a 304
//! is a cache hit, not an error) belongs to the sources.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BinaryError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("drover/", env!("CARGO_PKG_VERSION"));

/// Issues GET requests with custom headers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

/// A fully buffered response: status, headers, and body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    /// Whether the response carried a usable body. A conditional-GET hit
    /// (304) comes back empty and reads as "no payload".
    pub fn has_payload(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Buffered GET used by the catalog sources. All statuses are returned
    /// to the caller; only transport failures are errors.
    pub async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|source| BinaryError::Network {
            url: url.to_string(),
            source,
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|source| BinaryError::Network {
            url: url.to_string(),
            source,
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Streaming GET used by the downloader. Non-success statuses are
    /// reported as network failures so the downloader treats them as
    /// retriable attempts.
    pub async fn get_streaming(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| BinaryError::Network {
                url: url.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::from([(
                "last-modified".to_string(),
                "Wed, 01 Jun 2022 10:00:00 GMT".to_string(),
            )]),
            body: body.to_string(),
        }
    }

    #[test]
    fn payload_detection() {
        assert!(response(200, "{\"tag_name\": \"v1\"}").has_payload());
        assert!(!response(304, "").has_payload());
        assert!(!response(200, "  \n").has_payload());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = response(200, "");
        assert_eq!(
            response.header("Last-Modified"),
            Some("Wed, 01 Jun 2022 10:00:00 GMT")
        );
        assert_eq!(response.header("LAST-MODIFIED"), response.header("last-modified"));
        assert_eq!(response.header("etag"), None);
    }
}
