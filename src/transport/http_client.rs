//! A thin reqwest wrapper that normalizes responses to bytes/headers so the
//! ACME transport layer can inspect status codes and the Retry-After /
//! replay-nonce headers uniformly.

use crate::error::Result;
use std::time::Duration;

/// Raw HTTP response: status, headers, and body bytes.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: std::collections::HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| crate::error::DriverError::corrupt(format!("invalid UTF-8 body: {}", e)))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| crate::error::DriverError::corrupt(format!("JSON parse error: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// The `Retry-After` header, parsed as seconds (the only form the ACME
    /// CAs this driver targets are known to send).
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get("retry-after")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn replay_nonce(&self) -> Option<&str> {
        self.headers.get("replay-nonce").map(|s| s.as_str())
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub pool_size: usize,
    pub user_agent: String,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_size: 10,
            user_agent: concat!("acmed/", env!("CARGO_PKG_VERSION")).to_string(),
            follow_redirects: true,
        }
    }
}

/// A `reqwest::Client` wrapper with ACME-friendly defaults.
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::default()
            } else {
                reqwest::redirect::Policy::limited(0)
            })
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| crate::error::DriverError::fatal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn default() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.execute_request(self.client.get(url)).await
    }

    /// POST with the ACME content type (`application/jose+json`), sending a
    /// pre-serialized flattened JWS body.
    pub async fn post_jose(&self, url: &str, jws_body: &serde_json::Value) -> Result<HttpResponse> {
        let request = self
            .client
            .post(url)
            .header("content-type", "application/jose+json")
            .json(jws_body);
        self.execute_request(request).await
    }

    pub async fn head(&self, url: &str) -> Result<HttpResponse> {
        self.execute_request(self.client.head(url)).await
    }

    async fn execute_request(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| crate::error::DriverError::transient(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_lowercase(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| crate::error::DriverError::transient(format!("failed to read body: {}", e)))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_response_status() {
        let response = HttpResponse {
            status: 200,
            headers: Default::default(),
            body: vec![],
        };

        assert!(response.is_success());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());
    }

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HttpClient::default();
        assert!(client.is_ok());
    }
}
