//! Wire transport abstraction for registry API calls.
//!
//! Implementations take a prepared [`ApiRequest`] and return the raw
//! [`ApiResponse`]; all header derivation, pacing and auth-retry policy
//! lives above this seam in the fetch layer, which keeps the wire trivially
//! stubbable in tests.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::proxy::ProxyConfig;
use crate::{RequestError, Result};

/// A prepared outbound API request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Absolute request URL.
    pub url: String,
    /// Headers to send, already derived from the current session.
    pub headers: Vec<(String, String)>,
    /// JSON body; `None` issues a GET, `Some` a POST.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a GET request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a POST request with a JSON body.
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A raw response from the registry.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
    /// Parsed Retry-After header, when present.
    pub retry_after_secs: Option<u64>,
}

impl ApiResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the body as JSON, classifying failures as parse errors.
    pub fn json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| RequestError::parse(url, e.to_string()))
    }
}

/// Trait for executing prepared requests against the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes the request and returns the raw response.
    ///
    /// Non-2xx statuses are returned as responses, not errors; the fetch
    /// layer owns status classification. Errors here are transport-level
    /// failures only.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Builds a [`Transport`] bound to a network identity.
///
/// A client rebuilds its transport whenever it rotates to a fresh proxy; the
/// factory is the seam tests use to substitute a scripted wire.
pub trait TransportFactory: Send + Sync {
    /// Builds a transport routed through the given proxy, or direct.
    fn build(&self, proxy: Option<&ProxyConfig>) -> Result<std::sync::Arc<dyn Transport>>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport, optionally routed through a proxy.
    pub fn new(proxy: Option<&ProxyConfig>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder().user_agent(user_agent).timeout(timeout);

        if let Some(config) = proxy {
            debug!("Routing through proxy {}:{}", config.host, config.port);
            let reqwest_proxy = reqwest::Proxy::all(config.url())
                .map_err(|e| RequestError::new(crate::ErrorKind::Network, "", e.to_string()))?;
            builder = builder.proxy(reqwest_proxy);
        }

        let client = builder
            .build()
            .map_err(|e| RequestError::new(crate::ErrorKind::Network, "", e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a transport from a preconfigured reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut builder = match &request.body {
            Some(body) => self.client.post(&request.url).json(body),
            None => self.client.get(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            body,
            retry_after_secs,
        })
    }
}

/// Factory producing [`HttpTransport`] instances.
pub struct HttpTransportFactory {
    user_agent: String,
    timeout: Duration,
}

impl HttpTransportFactory {
    /// Creates a factory with the given client settings.
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn build(&self, proxy: Option<&ProxyConfig>) -> Result<std::sync::Arc<dyn Transport>> {
        Ok(std::sync::Arc::new(HttpTransport::new(
            proxy,
            &self.user_agent,
            self.timeout,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_request_get() {
        let request = ApiRequest::get("https://registry.example/api");
        assert_eq!(request.url, "https://registry.example/api");
        assert!(request.body.is_none());
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_api_request_post() {
        let request =
            ApiRequest::post("https://registry.example/api", serde_json::json!({"q": "x"}));
        assert!(request.body.is_some());
    }

    #[test]
    fn test_api_request_with_header() {
        let request = ApiRequest::get("https://registry.example/api")
            .with_header("Authorization", "Bearer abc")
            .with_header("Cookie", "SESSION=1");
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers[0].0, "Authorization");
    }

    #[test]
    fn test_api_response_success_range() {
        let ok = ApiResponse {
            status: 204,
            body: String::new(),
            retry_after_secs: None,
        };
        assert!(ok.is_success());

        let not_ok = ApiResponse {
            status: 301,
            body: String::new(),
            retry_after_secs: None,
        };
        assert!(!not_ok.is_success());
    }

    #[test]
    fn test_api_response_json() {
        let response = ApiResponse {
            status: 200,
            body: r#"{"value": 42}"#.to_string(),
            retry_after_secs: None,
        };
        let parsed: serde_json::Value = response.json("https://registry.example").unwrap();
        assert_eq!(parsed["value"], 42);
    }

    #[test]
    fn test_api_response_json_parse_error() {
        let response = ApiResponse {
            status: 200,
            body: "<html>maintenance</html>".to_string(),
            retry_after_secs: None,
        };
        let err = response
            .json::<serde_json::Value>("https://registry.example")
            .unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Parse);
        assert_eq!(err.url, "https://registry.example");
    }

    #[test]
    fn test_http_transport_builds_without_proxy() {
        let transport = HttpTransport::new(None, "test-agent", Duration::from_secs(10));
        assert!(transport.is_ok());
    }

    #[test]
    fn test_http_transport_builds_with_proxy() {
        let proxy = ProxyConfig::new("127.0.0.1", 8080);
        let transport = HttpTransport::new(Some(&proxy), "test-agent", Duration::from_secs(10));
        assert!(transport.is_ok());
    }

    #[test]
    fn test_http_transport_factory() {
        let factory = HttpTransportFactory::new("test-agent", Duration::from_secs(10));
        assert!(factory.build(None).is_ok());
        let proxy = ProxyConfig::new("127.0.0.1", 1080)
            .with_protocol(crate::proxy::ProxyProtocol::Socks5);
        assert!(factory.build(Some(&proxy)).is_ok());
    }

    #[test]
    fn test_http_transport_with_client() {
        let client = Client::builder().user_agent("custom").build().unwrap();
        let _transport = HttpTransport::with_client(client);
    }
}
