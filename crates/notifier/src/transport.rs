//! HTTP boundary between the gateway client and the network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use pushgate_common::GatewayError;
use pushgate_common::config::GatewayConfig;

/// One outbound POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl GatewayRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as JSON. Handy for asserting on recorded requests.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

/// Raw HTTP answer from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
}

impl GatewayResponse {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    pub fn ok_json(body: serde_json::Value) -> Self {
        Self::new(200, "OK", body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs a single POST. Any failure before a status line arrives is a
/// [`GatewayError::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError>;
}

/// `reqwest`-backed transport sharing one connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client honoring the configured proxy and connection cap.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| GatewayError::validation(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        // Caps idle keep-alive connections; reqwest has no limit on open sockets.
        if let Some(max) = config.max_connections {
            builder = builder.pool_max_idle_per_host(max);
        }

        let client = builder
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let mut builder = self
            .client
            .post(&request.uri)
            .timeout(request.timeout)
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let status_text = reason_phrase(&response, status);
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {e}")))?;

        Ok(GatewayResponse {
            status: status.as_u16(),
            status_text,
            body: body.to_vec(),
        })
    }
}

/// The reason phrase the server sent, or the canonical one for `status`.
///
/// hyper only records the phrase when it differs from the canonical text.
fn reason_phrase(response: &reqwest::Response, status: reqwest::StatusCode) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => status.canonical_reason().unwrap_or_default().to_string(),
    }
}

/// Replays scripted responses in order and records every request.
///
/// Once the script runs dry every further call fails with a transport error.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<GatewayResponse, GatewayError>>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: GatewayResponse) -> &Self {
        self.push(Ok(response))
    }

    pub fn push_error(&self, error: GatewayError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, item: Result<GatewayResponse, GatewayError>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
        self
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        tracing::debug!(uri = %request.uri, "[MOCK] gateway request");

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Err(GatewayError::Transport("mock script exhausted".to_string())))
    }
}
