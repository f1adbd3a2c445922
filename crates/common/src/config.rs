use serde::Deserialize;

/// Legacy HTTP send endpoint.
pub const DEFAULT_SEND_URI: &str = "https://fcm.googleapis.com:443/fcm/send";

/// Device-group management endpoint. Still lives under the `gcm` path.
pub const DEFAULT_NOTIFICATION_URI: &str = "https://android.googleapis.com/gcm/notification";

/// Per-request socket timeout (three minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 180_000;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_024_000;

/// Gateway client configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Server key sent as `Authorization: key=<api_key>`
    pub api_key: String,

    /// Sender project number, sent as the `project_id` header on group operations
    pub project_id: Option<String>,

    /// Endpoint for message sends
    pub send_uri: String,

    /// Endpoint for notification-key (device group) operations
    pub notification_uri: String,

    /// Socket timeout applied to each HTTP attempt, in milliseconds
    pub timeout_ms: u64,

    /// Optional proxy URL for all gateway traffic
    pub proxy: Option<String>,

    /// Optional cap on idle keep-alive connections kept per host.
    /// Concurrent in-flight requests are not limited by it.
    pub max_connections: Option<usize>,

    /// Default retry budget for sends and group operations (default: 5)
    pub max_retries: u32,

    /// First backoff step in milliseconds (default: 1000)
    pub backoff_initial_ms: u64,

    /// Upper bound for a single backoff wait in milliseconds (default: 1024000)
    pub backoff_max_ms: u64,
}

impl GatewayConfig {
    /// Build a configuration with defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: None,
            send_uri: DEFAULT_SEND_URI.to_string(),
            notification_uri: DEFAULT_NOTIFICATION_URI.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            proxy: None,
            max_connections: None,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Point both endpoints at a different host, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.send_uri = format!("{base}/fcm/send");
        self.notification_uri = format!("{base}/gcm/notification");
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: std::env::var("FCM_API_KEY")
                .map_err(|_| anyhow::anyhow!("FCM_API_KEY environment variable is required"))?,
            project_id: std::env::var("FCM_PROJECT_ID").ok(),
            send_uri: std::env::var("FCM_SEND_URI")
                .unwrap_or_else(|_| DEFAULT_SEND_URI.to_string()),
            notification_uri: std::env::var("FCM_NOTIFICATION_URI")
                .unwrap_or_else(|_| DEFAULT_NOTIFICATION_URI.to_string()),
            timeout_ms: std::env::var("FCM_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_TIMEOUT_MS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_TIMEOUT_MS must be a valid u64"))?,
            proxy: std::env::var("FCM_PROXY").ok(),
            max_connections: std::env::var("FCM_MAX_CONNECTIONS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("FCM_MAX_CONNECTIONS must be a valid usize"))?,
            max_retries: std::env::var("FCM_MAX_RETRIES")
                .unwrap_or_else(|_| DEFAULT_MAX_RETRIES.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_MAX_RETRIES must be a valid u32"))?,
            backoff_initial_ms: std::env::var("FCM_BACKOFF_INITIAL_MS")
                .unwrap_or_else(|_| DEFAULT_BACKOFF_INITIAL_MS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_BACKOFF_INITIAL_MS must be a valid u64"))?,
            backoff_max_ms: std::env::var("FCM_BACKOFF_MAX_MS")
                .unwrap_or_else(|_| DEFAULT_BACKOFF_MAX_MS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FCM_BACKOFF_MAX_MS must be a valid u64"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new("abc123");
        assert_eq!(config.api_key, "abc123");
        assert_eq!(config.send_uri, DEFAULT_SEND_URI);
        assert_eq!(config.notification_uri, DEFAULT_NOTIFICATION_URI);
        assert_eq!(config.timeout_ms, 180_000);
        assert_eq!(config.max_retries, 5);
        assert!(config.project_id.is_none());
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_with_base_url_rewrites_both_endpoints() {
        let config = GatewayConfig::new("k").with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.send_uri, "http://127.0.0.1:9000/fcm/send");
        assert_eq!(config.notification_uri, "http://127.0.0.1:9000/gcm/notification");
    }
}
