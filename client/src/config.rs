//! Rate client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Configuration for [`RateSourceClient`](crate::RateSourceClient).
#[derive(Debug, Clone)]
pub struct RateClientConfig {
    /// Base URL of the rate aggregation API.
    pub api_url: String,
    /// Base URL of the push channel. Derived from `api_url` when unset.
    pub push_url: Option<String>,
    /// Socket.IO namespace carrying rate events.
    pub namespace: String,
    /// HTTP request timeout, also used for the push handshake.
    pub request_timeout: Duration,
    /// Reconnect attempts before the channel degrades to polling.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Poll interval in degraded mode.
    pub degraded_poll_interval: Duration,
}

impl Default for RateClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            push_url: None,
            namespace: "/exchange-rates".to_string(),
            request_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            degraded_poll_interval: Duration::from_secs(30),
        }
    }
}

impl RateClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RATES_API_URL") {
            config.api_url = url;
        }

        if let Ok(url) = std::env::var("RATES_PUSH_URL") {
            config.push_url = Some(url);
        }

        if let Ok(ms) = std::env::var("RATES_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(attempts) = std::env::var("RATES_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.max_reconnect_attempts = attempts;
            }
        }

        if let Ok(ms) = std::env::var("RATES_RECONNECT_DELAY_MS") {
            if let Ok(ms) = ms.parse() {
                config.reconnect_delay = Duration::from_millis(ms);
            }
        }

        if let Ok(ms) = std::env::var("RATES_DEGRADED_POLL_MS") {
            if let Ok(ms) = ms.parse() {
                config.degraded_poll_interval = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_url.is_empty() {
            return Err("API URL cannot be empty".to_string());
        }

        let api = Url::parse(&self.api_url).map_err(|e| format!("Invalid API URL: {e}"))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(format!("API URL must be http or https, got {}", api.scheme()));
        }

        if let Some(push) = &self.push_url {
            let push = Url::parse(push).map_err(|e| format!("Invalid push URL: {e}"))?;
            if !matches!(push.scheme(), "http" | "https" | "ws" | "wss") {
                return Err(format!("Unsupported push URL scheme {}", push.scheme()));
            }
        }

        if !self.namespace.starts_with('/') {
            return Err("Namespace must start with '/'".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be zero".to_string());
        }

        if self.degraded_poll_interval.is_zero() {
            return Err("Degraded poll interval cannot be zero".to_string());
        }

        Ok(())
    }

    /// Engine.IO WebSocket endpoint for the push channel.
    pub fn socket_url(&self) -> ClientResult<Url> {
        let base = self.push_url.as_deref().unwrap_or(&self.api_url);
        let mut url = Url::parse(base).map_err(|e| ClientError::Config(e.to_string()))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Config(format!(
                    "unsupported push scheme {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Config(format!("cannot use scheme {scheme}")))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("{base} cannot be a base URL")))?
            .pop_if_empty()
            .push("socket.io")
            .push("");
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");

        Ok(url)
    }
}
