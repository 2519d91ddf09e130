//! Transport and session configuration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::middleware::RetryPolicy;
use crate::opt::{self, Opt};

/// Connection-level settings of a [`HyperTransport`](crate::HyperTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host, unless a call sets `max_connections`.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    connect_timeout: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
}

impl TransportConfigBuilder {
    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> TransportConfig {
        let defaults = TransportConfig::default();
        TransportConfig {
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
        }
    }
}

/// Declarative session settings, e.g. read from a JSON or TOML file.
///
/// # Example
///
/// ```ignore
/// let config: SessionConfig = serde_json::from_str(r#"{
///     "base_url": "https://api.example.com",
///     "timeout_ms": 2500,
///     "headers": { "accept": "application/json" }
/// }"#)?;
/// let session = Session::builder().options(config.into_options()).build()?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Base URL every call starts from.
    pub base_url: Option<String>,
    /// Whole-call deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Default headers.
    pub headers: BTreeMap<String, String>,
    /// `http://` proxy URL.
    pub proxy: Option<String>,
    /// Disable certificate verification.
    pub insecure_skip_verify: bool,
    /// Idle connections kept per host.
    pub max_connections: Option<usize>,
    /// Maximum attempts per call, retrying transient failures.
    pub retry_attempts: Option<u32>,
}

impl SessionConfig {
    /// The equivalent options, in a fixed order.
    #[must_use]
    pub fn into_options(self) -> Vec<Opt> {
        let mut options = Vec::new();
        if let Some(url) = self.base_url {
            options.push(opt::url(url));
        }
        if let Some(ms) = self.timeout_ms {
            options.push(opt::timeout(Duration::from_millis(ms)));
        }
        if !self.headers.is_empty() {
            options.push(opt::headers(self.headers));
        }
        if let Some(proxy) = self.proxy {
            options.push(opt::proxy(proxy));
        }
        if self.insecure_skip_verify {
            options.push(opt::insecure_skip_verify(true));
        }
        if let Some(max) = self.max_connections {
            options.push(opt::max_connections(max));
        }
        if let Some(attempts) = self.retry_attempts {
            options.push(opt::retry(RetryPolicy::new(attempts)));
        }
        options
    }
}
