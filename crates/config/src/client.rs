//! Upstream HTTP client settings, passed through to the forwarding client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClientConfig {
    /// Seconds an idle pooled connection is kept.
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle connections kept per upstream host.
    pub pool_max_idle_per_host: usize,

    /// Connect timeout in seconds; no timeout when unset.
    pub connect_timeout_secs: Option<u64>,

    /// Set `TCP_NODELAY` on upstream connections.
    pub nodelay: bool,

    /// Keep upstream connections alive between requests.
    pub keep_alive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            connect_timeout_secs: None,
            nodelay: true,
            keep_alive: true,
        }
    }
}

impl ClientConfig {
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Idle connections to keep per host, zero when keep-alive is off.
    pub fn effective_max_idle_per_host(&self) -> usize {
        if self.keep_alive {
            self.pool_max_idle_per_host
        } else {
            0
        }
    }
}

pub(crate) fn default_pool_idle_timeout() -> u64 {
    90
}

pub(crate) fn default_pool_max_idle_per_host() -> usize {
    32
}
