//! Server-side configuration: listener address, shutdown deadline and the
//! default actions shared by every host.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server configuration block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ServerConfig {
    /// Seconds to wait for in-flight requests on shutdown.
    pub graceful_shutdown_timeout_secs: u64,

    pub listen: ListenConfig,

    pub action: ActionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            graceful_shutdown_timeout_secs: default_graceful_shutdown_timeout(),
            listen: ListenConfig::default(),
            action: ActionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }
}

/// Address the gateway listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ListenConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            port: default_listen_port(),
        }
    }
}

impl ListenConfig {
    /// `address:port`, bracketing IPv6 literals.
    pub fn socket_address(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Default actions, each an `alias.Method` reference or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ActionConfig {
    /// Handler serving requests for unknown hosts.
    pub not_found: String,

    /// Middleware wrapping every chain to recover from panics.
    pub panic: String,
}

pub(crate) fn default_graceful_shutdown_timeout() -> u64 {
    30
}

pub(crate) fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_listen_port() -> u16 {
    8080
}
