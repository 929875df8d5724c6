//! Host routing rules.

use pipeway_common::HostName;
use serde::{Deserialize, Serialize};

/// One routed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HostConfig {
    /// Host the route is mounted on; may carry a port, a leading `*.` label
    /// or be the catch-all `*`.
    pub endpoint: String,

    /// `alias.Method` middleware applied before forwarding, or empty.
    #[serde(default)]
    pub handler: String,

    /// Fixed upstream origin (`http://host:port`). When unset the request is
    /// forwarded to the host it names.
    #[serde(default)]
    pub origin: Option<String>,
}

impl HostConfig {
    pub fn new(endpoint: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            handler: handler.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn host(&self) -> HostName {
        HostName::new(&self.endpoint)
    }
}
