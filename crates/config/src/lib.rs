//! Configuration module for Pipeway.
//!
//! This module provides configuration parsing, validation, and the model the
//! gateway is built from: server settings, the upstream client, the declared
//! pipes and the routed hosts.
//!
//! # Module Organization
//!
//! - [`server`]: Listener address, shutdown deadline and default actions
//! - [`client`]: Upstream client pass-through settings
//! - [`pipes`]: Pipe declarations
//! - [`hosts`]: Host routing rules
//! - [`kdl`]: KDL parsing
//! - [`validate`]: Cross-reference validation and linting

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub mod client;
pub mod hosts;
pub mod kdl;
pub mod pipes;
pub mod server;
pub mod validate;

pub use client::ClientConfig;
pub use hosts::HostConfig;
pub use pipes::PipeDeclaration;
pub use server::{ActionConfig, ListenConfig, ServerConfig};
pub use validate::{
    normalize_origin, ErrorCategory, ValidationError, ValidationResult, ValidationWarning,
};

/// Main configuration structure for Pipeway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default, rename = "pipe")]
    pub pipes: Vec<PipeDeclaration>,

    #[serde(default, rename = "host")]
    pub hosts: Vec<HostConfig>,
}

impl Config {
    /// Load configuration from a file, choosing the format by extension.
    ///
    /// `.toml` files are parsed as TOML, everything else as KDL.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_kdl(&content),
        }
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!(
            path = %path.display(),
            pipes = config.pipes.len(),
            hosts = config.hosts.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse a KDL document.
    pub fn from_kdl(content: &str) -> Result<Self> {
        crate::kdl::parse_kdl_document(content)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| anyhow!("TOML parse error: {}", e))?;
        debug!(
            pipes = config.pipes.len(),
            hosts = config.hosts.len(),
            "Parsed TOML configuration"
        );
        Ok(config)
    }

    /// Run every validation pass and collect the findings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = validate::references::validate_references(self);
        result.merge(validate::lint::lint_config(self));
        result
    }

    /// Declaration with the given effective alias.
    pub fn pipe(&self, alias: &str) -> Option<&PipeDeclaration> {
        self.pipes.iter().find(|pipe| pipe.alias().as_str() == alias)
    }

    /// Minimal configuration for tests.
    pub fn default_for_testing() -> Self {
        let mut config = Self::default();
        config.server.listen.address = "127.0.0.1".to_string();
        config.server.listen.port = 0;
        config
    }
}
