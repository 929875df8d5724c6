//! Configuration linting
//!
//! Checks the routing table for mistakes that do not stop the gateway.

use std::collections::HashSet;

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// Lint configuration for likely mistakes
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    // Duplicate hosts: the last declaration wins
    let mut seen = HashSet::new();
    for host in &config.hosts {
        let name = host.host();
        if !seen.insert(name.clone()) {
            result.add_warning(ValidationWarning::new(format!(
                "Host '{}' is declared more than once, the last declaration wins",
                name
            )));
        }
    }

    for host in &config.hosts {
        if host.handler.is_empty() {
            result.add_warning(ValidationWarning::new(format!(
                "Host '{}' has no handler, requests are forwarded unchanged",
                host.endpoint
            )));
        }
    }

    // Pipes nothing refers to
    let referenced: HashSet<&str> = config
        .hosts
        .iter()
        .map(|host| host.handler.as_str())
        .chain([
            config.server.action.not_found.as_str(),
            config.server.action.panic.as_str(),
        ])
        .filter_map(|raw| raw.split_once('.').map(|(alias, _)| alias))
        .collect();
    for pipe in &config.pipes {
        let alias = pipe.alias();
        if !referenced.contains(alias.as_str()) {
            result.add_warning(ValidationWarning::new(format!(
                "Pipe '{}' is declared but no host or action refers to it",
                alias
            )));
        }
    }

    if config.server.action.panic.is_empty() && !config.hosts.is_empty() {
        result.add_warning(ValidationWarning::new(
            "No panic action configured, a panicking pipe will drop the connection",
        ));
    }

    if config.server.graceful_shutdown_timeout_secs == 0 {
        result.add_warning(ValidationWarning::new(
            "Graceful shutdown timeout is 0, in-flight requests are aborted on stop",
        ));
    }

    result
}
