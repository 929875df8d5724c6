//! Pipe and host KDL parsing.

use anyhow::{anyhow, Result};
use tracing::trace;

use crate::hosts::HostConfig;
use crate::pipes::PipeDeclaration;

use super::helpers::{
    ensure_known_children, get_first_arg_string, get_string_entry, node_children_to_json,
    single_child,
};

/// Parse a `pipe "<import path>" { ... }` block
pub fn parse_pipe(node: &kdl::KdlNode) -> Result<PipeDeclaration> {
    let import_path = get_first_arg_string(node).ok_or_else(|| {
        anyhow!("Pipe requires an import path argument, e.g., pipe \"github.com/org/pipe\" {{ ... }}")
    })?;
    let context = format!("pipe '{}'", import_path);

    ensure_known_children(node, &["version", "module", "alias", "config"], &context)?;

    let config = match single_child(node, "config", &context)? {
        Some(config) => node_children_to_json(config),
        None => serde_json::Map::new(),
    };

    let pipe = PipeDeclaration {
        version: get_string_entry(node, "version").unwrap_or_default(),
        module: get_string_entry(node, "module"),
        alias: get_string_entry(node, "alias"),
        config,
        import_path,
    };

    trace!(
        import_path = %pipe.import_path,
        alias = %pipe.alias(),
        version = %pipe.version,
        config_keys = pipe.config.len(),
        "Parsed pipe"
    );

    Ok(pipe)
}

/// Parse a `host "<endpoint>" { ... }` block
pub fn parse_host(node: &kdl::KdlNode) -> Result<HostConfig> {
    let endpoint = get_first_arg_string(node).ok_or_else(|| {
        anyhow!("Host requires an endpoint argument, e.g., host \"example.com\" {{ ... }}")
    })?;
    let context = format!("host '{}'", endpoint);

    ensure_known_children(node, &["handler", "origin"], &context)?;

    let host = HostConfig {
        handler: get_string_entry(node, "handler").unwrap_or_default(),
        origin: get_string_entry(node, "origin"),
        endpoint,
    };

    trace!(
        endpoint = %host.endpoint,
        handler = %host.handler,
        origin = ?host.origin,
        "Parsed host"
    );

    Ok(host)
}
