//! Server, listen, action and client KDL parsing.

use anyhow::Result;
use tracing::trace;

use crate::client::*;
use crate::server::*;

use super::helpers::{
    ensure_known_children, get_bool_entry, get_string_entry, get_uint_entry, single_child,
};

/// Parse server configuration block
pub fn parse_server_config(node: &kdl::KdlNode) -> Result<ServerConfig> {
    trace!("Parsing server configuration block");
    ensure_known_children(
        node,
        &["graceful-shutdown-timeout-secs", "listen", "action"],
        "server block",
    )?;

    let listen = match single_child(node, "listen", "server block")? {
        Some(listen) => parse_listen(listen)?,
        None => ListenConfig::default(),
    };

    let action = match single_child(node, "action", "server block")? {
        Some(action) => parse_action(action)?,
        None => ActionConfig::default(),
    };

    let config = ServerConfig {
        graceful_shutdown_timeout_secs: get_uint_entry(node, "graceful-shutdown-timeout-secs")?
            .unwrap_or_else(default_graceful_shutdown_timeout),
        listen,
        action,
    };

    trace!(
        address = %config.listen.address,
        port = config.listen.port,
        not_found = %config.action.not_found,
        panic = %config.action.panic,
        graceful_shutdown_timeout_secs = config.graceful_shutdown_timeout_secs,
        "Parsed server configuration"
    );

    Ok(config)
}

fn parse_listen(node: &kdl::KdlNode) -> Result<ListenConfig> {
    ensure_known_children(node, &["address", "port"], "listen block")?;
    Ok(ListenConfig {
        address: get_string_entry(node, "address").unwrap_or_else(default_listen_address),
        port: get_uint_entry(node, "port")?.unwrap_or_else(default_listen_port),
    })
}

fn parse_action(node: &kdl::KdlNode) -> Result<ActionConfig> {
    ensure_known_children(node, &["not-found", "panic"], "action block")?;
    Ok(ActionConfig {
        not_found: get_string_entry(node, "not-found").unwrap_or_default(),
        panic: get_string_entry(node, "panic").unwrap_or_default(),
    })
}

/// Parse client configuration block
pub fn parse_client_config(node: &kdl::KdlNode) -> Result<ClientConfig> {
    trace!("Parsing client configuration block");
    ensure_known_children(
        node,
        &[
            "pool-idle-timeout-secs",
            "pool-max-idle-per-host",
            "connect-timeout-secs",
            "nodelay",
            "keep-alive",
        ],
        "client block",
    )?;

    let defaults = ClientConfig::default();
    let config = ClientConfig {
        pool_idle_timeout_secs: get_uint_entry(node, "pool-idle-timeout-secs")?
            .unwrap_or(defaults.pool_idle_timeout_secs),
        pool_max_idle_per_host: get_uint_entry(node, "pool-max-idle-per-host")?
            .unwrap_or(defaults.pool_max_idle_per_host),
        connect_timeout_secs: get_uint_entry(node, "connect-timeout-secs")?,
        nodelay: get_bool_entry(node, "nodelay").unwrap_or(defaults.nodelay),
        keep_alive: get_bool_entry(node, "keep-alive").unwrap_or(defaults.keep_alive),
    };

    trace!(
        pool_idle_timeout_secs = config.pool_idle_timeout_secs,
        pool_max_idle_per_host = config.pool_max_idle_per_host,
        keep_alive = config.keep_alive,
        "Parsed client configuration"
    );

    Ok(config)
}
