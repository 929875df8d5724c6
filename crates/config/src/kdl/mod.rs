//! KDL configuration parsing.

mod helpers;
mod routes;
mod server;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, trace};

use crate::Config;

pub use helpers::kdl_value_to_json;
pub use routes::{parse_host, parse_pipe};
pub use server::{parse_client_config, parse_server_config};

const TOP_LEVEL_KEYS: &[&str] = &["server", "client", "pipe", "host"];

/// Parse a KDL document into a [`Config`].
pub fn parse_kdl_document(content: &str) -> Result<Config> {
    let doc: kdl::KdlDocument = content
        .parse()
        .map_err(|e| anyhow!("KDL parse error: {}", e))?;

    let mut config = Config::default();
    let mut seen_server = false;
    let mut seen_client = false;

    for node in doc.nodes() {
        let name = node.name().value();
        trace!(node = %name, "Parsing top-level node");
        match name {
            "server" => {
                if seen_server {
                    return Err(anyhow!(
                        "More than one 'server' block found, only one is allowed"
                    ));
                }
                seen_server = true;
                config.server = parse_server_config(node).context("Invalid 'server' block")?;
            }
            "client" => {
                if seen_client {
                    return Err(anyhow!(
                        "More than one 'client' block found, only one is allowed"
                    ));
                }
                seen_client = true;
                config.client = parse_client_config(node).context("Invalid 'client' block")?;
            }
            "pipe" => config.pipes.push(parse_pipe(node)?),
            "host" => config.hosts.push(parse_host(node)?),
            other => {
                return Err(anyhow!(
                    "Unknown top-level block '{}'. Valid blocks: {}",
                    other,
                    TOP_LEVEL_KEYS.join(", ")
                ));
            }
        }
    }

    debug!(
        pipes = config.pipes.len(),
        hosts = config.hosts.len(),
        "Parsed KDL configuration"
    );

    Ok(config)
}
