//! Gateway facade: resolution, routing and the listener behind one handle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pipeway_config::Config;

use crate::errors::{GatewayError, GatewayResult, ServerError};
use crate::registry::{deadline_in, PipeRegistry};
use crate::resolver::PipeResolver;
use crate::server::GatewayServer;

/// A configured gateway.
pub struct Gateway {
    registry: Arc<PipeRegistry>,
    server: GatewayServer,
}

impl Gateway {
    /// Wire `config` to the pipes in `registry`.
    ///
    /// Fails when a declared pipe is missing from the registry or a host has
    /// an unusable origin.
    pub fn new(config: &Config, registry: PipeRegistry) -> GatewayResult<Self> {
        registry.ensure_complete()?;
        let registry = Arc::new(registry);
        let resolver = Arc::new(PipeResolver::new(Arc::clone(&registry)));
        let server = GatewayServer::from_config(config, resolver)?;
        Ok(Self { registry, server })
    }

    /// Replace the callback receiving listener failures after start.
    pub fn with_async_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ServerError) + Send + Sync + 'static,
    {
        self.server = self.server.with_async_error_handler(handler);
        self
    }

    /// Resolve every handler, build the routing table and start listening.
    pub async fn start(&self) -> GatewayResult<SocketAddr> {
        let addr = self.server.start().await?;
        info!(
            address = %addr,
            pipes = self.registry.len(),
            "Gateway started"
        );
        Ok(addr)
    }

    /// Stop the listener, then close every pipe.
    ///
    /// Both steps always run within `deadline`; the first failure is
    /// returned. A gateway that is not running is left alone, so pipes are
    /// closed at most once per start.
    pub async fn stop(&self, deadline: Duration) -> GatewayResult<()> {
        let pipes_deadline = deadline_in(deadline);

        let server = self.server.stop(deadline).await;
        match &server {
            Err(ServerError::NotRunning) => return Err(ServerError::NotRunning.into()),
            Err(err) => warn!(error = %err, "Listener did not stop cleanly"),
            Ok(()) => {}
        }

        let pipes = self.registry.close(pipes_deadline).await;
        if let Err(err) = &pipes {
            warn!(error = %err, "Pipes did not close cleanly");
        }

        server.map_err(GatewayError::from)?;
        pipes.map_err(GatewayError::from)?;
        info!("Gateway stopped");
        Ok(())
    }

    pub fn registry(&self) -> &Arc<PipeRegistry> {
        &self.registry
    }

    pub fn server(&self) -> &GatewayServer {
        &self.server
    }
}
