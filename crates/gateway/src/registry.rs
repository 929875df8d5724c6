//! Plugin registry.
//!
//! Holds one instance per declared pipe, keyed by alias. The generated
//! binding table fills the registry at startup; afterwards it is shared
//! read-only behind an `Arc`.
//!
//! A pipe's capability table is taken once, when the pipe is registered,
//! and every later lookup is served from that table.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use pipeway_config::PipeDeclaration;
use pipeway_pipe_api::{Capabilities, Pipe, PipeConfig, PipeError};

use crate::errors::RegistryError;

/// A constructed pipe and the capability table it declared.
pub(crate) struct Registered {
    pub(crate) pipe: Arc<dyn Pipe>,
    pub(crate) capabilities: Capabilities,
}

impl Registered {
    fn new(pipe: Arc<dyn Pipe>) -> Self {
        let capabilities = pipe.capabilities();
        Self { pipe, capabilities }
    }
}

/// Pipe instances keyed by alias.
pub struct PipeRegistry {
    /// Configuration of every declared pipe (alias -> config)
    declared: BTreeMap<String, PipeConfig>,
    /// Constructed pipes (alias -> instance)
    pipes: BTreeMap<String, Registered>,
}

impl PipeRegistry {
    /// Create an empty registry for the given declarations.
    pub fn new(declarations: &[PipeDeclaration]) -> Self {
        let declared = declarations
            .iter()
            .map(|pipe| (pipe.alias().as_str().to_string(), pipe.config.clone()))
            .collect();
        Self {
            declared,
            pipes: BTreeMap::new(),
        }
    }

    /// Construct the pipe compiled in under `alias`.
    ///
    /// Pipes compiled into the binary but absent from the configuration are
    /// skipped, so one build can serve several configurations.
    #[instrument(skip(self, constructor))]
    pub fn register<P, F>(&mut self, alias: &str, constructor: F) -> Result<(), RegistryError>
    where
        P: Pipe,
        F: FnOnce(PipeConfig) -> Result<P, PipeError>,
    {
        let Some(config) = self.declared.get(alias) else {
            debug!(alias, "Pipe compiled in but not declared, skipping");
            return Ok(());
        };

        if self.pipes.contains_key(alias) {
            return Err(RegistryError::Duplicate(alias.to_string()));
        }

        let pipe = constructor(config.clone()).map_err(|source| RegistryError::Construct {
            alias: alias.to_string(),
            source,
        })?;

        let registered = Registered::new(Arc::new(pipe));
        info!(alias, methods = registered.capabilities.len(), "Pipe registered");
        self.pipes.insert(alias.to_string(), registered);
        Ok(())
    }

    /// Insert an already constructed pipe.
    pub fn insert(&mut self, alias: &str, pipe: Arc<dyn Pipe>) -> Result<(), RegistryError> {
        if !self.declared.contains_key(alias) {
            return Err(RegistryError::NotDeclared(alias.to_string()));
        }
        if self.pipes.contains_key(alias) {
            return Err(RegistryError::Duplicate(alias.to_string()));
        }
        self.pipes.insert(alias.to_string(), Registered::new(pipe));
        Ok(())
    }

    /// Fail when a declared pipe has no compiled instance.
    pub fn ensure_complete(&self) -> Result<(), RegistryError> {
        let missing: Vec<String> = self
            .declared
            .keys()
            .filter(|alias| !self.pipes.contains_key(*alias))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Missing(missing))
        }
    }

    pub fn get(&self, alias: &str) -> Option<Arc<dyn Pipe>> {
        self.pipes.get(alias).map(|registered| Arc::clone(&registered.pipe))
    }

    /// The capability table `alias` declared when it was registered.
    pub fn capabilities(&self, alias: &str) -> Option<&Capabilities> {
        self.pipes.get(alias).map(|registered| &registered.capabilities)
    }

    pub(crate) fn registered(&self, alias: &str) -> Option<&Registered> {
        self.pipes.get(alias)
    }

    /// Aliases of the registered pipes, sorted.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.pipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Close every pipe concurrently, collecting all failures.
    ///
    /// A pipe still closing at `deadline` is reported as timed out.
    pub async fn close(&self, deadline: Instant) -> Result<(), RegistryError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        info!(
            pipes = self.pipes.len(),
            budget_ms = budget.as_millis() as u64,
            "Closing pipes"
        );

        let closing = self.pipes.iter().map(|(alias, registered)| async move {
            let result = tokio::time::timeout_at(
                tokio::time::Instant::from_std(deadline),
                registered.pipe.close(deadline),
            )
            .await
            .unwrap_or(Err(PipeError::Timeout(budget)));
            (alias.clone(), result)
        });

        let failures: Vec<(String, PipeError)> = join_all(closing)
            .await
            .into_iter()
            .filter_map(|(alias, result)| match result {
                Ok(()) => None,
                Err(err) => {
                    warn!(alias = %alias, error = %err, "Pipe failed to close");
                    Some((alias, err))
                }
            })
            .collect();

        if failures.is_empty() {
            debug!("All pipes closed");
            Ok(())
        } else {
            Err(RegistryError::Close(failures))
        }
    }
}

impl std::fmt::Debug for PipeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRegistry")
            .field("declared", &self.declared.keys().collect::<Vec<_>>())
            .field("registered", &self.pipes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Deadline `timeout` from now.
pub fn deadline_in(timeout: Duration) -> Instant {
    Instant::now() + timeout
}
