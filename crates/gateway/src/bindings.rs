// Code generated by pipeway; DO NOT EDIT.

//! Pipes compiled into this binary.

use crate::errors::RegistryError;
use crate::registry::PipeRegistry;

/// Aliases of the compiled-in pipes, in registration order.
pub const PIPES: &[&str] = &["echo"];

/// Construct every compiled-in pipe the configuration declares.
pub fn register(registry: &mut PipeRegistry) -> Result<(), RegistryError> {
    registry.register("echo", echo::new)?;
    Ok(())
}
