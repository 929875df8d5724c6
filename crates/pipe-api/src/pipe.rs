//! The [`Pipe`] trait.

use async_trait::async_trait;
use std::time::Instant;

use crate::capability::Capabilities;
use crate::errors::PipeError;

/// Free-form configuration handed to a pipe constructor.
pub type PipeConfig = serde_json::Map<String, serde_json::Value>;

/// A unit of request processing compiled into the gateway.
///
/// Pipes are constructed once at startup and shared by every request, so
/// implementations must be safe to call concurrently.
#[async_trait]
pub trait Pipe: Send + Sync + 'static {
    /// The callables this pipe offers, keyed by method name.
    ///
    /// The gateway reads the table once, when the pipe is registered.
    fn capabilities(&self) -> Capabilities;

    /// Release resources held by the pipe. Implementations should give up
    /// and return [`PipeError::Timeout`] once `deadline` has passed.
    async fn close(&self, _deadline: Instant) -> Result<(), PipeError> {
        Ok(())
    }
}

/// Deserialize a typed configuration out of a [`PipeConfig`].
pub fn parse_config<T>(config: PipeConfig) -> Result<T, PipeError>
where
    T: serde::de::DeserializeOwned,
{
    Ok(serde_json::from_value(serde_json::Value::Object(config))?)
}
