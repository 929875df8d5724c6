//! Pipeway pipe contract.
//!
//! A *pipe* is a unit of request processing compiled into the gateway binary.
//! Each pipe crate exposes a constructor taking its [`PipeConfig`] and
//! returning a value implementing [`Pipe`]. At construction the pipe declares
//! its capabilities: an ordered table from method name to either a
//! [`Middleware`] (wraps the downstream handler) or a [`Handler`] (produces the
//! response itself). The gateway addresses them in configuration as
//! `alias.Method`.
//!
//! # Example
//!
//! ```ignore
//! use http::StatusCode;
//! use pipeway_pipe_api::{body, Capabilities, Handler, Middleware, Pipe, PipeConfig, PipeError};
//!
//! pub struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Pipe for Hello {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::new()
//!             .handler("Greet", Handler::new(|_req| async { body::text(StatusCode::OK, "hello") }))
//!             .middleware("Pass", Middleware::new(|next| next))
//!     }
//! }
//!
//! pub fn new(_config: PipeConfig) -> Result<Hello, PipeError> {
//!     Ok(Hello)
//! }
//! ```

pub mod body;
pub mod capability;
pub mod errors;
pub mod pipe;
pub mod recover;

pub use body::{Body, BoxError, Request, Response};
pub use capability::{Capabilities, Capability, CapabilityKind, Handler, Middleware};
pub use errors::PipeError;
pub use pipe::{Pipe, PipeConfig};
