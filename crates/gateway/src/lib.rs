//! Pipeway gateway.
//!
//! Routes every request by host through a chain of pipes compiled into the
//! binary before reverse-proxying it:
//!
//! - [`registry`]: one instance per declared pipe
//! - [`resolver`]: `alias.Method` references to callables
//! - [`router`] and [`forward`]: per-host chains and the dispatcher
//! - [`server`]: listener start and graceful stop
//! - [`generate`]: build-time manifest and binding table generation
//! - [`bindings`]: the generated binding table

pub mod bindings;
pub mod errors;
pub mod forward;
pub mod gateway;
pub mod generate;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod server;

pub use errors::{
    GatewayError, GatewayResult, GenerateError, RegistryError, ResolveError, RouterError,
    ServerError,
};
pub use forward::{ClientAddr, Forwarder, RouteTarget};
pub use gateway::Gateway;
pub use registry::PipeRegistry;
pub use resolver::{Binding, PipeResolver};
pub use router::{DefaultActions, Dispatcher, HostRouter, RouteEntry};
pub use server::{AsyncErrorHandler, GatewayServer};
