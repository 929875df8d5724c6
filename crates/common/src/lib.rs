//! Shared types for the Pipeway gateway.
//!
//! Identifiers that cross crate boundaries live here so the configuration
//! layer, the resolver and the binding generator all agree on how a pipe
//! alias, a handler reference and a route host are spelled.

pub mod ids;

pub use ids::{HandlerId, HostName, IdentifierError, PipeAlias};
