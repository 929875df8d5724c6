//! Gateway error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use pipeway_common::IdentifierError;
use pipeway_pipe_api::{CapabilityKind, PipeError};

/// Failures resolving an `alias.Method` reference to a pipe capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidIdentifierFormat(#[from] IdentifierError),

    #[error("Handler '{identifier}' refers to unknown pipe alias '{alias}'")]
    UnknownAlias { identifier: String, alias: String },

    #[error("Handler '{identifier}' does not resolve to a {expected} (found {found})")]
    UnresolvedOrWrongShape {
        identifier: String,
        expected: CapabilityKind,
        found: Found,
    },
}

/// What the capability table holds under a method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found {
    Missing,
    Kind(CapabilityKind),
}

impl std::fmt::Display for Found {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Found::Missing => f.write_str("no such method"),
            Found::Kind(kind) => write!(f, "a {}", kind),
        }
    }
}

/// Failures building the host routing table.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Failed to resolve {context}: {source}")]
    Resolve {
        context: String,
        #[source]
        source: ResolveError,
    },

    #[error("Host '{host}' has invalid origin '{origin}': {reason}")]
    InvalidOrigin {
        host: String,
        origin: String,
        reason: String,
    },
}

/// Plugin registry failures.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Pipe '{0}' is registered more than once")]
    Duplicate(String),

    #[error("Pipe '{0}' is not declared in the configuration")]
    NotDeclared(String),

    #[error("Failed to construct pipe '{alias}': {source}")]
    Construct {
        alias: String,
        #[source]
        source: PipeError,
    },

    #[error("Declared pipes are not compiled into this binary: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Failed to close pipes: {}", format_close_failures(.0))]
    Close(Vec<(String, PipeError)>),
}

fn format_close_failures(failures: &[(String, PipeError)]) -> String {
    failures
        .iter()
        .map(|(alias, err)| format!("{}: {}", alias, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Listener lifecycle failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Listener failed: {0}")]
    AsyncListen(#[source] io::Error),

    #[error("Graceful shutdown exceeded {deadline:?}, {remaining} connection(s) closed forcibly")]
    ShutdownTimeout { deadline: Duration, remaining: usize },

    #[error("Server is not running")]
    NotRunning,

    #[error("Server is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Binding generator failures.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(
        "Backup file {0} already exists; restore or remove it after checking the manifest by hand"
    )]
    StaleBackup(PathBuf),

    #[error("Failed to {step} {path}: {source}")]
    Io {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Pipe alias '{0}' is used by more than one pipe")]
    DuplicateAlias(String),

    #[error("Pipe alias '{alias}' {reason}")]
    InvalidAlias { alias: String, reason: &'static str },

    #[error("Failed to parse manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl GenerateError {
    pub(crate) fn io(step: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| GenerateError::Io { step, path, source }
    }
}

/// Top-level gateway failures.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Pipe registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
