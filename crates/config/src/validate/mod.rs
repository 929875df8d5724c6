//! Configuration validation.
//!
//! Validation runs after parsing and never touches pipe code: it checks that
//! every handler reference is well formed and names a declared pipe, and lints
//! the routing table for likely mistakes.

pub mod lint;
pub mod references;

pub use references::normalize_origin;

use std::fmt;

/// What a validation error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or dangling `alias.Method` reference.
    Handler,
    /// Pipe declaration problem.
    Pipe,
    /// Host or origin problem.
    Host,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Handler => write!(f, "handler"),
            ErrorCategory::Pipe => write!(f, "pipe"),
            ErrorCategory::Host => write!(f, "host"),
        }
    }
}

/// A finding that makes the configuration unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// A finding worth reporting that does not stop the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors and warnings collected by a validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// True when no errors were found. Warnings do not count.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
