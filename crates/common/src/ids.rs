//! Type-safe identifier newtypes for Pipeway.
//!
//! These types keep the three kinds of names used by the gateway apart:
//! the alias a pipe is addressed by, the `alias.Method` reference a route
//! points at, and the host a route is mounted on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The handler reference is not of the form `alias.Method`.
    #[error("invalid handler identifier '{0}', expected the form 'alias.Method'")]
    InvalidFormat(String),
}

const RUST_KEYWORDS: &[&str] = &[
    "Self", "abstract", "as", "async", "await", "become", "box", "break", "const", "continue",
    "crate", "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if",
    "impl", "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv",
    "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Alias under which a pipe's capabilities are addressed in configuration.
///
/// When a declaration does not name an alias explicitly, the alias is the last
/// `/`-separated segment of its import path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipeAlias(String);

impl PipeAlias {
    pub fn new(alias: impl Into<String>) -> Self {
        Self(alias.into())
    }

    /// Derive the alias from an import path (`github.com/org/name` -> `name`).
    pub fn from_import_path(import_path: &str) -> Self {
        let segment = import_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(import_path);
        Self(segment.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the alias can be used as a Cargo dependency key.
    pub fn is_valid_dependency_key(&self) -> bool {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// The Rust identifier the dependency is imported as.
    pub fn crate_ident(&self) -> String {
        self.0.replace('-', "_")
    }

    /// Whether the crate identifier is a Rust keyword, strict or reserved.
    pub fn is_reserved_word(&self) -> bool {
        RUST_KEYWORDS.contains(&self.crate_ident().as_str())
    }
}

impl fmt::Display for PipeAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PipeAlias {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a pipe capability, written `alias.Method` in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    raw: String,
    split: usize,
}

impl HandlerId {
    /// Parse a configured handler reference.
    ///
    /// An empty string is not an error: it means "no handler" and yields
    /// `Ok(None)`. Anything else must split on `.` into exactly two
    /// non-empty fragments.
    pub fn parse(raw: &str) -> Result<Option<Self>, IdentifierError> {
        if raw.is_empty() {
            return Ok(None);
        }

        let mut fragments = raw.split('.');
        match (fragments.next(), fragments.next(), fragments.next()) {
            (Some(alias), Some(method), None) if !alias.is_empty() && !method.is_empty() => {
                Ok(Some(Self {
                    raw: raw.to_string(),
                    split: alias.len(),
                }))
            }
            _ => Err(IdentifierError::InvalidFormat(raw.to_string())),
        }
    }

    pub fn alias(&self) -> &str {
        &self.raw[..self.split]
    }

    pub fn method(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Host a route is mounted on.
///
/// Hosts are compared case-insensitively, so the inner value is always
/// lowercase. A host may carry a port (`example.com:8080`), start with a
/// wildcard label (`*.example.com`) or be the catch-all `*`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostName(String);

impl HostName {
    pub fn new(host: impl AsRef<str>) -> Self {
        Self(host.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host with any `:port` suffix removed. IPv6 literals keep their
    /// brackets.
    pub fn without_port(&self) -> Option<HostName> {
        let host = &self.0;
        let cut = if host.starts_with('[') {
            host.find("]:").map(|i| i + 1)
        } else if host.matches(':').count() == 1 {
            host.find(':')
        } else {
            None
        };
        cut.map(|i| HostName(host[..i].to_string()))
    }

    /// The wildcard form covering this host: `api.example.com` ->
    /// `*.example.com`.
    pub fn wildcard(&self) -> Option<HostName> {
        let host = self.without_port().unwrap_or_else(|| self.clone());
        let (_, parent) = host.0.split_once('.')?;
        if parent.is_empty() {
            return None;
        }
        Some(HostName(format!("*.{}", parent)))
    }

    /// The catch-all host.
    pub fn any() -> Self {
        Self("*".to_string())
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_alias_from_import_path() {
        assert_eq!(PipeAlias::from_import_path("a/b").as_str(), "b");
        assert_eq!(
            PipeAlias::from_import_path("github.com/pipeway/sample").as_str(),
            "sample"
        );
        assert_eq!(PipeAlias::from_import_path("single").as_str(), "single");
        assert_eq!(PipeAlias::from_import_path("../pipes/echo/").as_str(), "echo");
    }

    #[test]
    fn test_alias_dependency_key() {
        assert!(PipeAlias::new("echo").is_valid_dependency_key());
        assert!(PipeAlias::new("rate-limit").is_valid_dependency_key());
        assert!(!PipeAlias::new("9lives").is_valid_dependency_key());
        assert!(!PipeAlias::new("with.dot").is_valid_dependency_key());
        assert!(!PipeAlias::new("").is_valid_dependency_key());
        assert_eq!(PipeAlias::new("rate-limit").crate_ident(), "rate_limit");
    }

    #[test]
    fn test_alias_reserved_words() {
        for keyword in ["type", "self", "crate", "Self", "async", "gen"] {
            let alias = PipeAlias::new(keyword);
            assert!(alias.is_valid_dependency_key());
            assert!(alias.is_reserved_word(), "{}", keyword);
        }
        assert!(!PipeAlias::new("echo").is_reserved_word());
        assert!(!PipeAlias::new("types").is_reserved_word());
        assert!(!PipeAlias::new("self-check").is_reserved_word());
    }

    #[test]
    fn test_handler_id() {
        let id = HandlerId::parse("base.Default").unwrap().unwrap();
        assert_eq!(id.alias(), "base");
        assert_eq!(id.method(), "Default");
        assert_eq!(id.to_string(), "base.Default");

        assert_eq!(HandlerId::parse("").unwrap(), None);
        assert!(HandlerId::parse("base").is_err());
        assert!(HandlerId::parse("a.b.c").is_err());
        assert!(HandlerId::parse(".Default").is_err());
        assert!(HandlerId::parse("base.").is_err());
    }

    #[test]
    fn test_host_name() {
        let host = HostName::new("API.Example.com:8080");
        assert_eq!(host.as_str(), "api.example.com:8080");
        assert_eq!(host.without_port().unwrap().as_str(), "api.example.com");
        assert_eq!(host.wildcard().unwrap().as_str(), "*.example.com");

        assert_eq!(HostName::new("localhost").without_port(), None);
        assert_eq!(HostName::new("localhost").wildcard(), None);
        assert_eq!(
            HostName::new("[::1]:80").without_port().unwrap().as_str(),
            "[::1]"
        );
        assert_eq!(HostName::new("::1").without_port(), None);
    }

    proptest! {
        #[test]
        fn prop_malformed_identifiers_rejected(raw in "[a-zA-Z.]{1,12}") {
            let fragments: Vec<&str> = raw.split('.').collect();
            let well_formed = fragments.len() == 2 && fragments.iter().all(|f| !f.is_empty());
            prop_assert_eq!(HandlerId::parse(&raw).is_ok(), well_formed);
        }

        #[test]
        fn prop_alias_is_last_segment(segments in proptest::collection::vec("[a-z][a-z0-9_-]{0,8}", 1..5)) {
            let import_path = segments.join("/");
            let alias = PipeAlias::from_import_path(&import_path);
            prop_assert_eq!(alias.as_str(), segments.last().unwrap().as_str());
        }
    }
}
