//! Reference validation
//!
//! Validates that handler identifiers are well formed and point at declared
//! pipes, that pipe aliases are unique, and that origins are usable.

use std::collections::HashSet;

use pipeway_common::HandlerId;

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::Config;

/// Validate every `alias.Method` reference and pipe declaration
pub fn validate_references(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    // Effective aliases must be unique
    let mut aliases = HashSet::new();
    for pipe in &config.pipes {
        let alias = pipe.alias();
        if alias.as_str().is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Pipe,
                format!("Pipe '{}' has an empty alias", pipe.import_path),
            ));
            continue;
        }
        if !aliases.insert(alias.as_str().to_string()) {
            result.add_error(ValidationError::new(
                ErrorCategory::Pipe,
                format!("Pipe alias '{}' is declared more than once", alias),
            ));
        }
    }

    let action = &config.server.action;
    let references = config
        .hosts
        .iter()
        .map(|host| (format!("host '{}'", host.endpoint), host.handler.as_str()))
        .chain([
            ("action 'not-found'".to_string(), action.not_found.as_str()),
            ("action 'panic'".to_string(), action.panic.as_str()),
        ]);

    for (owner, raw) in references {
        match HandlerId::parse(raw) {
            Ok(None) => {}
            Ok(Some(id)) => {
                if !aliases.contains(id.alias()) {
                    result.add_error(ValidationError::new(
                        ErrorCategory::Handler,
                        format!(
                            "Handler '{}' referenced in {} but pipe '{}' is not declared",
                            id,
                            owner,
                            id.alias()
                        ),
                    ));
                }
            }
            Err(e) => {
                result.add_error(ValidationError::new(
                    ErrorCategory::Handler,
                    format!("{} in {}", e, owner),
                ));
            }
        }
    }

    for host in &config.hosts {
        if host.endpoint.trim().is_empty() {
            result.add_error(ValidationError::new(
                ErrorCategory::Host,
                "Host with an empty endpoint",
            ));
        }
        if let Some(origin) = host.origin.as_deref().filter(|o| !o.is_empty()) {
            if let Err(message) = normalize_origin(origin) {
                result.add_error(ValidationError::new(
                    ErrorCategory::Host,
                    format!("Host '{}' has invalid origin '{}': {}", host.endpoint, origin, message),
                ));
            }
        }
    }

    result
}

/// Check an upstream origin and return it as `http://host[:port]`.
///
/// An origin is an absolute `http` URL naming a host, with no credentials,
/// no path beyond `/`, no query and no fragment. The scheme and host are
/// compared case-insensitively; the default port is dropped.
pub fn normalize_origin(origin: &str) -> Result<String, String> {
    let url = url::Url::parse(origin).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}', expected http", url.scheme()));
    }
    let Some(host) = url.host() else {
        return Err("missing host".to_string());
    };
    if !url.username().is_empty() || url.password().is_some() {
        return Err("origin must not carry credentials".to_string());
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err("origin must not carry a path, query or fragment".to_string());
    }

    Ok(match url.port() {
        Some(port) => format!("http://{}:{}", host, port),
        None => format!("http://{}", host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HostConfig, PipeDeclaration};

    fn config_with_pipe() -> Config {
        let mut config = Config::default_for_testing();
        config.pipes.push(PipeDeclaration::new("a/b", "v1"));
        config
    }

    #[test]
    fn test_valid_reference() {
        let mut config = config_with_pipe();
        config.hosts.push(HostConfig::new("x.com", "b.Mid"));
        config.server.action.not_found = "b.NotFound".to_string();

        let result = validate_references(&config);
        assert!(result.is_ok(), "{:?}", result.errors);
    }

    #[test]
    fn test_undeclared_alias() {
        let mut config = config_with_pipe();
        config.hosts.push(HostConfig::new("x.com", "missing.Mid"));

        let result = validate_references(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.category == ErrorCategory::Handler && e.message.contains("not declared")));
    }

    #[test]
    fn test_malformed_identifier() {
        let mut config = config_with_pipe();
        config.server.action.panic = "b.Recover.Extra".to_string();

        let result = validate_references(&config);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("action 'panic'"));
    }

    #[test]
    fn test_duplicate_alias() {
        let mut config = config_with_pipe();
        config.pipes.push(PipeDeclaration::new("c/b", "v2"));

        let result = validate_references(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.message.contains("declared more than once")));
    }

    #[test]
    fn test_invalid_origins() {
        let mut config = config_with_pipe();
        config
            .hosts
            .push(HostConfig::new("a.com", "").with_origin("http://127.0.0.1:9000"));
        config
            .hosts
            .push(HostConfig::new("b.com", "").with_origin("https://secure.example.com"));
        config.hosts.push(HostConfig::new("c.com", "").with_origin("not a url"));
        config
            .hosts
            .push(HostConfig::new("d.com", "").with_origin("http://x.com/path"));

        let result = validate_references(&config);
        let hosts: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.category == ErrorCategory::Host)
            .collect();
        assert_eq!(hosts.len(), 3);
        assert!(hosts.iter().all(|e| !e.message.contains("'a.com'")));
    }

    #[test]
    fn test_empty_origin_is_absent() {
        let mut config = config_with_pipe();
        config.hosts.push(HostConfig::new("a.com", "").with_origin(""));

        let result = validate_references(&config);
        assert!(result.is_ok(), "{:?}", result.errors);
    }

    #[test]
    fn test_normalize_origin() {
        let cases = [
            ("http://127.0.0.1:9000", Some("http://127.0.0.1:9000")),
            ("http://x.com/", Some("http://x.com")),
            ("HTTP://X.com:80", Some("http://x.com")),
            ("http://[::1]:8080", Some("http://[::1]:8080")),
            ("http://user:pw@x.com", None),
            ("http://user@x.com", None),
            ("https://x.com", None),
            ("http://x.com/path", None),
            ("http://x.com/?q=1", None),
            ("http://x.com/#top", None),
            ("x.com:80", None),
            ("not a url", None),
        ];
        for (origin, want) in cases {
            assert_eq!(normalize_origin(origin).ok().as_deref(), want, "{}", origin);
        }
    }
}
