//! Pipe resolver.
//!
//! Turns `alias.Method` references into callables bound to a registered pipe.
//! All resolution happens while the routing table is built; nothing is
//! looked up per request.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use pipeway_common::HandlerId;
use pipeway_pipe_api::{Capability, CapabilityKind, Handler, Middleware, Pipe};

use crate::errors::{Found, ResolveError};
use crate::registry::PipeRegistry;

/// A resolved reference: the callable plus the pipe that owns it.
#[derive(Clone)]
pub struct Binding {
    id: HandlerId,
    capability: Capability,
    pipe: Arc<dyn Pipe>,
}

impl Binding {
    pub fn identifier(&self) -> &str {
        self.id.as_str()
    }

    pub fn alias(&self) -> &str {
        self.id.alias()
    }

    pub fn method(&self) -> &str {
        self.id.method()
    }

    pub fn kind(&self) -> CapabilityKind {
        self.capability.kind()
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// The pipe instance the callable belongs to.
    pub fn pipe(&self) -> &Arc<dyn Pipe> {
        &self.pipe
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("identifier", &self.id.as_str())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Resolves handler references against a [`PipeRegistry`].
pub struct PipeResolver {
    registry: Arc<PipeRegistry>,
    /// Resolved bindings (identifier -> binding)
    cache: RwLock<HashMap<String, Binding>>,
}

impl PipeResolver {
    pub fn new(registry: Arc<PipeRegistry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<PipeRegistry> {
        &self.registry
    }

    /// Resolve `raw` to a capability of the `expected` shape.
    ///
    /// An empty reference resolves to `None`.
    pub fn resolve(
        &self,
        raw: &str,
        expected: CapabilityKind,
    ) -> Result<Option<Binding>, ResolveError> {
        let Some(id) = HandlerId::parse(raw)? else {
            return Ok(None);
        };

        let cached = self.cache.read().get(raw).cloned();
        let binding = match cached {
            Some(binding) => {
                trace!(identifier = raw, "Binding served from cache");
                binding
            }
            None => {
                let binding = self.lookup(id, expected)?;
                self.cache
                    .write()
                    .entry(raw.to_string())
                    .or_insert(binding)
                    .clone()
            }
        };

        if binding.kind() != expected {
            return Err(ResolveError::UnresolvedOrWrongShape {
                identifier: raw.to_string(),
                expected,
                found: Found::Kind(binding.kind()),
            });
        }

        Ok(Some(binding))
    }

    /// Resolve a middleware reference.
    pub fn middleware(&self, raw: &str) -> Result<Option<Middleware>, ResolveError> {
        Ok(self
            .resolve(raw, CapabilityKind::Middleware)?
            .and_then(|binding| binding.capability.as_middleware().cloned()))
    }

    /// Resolve a handler reference.
    pub fn handler(&self, raw: &str) -> Result<Option<Handler>, ResolveError> {
        Ok(self
            .resolve(raw, CapabilityKind::Handler)?
            .and_then(|binding| binding.capability.as_handler().cloned()))
    }

    /// Number of cached bindings.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn lookup(&self, id: HandlerId, expected: CapabilityKind) -> Result<Binding, ResolveError> {
        let registered =
            self.registry
                .registered(id.alias())
                .ok_or_else(|| ResolveError::UnknownAlias {
                    identifier: id.to_string(),
                    alias: id.alias().to_string(),
                })?;

        let capability = registered.capabilities.get(id.method()).cloned().ok_or_else(|| {
            ResolveError::UnresolvedOrWrongShape {
                identifier: id.to_string(),
                expected,
                found: Found::Missing,
            }
        })?;

        debug!(
            identifier = %id,
            kind = %capability.kind(),
            "Resolved pipe capability"
        );

        Ok(Binding {
            id,
            capability,
            pipe: Arc::clone(&registered.pipe),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::StatusCode;
    use pipeway_config::PipeDeclaration;
    use pipeway_pipe_api::{body, Capabilities};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Base {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Pipe for Base {
        fn capabilities(&self) -> Capabilities {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Capabilities::new()
                .middleware("Mid", Middleware::new(|next| next))
                .handler(
                    "NotFound",
                    Handler::new(|_req| async { body::text(StatusCode::NOT_FOUND, "gone") }),
                )
        }
    }

    fn resolver() -> (PipeResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = PipeRegistry::new(&[PipeDeclaration::new("a/b", "v1")]);
        registry
            .insert(
                "b",
                Arc::new(Base {
                    calls: Arc::clone(&calls),
                }),
            )
            .unwrap();
        (PipeResolver::new(Arc::new(registry)), calls)
    }

    #[test]
    fn test_empty_identifier_is_absent() {
        let (resolver, _) = resolver();
        assert!(resolver.resolve("", CapabilityKind::Middleware).unwrap().is_none());
        assert!(resolver.handler("").unwrap().is_none());
    }

    #[test]
    fn test_resolves_both_shapes() {
        let (resolver, _) = resolver();
        let binding = resolver
            .resolve("b.Mid", CapabilityKind::Middleware)
            .unwrap()
            .unwrap();
        assert_eq!(binding.alias(), "b");
        assert_eq!(binding.method(), "Mid");
        assert_eq!(binding.kind(), CapabilityKind::Middleware);

        assert!(resolver.handler("b.NotFound").unwrap().is_some());
    }

    #[test]
    fn test_methods_share_one_table() {
        let (resolver, calls) = resolver();
        resolver.middleware("b.Mid").unwrap();
        resolver.handler("b.NotFound").unwrap();
        assert!(resolver.handler("b.Absent").is_err());

        assert_eq!(resolver.cached(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_format() {
        let (resolver, _) = resolver();
        for raw in ["b", "b.Mid.x", ".Mid", "b."] {
            assert!(matches!(
                resolver.resolve(raw, CapabilityKind::Middleware),
                Err(ResolveError::InvalidIdentifierFormat(_))
            ));
        }
    }

    #[test]
    fn test_unknown_alias() {
        let (resolver, _) = resolver();
        assert!(matches!(
            resolver.middleware("nope.Mid"),
            Err(ResolveError::UnknownAlias { ref alias, .. }) if alias == "nope"
        ));
    }

    #[test]
    fn test_missing_method() {
        let (resolver, _) = resolver();
        assert_eq!(
            resolver.handler("b.Absent").unwrap_err(),
            ResolveError::UnresolvedOrWrongShape {
                identifier: "b.Absent".to_string(),
                expected: CapabilityKind::Handler,
                found: Found::Missing,
            }
        );
    }

    #[test]
    fn test_wrong_shape_fails_even_when_cached() {
        let (resolver, calls) = resolver();
        resolver.middleware("b.Mid").unwrap();
        assert_eq!(resolver.cached(), 1);

        let err = resolver.handler("b.Mid").unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnresolvedOrWrongShape {
                identifier: "b.Mid".to_string(),
                expected: CapabilityKind::Handler,
                found: Found::Kind(CapabilityKind::Middleware),
            }
        );

        resolver.middleware("b.Mid").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
