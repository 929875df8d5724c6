//! Host router.
//!
//! Builds one request chain per configured host (panic recovery, then the
//! host's middleware, then the forwarder) and a dispatcher selecting the
//! chain by the request host.

use futures::future::BoxFuture;
use http::header::HOST;
use http::StatusCode;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use pipeway_common::HostName;
use pipeway_config::{ActionConfig, HostConfig};
use pipeway_pipe_api::{body, Handler, Middleware, Request, Response};

use crate::errors::RouterError;
use crate::forward::{Forwarder, RouteTarget};
use crate::resolver::PipeResolver;

/// One routed host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub host: HostName,
    /// `alias.Method` middleware reference, possibly empty.
    pub handler: String,
    pub target: RouteTarget,
}

impl RouteEntry {
    pub fn new(host: impl AsRef<str>, handler: impl Into<String>, target: RouteTarget) -> Self {
        Self {
            host: HostName::new(host),
            handler: handler.into(),
            target,
        }
    }

    pub fn from_config(config: &HostConfig) -> Result<Self, RouterError> {
        let target = RouteTarget::from_origin(config.origin.as_deref()).map_err(|reason| {
            RouterError::InvalidOrigin {
                host: config.endpoint.clone(),
                origin: config.origin.clone().unwrap_or_default(),
                reason,
            }
        })?;
        Ok(Self::new(&config.endpoint, config.handler.clone(), target))
    }
}

/// Actions shared by every chain and the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultActions {
    /// Handler for requests no host matches.
    pub not_found: String,
    /// Middleware recovering from panics.
    pub panic: String,
}

impl From<&ActionConfig> for DefaultActions {
    fn from(action: &ActionConfig) -> Self {
        Self {
            not_found: action.not_found.clone(),
            panic: action.panic.clone(),
        }
    }
}

/// Builds request chains from resolved pipe capabilities.
pub struct HostRouter<'a> {
    resolver: &'a PipeResolver,
    forwarder: Forwarder,
}

impl<'a> HostRouter<'a> {
    pub fn new(resolver: &'a PipeResolver, forwarder: Forwarder) -> Self {
        Self {
            resolver,
            forwarder,
        }
    }

    /// Compose the chain for one entry.
    pub fn chain(
        &self,
        entry: &RouteEntry,
        panic: Option<&Middleware>,
    ) -> Result<Handler, RouterError> {
        let middleware =
            self.resolver
                .middleware(&entry.handler)
                .map_err(|source| RouterError::Resolve {
                    context: format!("handler for host '{}'", entry.host),
                    source,
                })?;

        let mut handler = self.forwarder.handler(entry.target.clone());
        if let Some(middleware) = middleware {
            handler = middleware.wrap(handler);
        }
        if let Some(panic) = panic {
            handler = panic.wrap(handler);
        }
        Ok(handler)
    }

    /// Build the dispatcher for all entries.
    ///
    /// Every reference is resolved here; any failure aborts the build.
    pub fn build(
        &self,
        entries: &[RouteEntry],
        actions: &DefaultActions,
    ) -> Result<Dispatcher, RouterError> {
        let panic = self
            .resolver
            .middleware(&actions.panic)
            .map_err(|source| RouterError::Resolve {
                context: "panic action".to_string(),
                source,
            })?;

        let not_found = self
            .resolver
            .handler(&actions.not_found)
            .map_err(|source| RouterError::Resolve {
                context: "not-found action".to_string(),
                source,
            })?
            .unwrap_or_else(default_not_found);
        let not_found = match &panic {
            Some(panic) => panic.wrap(not_found),
            None => not_found,
        };

        let mut routes = HashMap::with_capacity(entries.len());
        for entry in entries {
            let chain = self.chain(entry, panic.as_ref())?;
            if routes.insert(entry.host.clone(), chain).is_some() {
                warn!(host = %entry.host, "Host declared more than once, last declaration wins");
            }
            debug!(
                host = %entry.host,
                handler = %entry.handler,
                target = ?entry.target,
                "Mounted host chain"
            );
        }

        info!(
            hosts = routes.len(),
            panic_recovery = panic.is_some(),
            custom_not_found = !actions.not_found.is_empty(),
            "Routing table built"
        );

        Ok(Dispatcher { routes, not_found })
    }
}

/// Plain `404 page not found` handler.
pub fn default_not_found() -> Handler {
    Handler::new(|_req| async { body::text(StatusCode::NOT_FOUND, "404 page not found\n") })
}

/// Host-keyed request dispatcher. Immutable once built.
pub struct Dispatcher {
    routes: HashMap<HostName, Handler>,
    not_found: Handler,
}

impl Dispatcher {
    /// The chain serving `host`.
    ///
    /// Tries the exact host, the host without its port, the `*.parent`
    /// wildcard and finally the catch-all `*`.
    pub fn lookup(&self, host: Option<&HostName>) -> Option<&Handler> {
        if let Some(host) = host {
            if let Some(handler) = self.routes.get(host) {
                return Some(handler);
            }
            let bare = host.without_port();
            if let Some(handler) = bare.as_ref().and_then(|bare| self.routes.get(bare)) {
                return Some(handler);
            }
            if let Some(handler) = host.wildcard().and_then(|wildcard| self.routes.get(&wildcard)) {
                return Some(handler);
            }
        }
        self.routes.get(&HostName::any())
    }

    /// Route a request to its chain, or the not-found handler.
    pub fn dispatch(&self, req: Request) -> BoxFuture<'static, Response> {
        let host = request_host(&req);
        match self.lookup(host.as_ref()) {
            Some(handler) => handler.call(req),
            None => {
                debug!(host = ?host, "No route for host");
                self.not_found.call(req)
            }
        }
    }

    /// Mounted hosts.
    pub fn hosts(&self) -> impl Iterator<Item = &HostName> {
        self.routes.keys()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Host a request is addressed to: the `Host` header, else the URI
/// authority (HTTP/2).
pub fn request_host(req: &Request) -> Option<HostName> {
    req.headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(HostName::new)
        .or_else(|| req.uri().authority().map(|authority| HostName::new(authority.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResolveError;
    use crate::registry::PipeRegistry;
    use async_trait::async_trait;
    use pipeway_config::{ClientConfig, PipeDeclaration};
    use pipeway_pipe_api::{recover, Capabilities, Pipe};
    use std::sync::Arc;

    struct Fixture;

    fn replying(message: &'static str) -> Middleware {
        Middleware::new(move |_next| {
            Handler::new(move |_req| async move { body::text(StatusCode::OK, message) })
        })
    }

    #[async_trait]
    impl Pipe for Fixture {
        fn capabilities(&self) -> Capabilities {
            Capabilities::new()
                .middleware("Short", replying("short"))
                .middleware("Tag", replying("tag"))
                .middleware(
                    "Boom",
                    Middleware::new(|_next| {
                        Handler::new(|_req| async {
                            if true {
                                panic!("middleware exploded");
                            }
                            body::text(StatusCode::OK, "")
                        })
                    }),
                )
                .middleware("Recover", recover::catch_panic(recover::internal_error))
                .handler(
                    "NotFound",
                    Handler::new(|_req| async { body::text(StatusCode::NOT_FOUND, "gone") }),
                )
                .handler(
                    "Explode",
                    Handler::new(|_req| async {
                        if true {
                            panic!("not-found exploded");
                        }
                        body::text(StatusCode::OK, "")
                    }),
                )
        }
    }

    fn resolver() -> PipeResolver {
        let mut registry = PipeRegistry::new(&[PipeDeclaration::new("a/b", "v1")]);
        registry.insert("b", Arc::new(Fixture)).unwrap();
        PipeResolver::new(Arc::new(registry))
    }

    fn build(entries: &[RouteEntry], actions: &DefaultActions) -> Result<Dispatcher, RouterError> {
        let resolver = resolver();
        let router = HostRouter::new(&resolver, Forwarder::new(&ClientConfig::default()));
        router.build(entries, actions)
    }

    fn request(host: &str) -> Request {
        http::Request::builder()
            .uri("/path")
            .header(HOST, host)
            .body(body::empty())
            .unwrap()
    }

    async fn call(dispatcher: &Dispatcher, host: &str) -> (StatusCode, String) {
        let response = dispatcher.dispatch(request(host)).await;
        let status = response.status();
        let bytes = body::collect(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_dispatch_by_host() {
        let dispatcher = build(
            &[
                RouteEntry::new("x.com", "b.Short", RouteTarget::RequestHost),
                RouteEntry::new("*.wild.com", "b.Tag", RouteTarget::RequestHost),
            ],
            &DefaultActions {
                not_found: "b.NotFound".to_string(),
                panic: String::new(),
            },
        )
        .unwrap();

        assert_eq!(call(&dispatcher, "x.com").await.1, "short");
        assert_eq!(call(&dispatcher, "X.COM:8080").await.1, "short");
        assert_eq!(call(&dispatcher, "api.wild.com").await.1, "tag");
        assert_eq!(
            call(&dispatcher, "other.com").await,
            (StatusCode::NOT_FOUND, "gone".to_string())
        );
    }

    #[tokio::test]
    async fn test_default_not_found() {
        let dispatcher = build(
            &[RouteEntry::new("x.com", "b.Short", RouteTarget::RequestHost)],
            &DefaultActions::default(),
        )
        .unwrap();

        assert_eq!(
            call(&dispatcher, "y.com").await,
            (StatusCode::NOT_FOUND, "404 page not found\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_catch_all_host() {
        let dispatcher = build(
            &[
                RouteEntry::new("x.com", "b.Short", RouteTarget::RequestHost),
                RouteEntry::new("*", "b.Tag", RouteTarget::RequestHost),
            ],
            &DefaultActions::default(),
        )
        .unwrap();

        assert_eq!(call(&dispatcher, "anything.org").await.1, "tag");
        assert_eq!(call(&dispatcher, "x.com").await.1, "short");
    }

    #[tokio::test]
    async fn test_panic_recovery() {
        let dispatcher = build(
            &[RouteEntry::new("x.com", "b.Boom", RouteTarget::RequestHost)],
            &DefaultActions {
                not_found: "b.Explode".to_string(),
                panic: "b.Recover".to_string(),
            },
        )
        .unwrap();

        assert_eq!(call(&dispatcher, "x.com").await.0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(call(&dispatcher, "y.com").await.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_duplicate_host_last_wins() {
        let dispatcher = build(
            &[
                RouteEntry::new("x.com", "b.Short", RouteTarget::RequestHost),
                RouteEntry::new("X.com", "b.Tag", RouteTarget::RequestHost),
            ],
            &DefaultActions::default(),
        )
        .unwrap();

        assert_eq!(dispatcher.len(), 1);
        assert_eq!(call(&dispatcher, "x.com").await.1, "tag");
    }

    #[tokio::test]
    async fn test_empty_handler_still_mounted() {
        // Nothing listens on the request host, so the raw forward fails with 502
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher = build(
            &[RouteEntry::new(addr.to_string(), "", RouteTarget::RequestHost)],
            &DefaultActions::default(),
        )
        .unwrap();

        assert_eq!(dispatcher.len(), 1);
        assert_eq!(call(&dispatcher, &addr.to_string()).await.0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_build_rejects_bad_references() {
        let wrong_shape = build(
            &[RouteEntry::new("x.com", "b.NotFound", RouteTarget::RequestHost)],
            &DefaultActions::default(),
        );
        assert!(matches!(
            wrong_shape,
            Err(RouterError::Resolve {
                source: ResolveError::UnresolvedOrWrongShape { .. },
                ..
            })
        ));

        let bad_panic = build(
            &[],
            &DefaultActions {
                not_found: String::new(),
                panic: "b.NotFound".to_string(),
            },
        );
        assert!(matches!(bad_panic, Err(RouterError::Resolve { ref context, .. }) if context == "panic action"));

        let unknown = build(
            &[],
            &DefaultActions {
                not_found: "zz.NotFound".to_string(),
                panic: String::new(),
            },
        );
        assert!(matches!(
            unknown,
            Err(RouterError::Resolve {
                source: ResolveError::UnknownAlias { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_entry_from_config() {
        let entry = RouteEntry::from_config(
            &HostConfig::new("Example.com", "b.Short").with_origin("http://127.0.0.1:9000"),
        )
        .unwrap();
        assert_eq!(entry.host.as_str(), "example.com");
        assert!(matches!(entry.target, RouteTarget::Origin(_)));

        let entry = RouteEntry::from_config(&HostConfig::new("a.com", "")).unwrap();
        assert_eq!(entry.target, RouteTarget::RequestHost);

        assert!(matches!(
            RouteEntry::from_config(&HostConfig::new("a.com", "").with_origin("ftp://x")),
            Err(RouterError::InvalidOrigin { .. })
        ));
    }

    #[test]
    fn test_request_host_from_authority() {
        let req = http::Request::builder()
            .uri("http://H2.example.com/x")
            .body(body::empty())
            .unwrap();
        assert_eq!(request_host(&req).unwrap().as_str(), "h2.example.com");
    }
}
