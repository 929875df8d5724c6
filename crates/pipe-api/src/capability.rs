//! Capability table declared by every pipe.
//!
//! The table replaces any form of runtime method discovery: a pipe lists the
//! callables it offers, each tagged with its call shape, and the gateway
//! resolves configured `alias.Method` references with a plain lookup plus a
//! tag check.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::body::{Request, Response};

/// Terminal request handler: produces the response itself.
#[derive(Clone)]
pub struct Handler(pub(crate) Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |req| Box::pin(f(req))))
    }

    /// Invoke the handler.
    pub fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        (self.0)(req)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// Middleware: wraps a downstream handler into a new handler.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Handler) -> Handler + Send + Sync>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap `next`, returning the composed handler.
    pub fn wrap(&self, next: Handler) -> Handler {
        (self.0)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Call shape of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Middleware,
    Handler,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Middleware => f.write_str("middleware"),
            CapabilityKind::Handler => f.write_str("handler"),
        }
    }
}

/// A callable offered by a pipe, tagged with its shape.
#[derive(Debug, Clone)]
pub enum Capability {
    Middleware(Middleware),
    Handler(Handler),
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Middleware(_) => CapabilityKind::Middleware,
            Capability::Handler(_) => CapabilityKind::Handler,
        }
    }

    pub fn as_middleware(&self) -> Option<&Middleware> {
        match self {
            Capability::Middleware(m) => Some(m),
            Capability::Handler(_) => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Capability::Handler(h) => Some(h),
            Capability::Middleware(_) => None,
        }
    }
}

/// Ordered mapping from method name to capability.
///
/// Declaring a name twice replaces the earlier entry in place.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<(String, Capability)>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a middleware under `name`.
    pub fn middleware(self, name: impl Into<String>, middleware: Middleware) -> Self {
        self.with(name, Capability::Middleware(middleware))
    }

    /// Declare a handler under `name`.
    pub fn handler(self, name: impl Into<String>, handler: Handler) -> Self {
        self.with(name, Capability::Handler(handler))
    }

    /// Declare an arbitrary capability under `name`.
    pub fn with(mut self, name: impl Into<String>, capability: Capability) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = capability,
            None => self.entries.push((name, capability)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, capability)| capability)
    }

    /// Method names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body;
    use http::StatusCode;

    fn ok_handler(message: &'static str) -> Handler {
        Handler::new(move |_req| async move { body::text(StatusCode::OK, message) })
    }

    #[test]
    fn test_capabilities_preserve_order() {
        let caps = Capabilities::new()
            .handler("Zeta", ok_handler("z"))
            .middleware("Alpha", Middleware::new(|next| next))
            .handler("Mid", ok_handler("m"));

        let names: Vec<_> = caps.names().collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(caps.len(), 3);
    }

    #[test]
    fn test_redeclaration_replaces_in_place() {
        let caps = Capabilities::new()
            .handler("Default", ok_handler("first"))
            .handler("Other", ok_handler("other"))
            .middleware("Default", Middleware::new(|next| next));

        assert_eq!(caps.len(), 2);
        assert_eq!(caps.names().next(), Some("Default"));
        assert_eq!(
            caps.get("Default").map(Capability::kind),
            Some(CapabilityKind::Middleware)
        );
    }

    #[tokio::test]
    async fn test_middleware_wraps_handler() {
        let tagging = Middleware::new(|next: Handler| {
            Handler::new(move |req| {
                let next = next.clone();
                async move {
                    let mut response = next.call(req).await;
                    response
                        .headers_mut()
                        .insert("x-wrapped", http::HeaderValue::from_static("1"));
                    response
                }
            })
        });

        let handler = tagging.wrap(ok_handler("inner"));
        let response = handler.call(http::Request::new(body::empty())).await;
        assert_eq!(response.headers()["x-wrapped"], "1");
        let bytes = body::collect(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"inner");
    }
}
