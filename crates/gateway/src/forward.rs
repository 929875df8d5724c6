//! Reverse-proxy forwarder.
//!
//! The innermost link of every host chain: rewrites the request for the
//! upstream, sends it with the shared client and relays the response.

use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{StatusCode, Uri, Version};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use tracing::{trace, warn};

use pipeway_config::{normalize_origin, ClientConfig};
use pipeway_pipe_api::{body, Body, BoxError, Handler, Request, Response};

/// Header names used by the forwarder.
pub mod names {
    pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
    pub const KEEP_ALIVE: &str = "keep-alive";
    pub const PROXY_CONNECTION: &str = "proxy-connection";
}

/// Headers that only apply to a single connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    names::KEEP_ALIVE,
    names::PROXY_CONNECTION,
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Address of the connected client, attached to every inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// Where a host's requests are forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// A fixed upstream origin (`http://host:port`).
    Origin(Uri),
    /// The authority the request carries once its pipe chain has run,
    /// falling back to the inbound `Host` header.
    RequestHost,
}

impl RouteTarget {
    /// Pick the variant from an optional configured origin.
    ///
    /// An empty origin counts as absent. Anything else must pass
    /// [`normalize_origin`], the same rule configuration validation applies.
    pub fn from_origin(origin: Option<&str>) -> Result<Self, String> {
        let Some(origin) = origin.filter(|o| !o.is_empty()) else {
            return Ok(RouteTarget::RequestHost);
        };

        let normalized = normalize_origin(origin)?;
        let uri: Uri = normalized
            .parse()
            .map_err(|e: http::uri::InvalidUri| e.to_string())?;
        Ok(RouteTarget::Origin(uri))
    }
}

/// Shared upstream HTTP client.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Forwarder {
    pub fn new(config: &ClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(config.nodelay);
        connector.set_connect_timeout(config.connect_timeout());

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.effective_max_idle_per_host())
            .build(connector);

        Self { client }
    }

    /// A handler forwarding every request to `target`.
    pub fn handler(&self, target: RouteTarget) -> Handler {
        let forwarder = self.clone();
        Handler::new(move |req| {
            let forwarder = forwarder.clone();
            let target = target.clone();
            async move { forwarder.forward(&target, req).await }
        })
    }

    /// Forward one request. Upstream failures become `502 Bad Gateway`.
    pub async fn forward(&self, target: &RouteTarget, req: Request) -> Response {
        let req = match prepare(target, req) {
            Ok(req) => req,
            Err(reason) => {
                warn!(reason = %reason, "Cannot determine upstream for request");
                return body::text(StatusCode::BAD_GATEWAY, "502 bad gateway\n");
            }
        };

        let upstream = req.uri().clone();
        trace!(upstream = %upstream, method = %req.method(), "Forwarding request");

        match self.client.request(req).await {
            Ok(response) => {
                let mut response =
                    response.map(|incoming| incoming.map_err(|e| -> BoxError { Box::new(e) }).boxed());
                strip_hop_by_hop(response.headers_mut());
                trace!(upstream = %upstream, status = response.status().as_u16(), "Upstream responded");
                response
            }
            Err(e) => {
                warn!(upstream = %upstream, error = %e, "Upstream request failed");
                body::text(StatusCode::BAD_GATEWAY, "502 bad gateway\n")
            }
        }
    }
}

/// Rewrite an inbound request into the upstream request.
fn prepare(target: &RouteTarget, mut req: Request) -> Result<Request, String> {
    let inbound_host = inbound_host(&req);

    let (scheme, authority) = match target {
        RouteTarget::Origin(origin) => (
            origin.scheme().cloned().unwrap_or(Scheme::HTTP),
            origin.authority().cloned(),
        ),
        RouteTarget::RequestHost => (
            Scheme::HTTP,
            req.uri()
                .authority()
                .cloned()
                .or_else(|| inbound_host.as_deref().and_then(|h| h.parse::<Authority>().ok())),
        ),
    };
    let authority = authority.ok_or_else(|| "request carries no host".to_string())?;

    let path_and_query = req
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    *req.uri_mut() = Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| e.to_string())?;
    *req.version_mut() = Version::HTTP_11;

    let client_ip = req.extensions().get::<ClientAddr>().map(|addr| addr.0.ip());
    let headers = req.headers_mut();
    strip_hop_by_hop(headers);

    if let Some(host) = inbound_host {
        if let Ok(value) = HeaderValue::from_str(&host) {
            headers.insert(names::X_FORWARDED_HOST, value);
        }
    }

    if let Some(ip) = client_ip {
        let forwarded_for = match headers.get(names::X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ip),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(names::X_FORWARDED_FOR, value);
        }
    }

    Ok(req)
}

/// Host the client addressed: the `Host` header, else the URI authority.
fn inbound_host(req: &Request) -> Option<String> {
    req.headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
