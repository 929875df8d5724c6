//! Gateway server.
//!
//! Owns the listening socket. [`GatewayServer::start`] builds the routing
//! table, binds and returns while a background task accepts connections;
//! [`GatewayServer::stop`] drains open connections up to a deadline.

mod drain;

pub use drain::{InFlight, InFlightGuard};

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use pipeway_config::Config;
use pipeway_pipe_api::BoxError;

use crate::errors::ServerError;
use crate::forward::{ClientAddr, Forwarder};
use crate::resolver::PipeResolver;
use crate::router::{DefaultActions, Dispatcher, HostRouter, RouteEntry};

/// Pause after a transient accept failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Callback receiving failures that happen after [`GatewayServer::start`]
/// returned.
pub type AsyncErrorHandler = Arc<dyn Fn(ServerError) + Send + Sync>;

/// Logs the error.
pub fn log_async_error() -> AsyncErrorHandler {
    Arc::new(|err| error!(error = %err, "Gateway server failed"))
}

/// Source of inbound connections for the accept loop.
pub(crate) trait Accept: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(&*self)
    }
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_loop: JoinHandle<Draining>,
}

/// What the accept loop hands back once it stops accepting.
struct Draining {
    graceful: GracefulShutdown,
    connections: JoinSet<()>,
}

/// HTTP gateway listener.
pub struct GatewayServer {
    address: String,
    entries: Vec<RouteEntry>,
    actions: DefaultActions,
    forwarder: Forwarder,
    resolver: Arc<PipeResolver>,
    on_async_error: AsyncErrorHandler,
    in_flight: InFlight,
    running: Mutex<Option<Running>>,
}

impl GatewayServer {
    pub fn new(
        address: impl Into<String>,
        entries: Vec<RouteEntry>,
        actions: DefaultActions,
        forwarder: Forwarder,
        resolver: Arc<PipeResolver>,
    ) -> Self {
        Self {
            address: address.into(),
            entries,
            actions,
            forwarder,
            resolver,
            on_async_error: log_async_error(),
            in_flight: InFlight::new(),
            running: Mutex::new(None),
        }
    }

    /// Server for the listener, hosts, actions and client of `config`.
    pub fn from_config(config: &Config, resolver: Arc<PipeResolver>) -> Result<Self, ServerError> {
        let entries = config
            .hosts
            .iter()
            .map(RouteEntry::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            config.server.listen.socket_address(),
            entries,
            DefaultActions::from(&config.server.action),
            Forwarder::new(&config.client),
            resolver,
        ))
    }

    /// Replace the callback receiving listener failures after start.
    pub fn with_async_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ServerError) + Send + Sync + 'static,
    {
        self.on_async_error = Arc::new(handler);
        self
    }

    /// Build the routing table, bind and start accepting in the background.
    ///
    /// Returns the bound address. Resolution and bind failures are returned
    /// here; later failures go to the async error handler.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let router = HostRouter::new(&self.resolver, self.forwarder.clone());
        let dispatcher = Arc::new(router.build(&self.entries, &self.actions)?);

        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: self.address.clone(),
            source,
        })?;

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let accept_loop = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            self.in_flight.clone(),
            cancel.clone(),
            Arc::clone(&self.on_async_error),
        ));
        *running = Some(Running {
            local_addr,
            cancel,
            accept_loop,
        });

        info!(address = %local_addr, hosts = self.entries.len(), "Gateway listening");
        Ok(local_addr)
    }

    /// Stop accepting, let open connections finish up to `deadline`, then
    /// close whatever is left.
    pub async fn stop(&self, deadline: Duration) -> Result<(), ServerError> {
        let running = self.running.lock().take().ok_or(ServerError::NotRunning)?;

        info!(
            address = %running.local_addr,
            active_requests = self.in_flight.active(),
            deadline_ms = deadline.as_millis() as u64,
            "Stopping gateway"
        );
        running.cancel.cancel();

        let Draining {
            graceful,
            mut connections,
        } = running.accept_loop.await.map_err(|e| {
            ServerError::AsyncListen(io::Error::new(io::ErrorKind::Other, e.to_string()))
        })?;

        match tokio::time::timeout(deadline, graceful.shutdown()).await {
            Ok(()) => {
                while connections.join_next().await.is_some() {}
                info!("Gateway stopped, all connections drained");
                Ok(())
            }
            Err(_) => {
                while connections.try_join_next().is_some() {}
                let remaining = connections.len();
                warn!(
                    remaining_connections = remaining,
                    active_requests = self.in_flight.active(),
                    "Shutdown deadline reached, closing remaining connections"
                );
                connections.shutdown().await;
                Err(ServerError::ShutdownTimeout {
                    deadline,
                    remaining,
                })
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    /// Requests currently being served.
    pub fn active_requests(&self) -> usize {
        self.in_flight.active()
    }
}

async fn accept_loop<A: Accept>(
    mut acceptor: A,
    dispatcher: Arc<Dispatcher>,
    in_flight: InFlight,
    cancel: CancellationToken,
    on_async_error: AsyncErrorHandler,
) -> Draining {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Accept loop cancelled");
                break;
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = acceptor.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(peer = %peer, "Accepted connection");
                    let dispatcher = Arc::clone(&dispatcher);
                    let in_flight = in_flight.clone();
                    let service = service_fn(move |req: http::Request<Incoming>| {
                        let guard = in_flight.enter();
                        let mut req = req.map(|body| {
                            body.map_err(|e| -> BoxError { Box::new(e) }).boxed()
                        });
                        req.extensions_mut().insert(ClientAddr(peer));
                        let response = dispatcher.dispatch(req);
                        async move {
                            let response = response.await;
                            drop(guard);
                            Ok::<_, Infallible>(response)
                        }
                    });

                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn.into_owned());
                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(peer = %peer, error = %e, "Connection closed with error");
                        }
                    });
                }
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "Transient accept error, continuing");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(e) => {
                    on_async_error(ServerError::AsyncListen(e));
                    break;
                }
            }
        }
    }

    drop(acceptor);
    Draining {
        graceful,
        connections,
    }
}

/// Accept errors that only affect one connection attempt or clear up on
/// their own.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_fd_exhaustion(err)
}

/// EMFILE / ENFILE
#[cfg(unix)]
fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeway_config::ClientConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    use crate::registry::PipeRegistry;

    /// Connections handed out in the order a test queues them.
    struct Scripted {
        queue: mpsc::UnboundedReceiver<io::Result<(DuplexStream, SocketAddr)>>,
    }

    impl Accept for Scripted {
        type Stream = DuplexStream;

        fn accept(
            &mut self,
        ) -> impl Future<Output = io::Result<(DuplexStream, SocketAddr)>> + Send {
            async move {
                match self.queue.recv().await {
                    Some(next) => next,
                    None => std::future::pending().await,
                }
            }
        }
    }

    type Queue = mpsc::UnboundedSender<io::Result<(DuplexStream, SocketAddr)>>;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let resolver = PipeResolver::new(Arc::new(PipeRegistry::new(&[])));
        let router = HostRouter::new(&resolver, Forwarder::new(&ClientConfig::default()));
        Arc::new(router.build(&[], &DefaultActions::default()).unwrap())
    }

    fn recording() -> (AsyncErrorHandler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: AsyncErrorHandler = Arc::new(move |err: ServerError| {
            assert!(matches!(err, ServerError::AsyncListen(_)));
            sink.lock().push(err.to_string());
        });
        (handler, seen)
    }

    fn spawn_loop(
        on_async_error: AsyncErrorHandler,
    ) -> (Queue, CancellationToken, JoinHandle<Draining>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(
            Scripted { queue: rx },
            dispatcher(),
            InFlight::new(),
            cancel.clone(),
            on_async_error,
        ));
        (queue, cancel, handle)
    }

    async fn roundtrip(mut client: DuplexStream) -> String {
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: nowhere.test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_fatal_accept_error_reported_once() {
        let (handler, seen) = recording();
        let (queue, _cancel, handle) = spawn_loop(handler);

        queue
            .send(Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")))
            .unwrap();

        let draining = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(draining.connections.is_empty());

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("denied"), "got {}", seen[0]);
    }

    #[tokio::test]
    async fn test_transient_accept_error_keeps_serving() {
        let (handler, seen) = recording();
        let (queue, cancel, handle) = spawn_loop(handler);

        queue
            .send(Err(io::Error::from(io::ErrorKind::ConnectionAborted)))
            .unwrap();
        let (client, server) = tokio::io::duplex(4096);
        queue.send(Ok((server, peer()))).unwrap();

        let response = tokio::time::timeout(Duration::from_secs(5), roundtrip(client))
            .await
            .unwrap();
        assert!(response.starts_with("HTTP/1.1 404"), "got {}", response);
        assert!(response.ends_with("404 page not found\n"));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_transient_classification() {
        let cases = [
            (io::Error::from(io::ErrorKind::ConnectionReset), true),
            (io::Error::from(io::ErrorKind::ConnectionAborted), true),
            (io::Error::from(io::ErrorKind::Interrupted), true),
            (io::Error::from(io::ErrorKind::WouldBlock), true),
            (io::Error::from(io::ErrorKind::PermissionDenied), false),
            (io::Error::from(io::ErrorKind::InvalidInput), false),
            (io::Error::new(io::ErrorKind::Other, "closed"), false),
        ];
        for (err, transient) in cases {
            assert_eq!(is_transient(&err), transient, "{:?}", err);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_fd_exhaustion_is_transient() {
        assert!(is_transient(&io::Error::from_raw_os_error(23)));
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from_raw_os_error(13)));
    }
}
