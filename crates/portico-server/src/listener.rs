//! Listener state machine.
//!
//! ```text
//! Idle --bind--> Starting --serve--> Serving --drain--> Draining --> Stopped
//! ```
//!
//! Binding is startup-fatal on failure. Once serving, each accepted connection
//! runs in its own task, registered in the [`TaskRegistry`] until it closes.
//! The drain signal closes the socket (new connections are refused by the OS)
//! and asks every open connection to finish its in-flight requests. If the
//! force signal fires before they do, the remaining connections are aborted and
//! the stop is reported as degraded.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use portico_core::{Handler, HttpRequest};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

use crate::error::{ServerError, ServerResult};
use crate::shutdown::ShutdownSignal;
use crate::tasks::{TaskGuard, TaskRegistry};

/// Lifecycle state of one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Configured, no socket yet.
    Idle,
    /// Socket bound, not accepting yet.
    Starting,
    /// Accepting connections.
    Serving,
    /// Socket closed, waiting for open connections.
    Draining,
    /// Terminal.
    Stopped,
}

/// How a listener's drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every connection finished before the force signal.
    Graceful,
    /// The force signal fired first.
    Degraded {
        /// Connections aborted mid-flight.
        abandoned: usize,
    },
}

impl DrainOutcome {
    /// Combines the outcomes of listeners sharing one deadline.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Graceful, Self::Graceful) => Self::Graceful,
            (Self::Degraded { abandoned }, Self::Graceful)
            | (Self::Graceful, Self::Degraded { abandoned }) => Self::Degraded { abandoned },
            (Self::Degraded { abandoned: a }, Self::Degraded { abandoned: b }) => {
                Self::Degraded { abandoned: a + b }
            }
        }
    }

    /// Returns `true` for [`DrainOutcome::Graceful`].
    #[must_use]
    pub fn is_graceful(self) -> bool {
        self == Self::Graceful
    }
}

/// Signals a serving listener reacts to.
#[derive(Debug, Clone)]
pub struct ListenerSignals {
    /// Stop accepting and let open connections finish.
    pub drain: ShutdownSignal,
    /// Abort whatever is still open.
    pub force: ShutdownSignal,
}

/// A listener that has not bound yet.
pub struct Listener {
    name: &'static str,
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    state: watch::Sender<ListenerState>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Listener {
    /// Creates an idle listener that will serve `handler` on `addr`.
    pub fn new(name: &'static str, addr: SocketAddr, handler: Arc<dyn Handler>) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            name,
            addr,
            handler,
            state,
        }
    }

    /// Observes state transitions.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Binds the socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound. There is no
    /// retry.
    pub async fn bind(self) -> ServerResult<BoundListener> {
        let socket = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                listener: self.name,
                addr: self.addr,
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| ServerError::Bind {
            listener: self.name,
            addr: self.addr,
            source,
        })?;

        self.state.send_replace(ListenerState::Starting);
        tracing::debug!(listener = self.name, addr = %local_addr, "listener bound");
        Ok(BoundListener {
            name: self.name,
            socket,
            local_addr,
            handler: self.handler,
            state: self.state,
        })
    }
}

/// A bound listener, ready to serve.
pub struct BoundListener {
    name: &'static str,
    socket: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    state: watch::Sender<ListenerState>,
}

impl std::fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundListener")
            .field("name", &self.name)
            .field("local_addr", &self.local_addr)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl BoundListener {
    /// Listener name used in logs and task names.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Observes state transitions.
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Accepts connections until `signals.drain` fires, then drains.
    ///
    /// A fatal accept error fires `signals.drain` itself, drains, and is
    /// returned once the drain ends.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] after a fatal accept error.
    pub async fn serve(
        self,
        registry: TaskRegistry,
        signals: ListenerSignals,
    ) -> ServerResult<DrainOutcome> {
        let Self {
            name,
            socket,
            local_addr,
            handler,
            state,
        } = self;

        state.send_replace(ListenerState::Serving);
        tracing::info!(listener = name, addr = %local_addr, "listening");

        let mut connections = JoinSet::new();
        let drain = signals.drain.recv();
        tokio::pin!(drain);

        let accept_result = loop {
            tokio::select! {
                biased;
                () = &mut drain => break Ok(()),
                accepted = socket.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let guard = registry.register(format!("{name}:{peer}"));
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&handler),
                            signals.drain.clone(),
                            guard,
                        ));
                    }
                    Err(err) if is_transient(&err) => {
                        tracing::debug!(listener = name, error = %err, "accept failed, continuing");
                    }
                    Err(err) => {
                        tracing::error!(listener = name, error = %err, "accept failed, shutting down");
                        signals.drain.trigger();
                        break Err(ServerError::Accept { listener: name, source: err });
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    reap(name, joined);
                }
            }
        };

        state.send_replace(ListenerState::Draining);
        drop(socket);
        tracing::info!(
            listener = name,
            open_connections = connections.len(),
            "stopped accepting, draining"
        );

        let force = signals.force.recv();
        tokio::pin!(force);

        let outcome = loop {
            tokio::select! {
                biased;
                joined = connections.join_next() => match joined {
                    Some(joined) => reap(name, joined),
                    None => break DrainOutcome::Graceful,
                },
                () = &mut force => {
                    let abandoned = connections.len();
                    connections.shutdown().await;
                    break DrainOutcome::Degraded { abandoned };
                }
            }
        };

        state.send_replace(ListenerState::Stopped);
        match outcome {
            DrainOutcome::Graceful => tracing::info!(listener = name, "listener drained"),
            DrainOutcome::Degraded { abandoned } => tracing::warn!(
                listener = name,
                abandoned,
                "drain deadline passed, connections aborted"
            ),
        }
        accept_result.map(|()| outcome)
    }
}

// Errors caused by a single peer; the listening socket itself is fine.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

fn reap(listener: &'static str, joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            tracing::error!(listener, "connection task panicked");
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn Handler>,
    drain: ShutdownSignal,
    _guard: TaskGuard,
) {
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let handler = Arc::clone(&handler);
        async move {
            let request: HttpRequest = request.map(|body| body.map_err(Into::into).boxed_unsync());
            Ok::<_, Infallible>(handler.handle(request).await)
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let drained = drain.recv();
    tokio::pin!(drained);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = &mut drained => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(err) = result {
        tracing::debug!(peer_addr = %peer, error = %err, "connection closed with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::{full, BoxFuture, HttpResponse};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Hello;

    impl Handler for Hello {
        fn handle(&self, _request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
            Box::pin(async { HttpResponse::new(full("hello")) })
        }
    }

    struct Stalled(Arc<tokio::sync::Notify>);

    impl Handler for Stalled {
        fn handle(&self, _request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
            Box::pin(async {
                self.0.notify_one();
                std::future::pending::<()>().await;
                HttpResponse::new(full("never"))
            })
        }
    }

    fn signals() -> ListenerSignals {
        ListenerSignals {
            drain: ShutdownSignal::new(),
            force: ShutdownSignal::new(),
        }
    }

    async fn bound(handler: Arc<dyn Handler>) -> BoundListener {
        Listener::new("test", "127.0.0.1:0".parse().unwrap(), handler)
            .bind()
            .await
            .unwrap()
    }

    async fn http_get(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_merge_outcomes() {
        let degraded = DrainOutcome::Degraded { abandoned: 2 };
        assert_eq!(DrainOutcome::Graceful.merge(DrainOutcome::Graceful), DrainOutcome::Graceful);
        assert_eq!(DrainOutcome::Graceful.merge(degraded), degraded);
        assert_eq!(
            degraded.merge(DrainOutcome::Degraded { abandoned: 1 }),
            DrainOutcome::Degraded { abandoned: 3 }
        );
        assert!(!degraded.is_graceful());
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let taken = bound(Arc::new(Hello)).await;
        let err = Listener::new("second", taken.local_addr(), Arc::new(Hello))
            .bind()
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Bind { listener: "second", .. }));
    }

    #[tokio::test]
    async fn test_state_transitions_and_graceful_drain() {
        let listener = Listener::new("test", "127.0.0.1:0".parse().unwrap(), Arc::new(Hello));
        let state = listener.state();
        assert_eq!(*state.borrow(), ListenerState::Idle);

        let listener = listener.bind().await.unwrap();
        assert_eq!(*state.borrow(), ListenerState::Starting);
        let addr = listener.local_addr();

        let registry = TaskRegistry::new();
        let signals = signals();
        let serving = tokio::spawn(listener.serve(registry.clone(), signals.clone()));

        let response = http_get(addr).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("hello"));
        assert_eq!(*state.borrow(), ListenerState::Serving);

        signals.drain.trigger();
        let outcome = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, DrainOutcome::Graceful);
        assert_eq!(*state.borrow(), ListenerState::Stopped);
        assert!(registry.is_empty());

        // The socket is closed once draining starts.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_force_aborts_stalled_connections() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let listener = bound(Arc::new(Stalled(Arc::clone(&entered)))).await;
        let addr = listener.local_addr();
        let registry = TaskRegistry::new();
        let signals = signals();
        let serving = tokio::spawn(listener.serve(registry.clone(), signals.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nhost: test\r\n\r\n")
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), entered.notified())
            .await
            .unwrap();

        signals.drain.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!serving.is_finished());

        signals.force.trigger();
        let outcome = tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, DrainOutcome::Degraded { abandoned: 1 });
        assert!(registry.is_empty());
    }
}
