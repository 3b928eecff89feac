//! TCP server for routing framed requests to endpoint handlers.
//!
//! `start` binds the listener and spawns the acceptance loop, then waits for
//! the shutdown signal. Each accepted connection is served on its own task.
//!
//! On shutdown the acceptance loop stops accepting and closes the listener,
//! then gives in-flight connections up to the drain timeout to finish before
//! aborting them. `start` returns once the drain is over.

use crate::codec::EndpointId;
use crate::connection::handle_connection;
use crate::handler::{ErrorReporter, Handler};
use crate::registry::EndpointRegistry;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, TcpListener};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Pending-connection backlog for the listening socket
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors surfaced by [`TeamServer::start`]
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("acceptance loop failed: {0}")]
    AcceptLoop(#[from] JoinError),
}

/// State read by every connection task
pub(crate) struct Shared {
    pub(crate) registry: EndpointRegistry,
    pub(crate) invalid_endpoint_handler: Arc<dyn Handler>,
    pub(crate) internal_error_reporter: Arc<dyn ErrorReporter>,
    pub(crate) recv_timeout: Duration,
    pub(crate) send_timeout: Duration,
}

/// Fires the server's shutdown signal. Cheap to clone.
///
/// The signal latches: once fired, `start` returns as soon as its listener is
/// bound, so a server cannot be restarted after shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal the server to stop accepting and drain
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolve once the shutdown signal has fired
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    // The sender lives as long as the server, so an error means it is gone
    // and there is nothing left to wait for.
    let _ = rx.wait_for(|stopped| *stopped).await;
}

/// Server instance
pub struct TeamServer {
    listen_address: String,
    drain_timeout: Duration,
    shared: Arc<Shared>,
    shutdown: ShutdownHandle,
}

impl TeamServer {
    pub(crate) fn from_parts(listen_address: String, drain_timeout: Duration, shared: Shared) -> Self {
        TeamServer {
            listen_address,
            drain_timeout,
            shared: Arc::new(shared),
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = bind_listener(&self.listen_address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.listen_address.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let address = listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.listen_address.clone());
        info!(address = %address, "Server listening");

        let acceptor = tokio::spawn(accept_connections(
            listener,
            Arc::clone(&self.shared),
            self.shutdown.subscribe(),
            self.drain_timeout,
        ));

        shutdown_signalled(&mut self.shutdown.subscribe()).await;
        info!(address = %address, "Shutdown signal received");

        acceptor.await?;
        info!(address = %address, "Server stopped");
        Ok(())
    }

    /// Install or replace the handler for `endpoint`. Safe to call while the
    /// server is running; requests already dispatched keep their handler.
    pub fn add_endpoint<H: Handler>(&self, endpoint: EndpointId, handler: H) {
        self.shared.registry.insert(endpoint, Arc::new(handler));
    }

    /// Handle used to stop the server from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Fire the shutdown signal
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn listen_address(&self) -> &str {
        &self.listen_address
    }

    pub fn recv_timeout(&self) -> Duration {
        self.shared.recv_timeout
    }

    pub fn send_timeout(&self) -> Duration {
        self.shared.send_timeout
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Registered endpoint identifiers in ascending order
    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.shared.registry.endpoints()
    }
}

/// Resolve `address` and open a listening socket on the first result.
pub async fn bind_listener(address: &str) -> io::Result<TcpListener> {
    let addr = lookup_host(address).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no addresses found for {address}"),
        )
    })?;

    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}

/// Accept connections until shutdown, then close the listener and drain.
async fn accept_connections(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    drain_timeout: Duration,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            () = shutdown_signalled(&mut shutdown) => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");
                    connections.spawn(handle_connection(stream, peer, Arc::clone(&shared)));
                }
                Err(e) => accept_failed(&e).await,
            },

            Some(joined) = connections.join_next() => reap(joined),
        }
    }

    drop(listener);
    drain_connections(connections, drain_timeout).await;
}

async fn accept_failed(e: &io::Error) {
    error!(error = %e, backoff = ?ACCEPT_ERROR_BACKOFF, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn drain_connections(mut connections: JoinSet<()>, drain_timeout: Duration) {
    if connections.is_empty() {
        return;
    }

    info!(in_flight = connections.len(), "Draining connections");
    let drained = tokio::time::timeout(drain_timeout, async {
        while let Some(joined) = connections.join_next().await {
            reap(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = connections.len(),
            "Drain timeout elapsed, aborting connections"
        );
        connections.shutdown().await;
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}
