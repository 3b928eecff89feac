//! Endpoint handlers and error reporters.
//!
//! A [`Handler`] implements the business logic behind one endpoint. It borrows
//! the connection for the duration of the call only, so it can inspect the
//! peer but can neither keep the stream nor close it.
//!
//! An [`ErrorReporter`] sends a best-effort failure notice when a request
//! cannot be dispatched at all.

use crate::codec::{self, CodecError, EndpointId, StatusMessage, TcpHeader};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::warn;

/// Error type returned by handlers. Its `Display` output becomes the
/// response message.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Success message or failure produced by a handler
pub type HandlerResult = Result<String, BoxError>;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;

pub type ReportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), CodecError>> + Send + 'a>>;

/// Business logic for a single endpoint.
///
/// The same handler instance may run concurrently on many connections.
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        conn: &'a mut TcpStream,
        header: &'a TcpHeader,
        payload: Bytes,
    ) -> HandlerFuture<'a>;
}

/// Handler backed by a closure. Built with [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap a closure as a [`Handler`].
///
/// ```no_run
/// use teamserver::handler_fn;
///
/// let ok = handler_fn(|_conn, _header, _payload| Box::pin(async { Ok("ok".to_string()) }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut TcpStream, &'a TcpHeader, Bytes) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut TcpStream, &'a TcpHeader, Bytes) -> HandlerFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn handle<'a>(
        &'a self,
        conn: &'a mut TcpStream,
        header: &'a TcpHeader,
        payload: Bytes,
    ) -> HandlerFuture<'a> {
        (self.f)(conn, header, payload)
    }
}

/// Sends a failure notice to the client when a request cannot be dispatched.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report<'a>(&'a self, conn: &'a mut TcpStream, message: &'a str) -> ReportFuture<'a>;
}

/// Failure returned by the default fallback handler
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unknown endpoint \"{0}\"")]
pub struct UnknownEndpoint(pub EndpointId);

/// Default fallback handler for endpoints with no registry entry.
///
/// Logs the peer and the requested endpoint, then fails with
/// [`UnknownEndpoint`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InvalidEndpointHandler;

impl Handler for InvalidEndpointHandler {
    fn handle<'a>(
        &'a self,
        conn: &'a mut TcpStream,
        header: &'a TcpHeader,
        _payload: Bytes,
    ) -> HandlerFuture<'a> {
        Box::pin(reject_unknown(conn, header))
    }
}

async fn reject_unknown(conn: &mut TcpStream, header: &TcpHeader) -> HandlerResult {
    match conn.peer_addr() {
        Ok(peer) => warn!(peer = %peer, endpoint = header.endpoint, "Requested invalid endpoint"),
        Err(_) => warn!(endpoint = header.endpoint, "Requested invalid endpoint"),
    }
    Err(UnknownEndpoint(header.endpoint).into())
}

/// Default error reporter: sends an internal-error status carrying `message`.
#[derive(Debug, Clone, Copy)]
pub struct InternalErrorSender {
    timeout: Duration,
}

impl InternalErrorSender {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ErrorReporter for InternalErrorSender {
    fn report<'a>(&'a self, conn: &'a mut TcpStream, message: &'a str) -> ReportFuture<'a> {
        Box::pin(send_internal_error(self.timeout, conn, message))
    }
}

async fn send_internal_error(timeout: Duration, conn: &mut TcpStream, message: &str) -> Result<(), CodecError> {
    let payload = StatusMessage::internal_error(message).encode()?;
    codec::send_transmission(timeout, conn, &payload, "").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[test]
    fn test_unknown_endpoint_message() {
        assert_eq!(UnknownEndpoint(99).to_string(), "unknown endpoint \"99\"");
        assert_eq!(UnknownEndpoint(-1).to_string(), "unknown endpoint \"-1\"");
    }

    #[tokio::test]
    async fn test_invalid_endpoint_handler_fails() {
        let (_client, mut server) = stream_pair().await;
        let header = TcpHeader::new(42);

        let result = InvalidEndpointHandler
            .handle(&mut server, &header, Bytes::new())
            .await;
        assert_eq!(result.unwrap_err().to_string(), "unknown endpoint \"42\"");
    }

    #[tokio::test]
    async fn test_handler_fn_receives_request() {
        let (_client, mut server) = stream_pair().await;
        let handler = handler_fn(|_conn, header, payload| {
            Box::pin(async move {
                Ok(format!(
                    "{}:{}",
                    header.endpoint,
                    String::from_utf8_lossy(&payload)
                ))
            })
        });

        let header = TcpHeader::new(5);
        let result = handler
            .handle(&mut server, &header, Bytes::from_static(b"data"))
            .await;
        assert_eq!(result.unwrap(), "5:data");
    }

    #[tokio::test]
    async fn test_internal_error_sender() {
        let (mut client, mut server) = stream_pair().await;

        InternalErrorSender::new(Duration::from_secs(1))
            .report(&mut server, "")
            .await
            .unwrap();

        let reply = codec::recv_transmission(Duration::from_secs(1), &mut client)
            .await
            .unwrap();
        let status = StatusMessage::decode(&reply.data).unwrap();
        assert_eq!(status, StatusMessage::internal_error(""));
    }
}
