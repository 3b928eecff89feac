//! teamserver: a minimal concurrent TCP request router
//!
//! Accepts connections, reads one framed request per connection, dispatches
//! it by the integer endpoint carried in the request header, and writes back
//! a status-wrapped response before closing.
//!
//! Features:
//! - Endpoint registry with last-registration-wins semantics, safe to update
//!   while serving
//! - Fallback handler for unknown endpoints
//! - Bounded receive and send on every connection
//! - One-shot configuration settings with defaults
//! - Explicit shutdown with a bounded drain of in-flight connections
//!
//! ```no_run
//! use teamserver::{handler_fn, ServerOption, TeamServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = TeamServer::new(vec![ServerOption::ListenAddress("0.0.0.0:9999".into())])?;
//! server.add_endpoint(1, handler_fn(|_conn, _header, _payload| {
//!     Box::pin(async { Ok("ok".to_string()) })
//! }));
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
mod connection;
pub mod handler;
pub mod registry;
pub mod server;

pub use builder::{BuildError, ServerBuilder, ServerOption};
pub use codec::{CodecError, EndpointId, StatusMessage, TcpHeader};
pub use handler::{
    handler_fn, BoxError, ErrorReporter, Handler, HandlerFuture, HandlerResult, InternalErrorSender,
    InvalidEndpointHandler, ReportFuture, UnknownEndpoint,
};
pub use registry::{EndpointMap, EndpointRegistry};
pub use server::{ServerError, ShutdownHandle, TeamServer};
