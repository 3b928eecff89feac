//! Server construction.
//!
//! A [`ServerBuilder`] stages settings one field at a time. Apart from the
//! listen address, every field may be set once; setting it again is an error
//! rather than an overwrite. `build`
//! fills in defaults for whatever was left unset and freezes the result into
//! a [`TeamServer`].
//!
//! The same settings can be passed as an ordered list of [`ServerOption`]s to
//! [`TeamServer::new`], which stops at the first failing option.

use crate::handler::{ErrorReporter, Handler, InternalErrorSender, InvalidEndpointHandler};
use crate::registry::{EndpointMap, EndpointRegistry};
use crate::server::{Shared, TeamServer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default address the server listens on
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";

/// Default bound on reading a request
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(15);

/// Default bound on writing a response
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time in-flight connections get to finish after shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("endpoint map already set")]
    EndpointsAlreadySet,

    #[error("can only set one invalid endpoint handler")]
    InvalidEndpointHandlerAlreadySet,

    #[error("can only set one internal error reporter")]
    ErrorReporterAlreadySet,

    #[error("listen address cannot be an empty string")]
    EmptyListenAddress,

    #[error("recv timeout already set")]
    RecvTimeoutAlreadySet,

    #[error("send timeout already set")]
    SendTimeoutAlreadySet,

    #[error("drain timeout already set")]
    DrainTimeoutAlreadySet,
}

/// A single server setting
pub enum ServerOption {
    Endpoints(EndpointMap),
    InvalidEndpointHandler(Arc<dyn Handler>),
    InternalErrorReporter(Arc<dyn ErrorReporter>),
    ListenAddress(String),
    RecvTimeout(Duration),
    SendTimeout(Duration),
    DrainTimeout(Duration),
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerOption::Endpoints(map) => f.debug_tuple("Endpoints").field(&map.len()).finish(),
            ServerOption::InvalidEndpointHandler(_) => f.write_str("InvalidEndpointHandler"),
            ServerOption::InternalErrorReporter(_) => f.write_str("InternalErrorReporter"),
            ServerOption::ListenAddress(addr) => f.debug_tuple("ListenAddress").field(addr).finish(),
            ServerOption::RecvTimeout(d) => f.debug_tuple("RecvTimeout").field(d).finish(),
            ServerOption::SendTimeout(d) => f.debug_tuple("SendTimeout").field(d).finish(),
            ServerOption::DrainTimeout(d) => f.debug_tuple("DrainTimeout").field(d).finish(),
        }
    }
}

/// Staging area for a [`TeamServer`].
///
/// Timeouts use zero to mean "unset", so setting a timeout to zero leaves it
/// open for a later setting and resolves to the default at build time.
#[derive(Default)]
pub struct ServerBuilder {
    endpoints: Option<EndpointMap>,
    invalid_endpoint_handler: Option<Arc<dyn Handler>>,
    internal_error_reporter: Option<Arc<dyn ErrorReporter>>,
    listen_address: Option<String>,
    recv_timeout: Duration,
    send_timeout: Duration,
    drain_timeout: Duration,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the initial dispatch table
    pub fn endpoints(mut self, endpoints: EndpointMap) -> Result<Self, BuildError> {
        if self.endpoints.is_some() {
            return Err(BuildError::EndpointsAlreadySet);
        }
        self.endpoints = Some(endpoints);
        Ok(self)
    }

    /// Install the handler used when no registry entry matches
    pub fn invalid_endpoint_handler(mut self, handler: Arc<dyn Handler>) -> Result<Self, BuildError> {
        if self.invalid_endpoint_handler.is_some() {
            return Err(BuildError::InvalidEndpointHandlerAlreadySet);
        }
        self.invalid_endpoint_handler = Some(handler);
        Ok(self)
    }

    /// Install the reporter used when a request has no usable header
    pub fn internal_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Result<Self, BuildError> {
        if self.internal_error_reporter.is_some() {
            return Err(BuildError::ErrorReporterAlreadySet);
        }
        self.internal_error_reporter = Some(reporter);
        Ok(self)
    }

    /// Override the bind address. Surrounding whitespace is trimmed and the
    /// last valid address wins.
    pub fn listen_address(mut self, address: impl AsRef<str>) -> Result<Self, BuildError> {
        let address = address.as_ref().trim();
        if address.is_empty() {
            return Err(BuildError::EmptyListenAddress);
        }
        self.listen_address = Some(address.to_string());
        Ok(self)
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Result<Self, BuildError> {
        if !self.recv_timeout.is_zero() {
            return Err(BuildError::RecvTimeoutAlreadySet);
        }
        self.recv_timeout = timeout;
        Ok(self)
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Result<Self, BuildError> {
        if !self.send_timeout.is_zero() {
            return Err(BuildError::SendTimeoutAlreadySet);
        }
        self.send_timeout = timeout;
        Ok(self)
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Result<Self, BuildError> {
        if !self.drain_timeout.is_zero() {
            return Err(BuildError::DrainTimeoutAlreadySet);
        }
        self.drain_timeout = timeout;
        Ok(self)
    }

    /// Apply one setting
    pub fn apply(self, option: ServerOption) -> Result<Self, BuildError> {
        match option {
            ServerOption::Endpoints(map) => self.endpoints(map),
            ServerOption::InvalidEndpointHandler(handler) => self.invalid_endpoint_handler(handler),
            ServerOption::InternalErrorReporter(reporter) => self.internal_error_reporter(reporter),
            ServerOption::ListenAddress(address) => self.listen_address(address),
            ServerOption::RecvTimeout(timeout) => self.recv_timeout(timeout),
            ServerOption::SendTimeout(timeout) => self.send_timeout(timeout),
            ServerOption::DrainTimeout(timeout) => self.drain_timeout(timeout),
        }
    }

    /// Fill in defaults and freeze the settings into a server.
    pub fn build(self) -> TeamServer {
        let recv_timeout = or_default(self.recv_timeout, DEFAULT_RECV_TIMEOUT);
        let send_timeout = or_default(self.send_timeout, DEFAULT_SEND_TIMEOUT);

        let shared = Shared {
            registry: EndpointRegistry::from_map(self.endpoints.unwrap_or_default()),
            invalid_endpoint_handler: self
                .invalid_endpoint_handler
                .unwrap_or_else(|| Arc::new(InvalidEndpointHandler) as Arc<dyn Handler>),
            internal_error_reporter: self
                .internal_error_reporter
                .unwrap_or_else(|| {
                    Arc::new(InternalErrorSender::new(send_timeout)) as Arc<dyn ErrorReporter>
                }),
            recv_timeout,
            send_timeout,
        };

        TeamServer::from_parts(
            self.listen_address
                .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            or_default(self.drain_timeout, DEFAULT_DRAIN_TIMEOUT),
            shared,
        )
    }
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

impl TeamServer {
    /// Build a server from an ordered list of settings.
    ///
    /// Fails on the first setting that targets an already-set field or is
    /// otherwise invalid; no server is produced in that case.
    pub fn new<I>(options: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = ServerOption>,
    {
        options
            .into_iter()
            .try_fold(ServerBuilder::new(), ServerBuilder::apply)
            .map(ServerBuilder::build)
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}
