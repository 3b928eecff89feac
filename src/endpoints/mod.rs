//! Built-in endpoints served by the teamserver binary.
//!
//! - `ping` (0): liveness check, answers `pong`
//! - `echo` (1): returns the request payload as text
//! - `info` (2): server name and version

pub mod echo;
pub mod info;
pub mod ping;

use std::sync::Arc;
use teamserver::{EndpointId, EndpointMap, Handler};

pub const PING: EndpointId = 0;
pub const ECHO: EndpointId = 1;
pub const INFO: EndpointId = 2;

/// Dispatch table with every built-in endpoint
pub fn builtin() -> EndpointMap {
    let mut endpoints = EndpointMap::new();
    endpoints.insert(PING, Arc::new(ping::Ping) as Arc<dyn Handler>);
    endpoints.insert(ECHO, Arc::new(echo::Echo) as Arc<dyn Handler>);
    endpoints.insert(INFO, Arc::new(info::Info) as Arc<dyn Handler>);
    endpoints
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::net::{TcpListener, TcpStream};

    /// A connected client/server stream pair on loopback
    pub async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }
}
