//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use teamserver::server::bind_listener;
use teamserver::{client, handler_fn, Handler, ServerError, ServerOption, StatusMessage, TcpHeader, TeamServer};
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A server running on an ephemeral loopback port
pub struct TestServer {
    pub server: Arc<TeamServer>,
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub async fn spawn(options: Vec<ServerOption>) -> Self {
        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(TeamServer::new(options).unwrap());

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        TestServer { server, addr, task }
    }

    pub async fn request(&self, endpoint: i32, payload: &[u8]) -> StatusMessage {
        client::request(self.addr, &TcpHeader::new(endpoint), payload, TIMEOUT)
            .await
            .unwrap()
    }

    /// Fire the shutdown signal and wait for `serve` to return
    pub async fn stop(self) {
        self.server.shutdown();
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Handler that always answers with `message`
pub fn reply(message: &'static str) -> impl Handler {
    handler_fn(move |_conn, _header, _payload| Box::pin(async move { Ok(message.to_string()) }))
}
