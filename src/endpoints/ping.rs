//! Ping endpoint.
//!
//! A minimal endpoint for health checks and latency measurement:
//! - Empty payload: responds `pong`
//! - Payload `hello`: responds `pong hello`

use bytes::Bytes;
use teamserver::{Handler, HandlerFuture, HandlerResult, TcpHeader};
use tokio::net::TcpStream;

/// Longest payload echoed back after `pong`
const MAX_PING_MESSAGE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct Ping;

impl Handler for Ping {
    fn handle<'a>(
        &'a self,
        _conn: &'a mut TcpStream,
        _header: &'a TcpHeader,
        payload: Bytes,
    ) -> HandlerFuture<'a> {
        Box::pin(pong(payload))
    }
}

async fn pong(payload: Bytes) -> HandlerResult {
    if payload.is_empty() {
        return Ok("pong".to_string());
    }
    if payload.len() > MAX_PING_MESSAGE {
        return Err(format!("ping message exceeds {MAX_PING_MESSAGE} bytes").into());
    }
    Ok(format!("pong {}", String::from_utf8_lossy(&payload).trim_end()))
}
