//! Echo endpoint.
//!
//! Returns the request payload as the response message. Useful for
//! throughput testing and for checking that payloads arrive intact.
//! The payload must be valid UTF-8 since responses carry text.

use bytes::Bytes;
use teamserver::{Handler, HandlerFuture, HandlerResult, TcpHeader};
use tokio::net::TcpStream;

#[derive(Debug, Clone, Copy)]
pub struct Echo;

impl Handler for Echo {
    fn handle<'a>(
        &'a self,
        _conn: &'a mut TcpStream,
        _header: &'a TcpHeader,
        payload: Bytes,
    ) -> HandlerFuture<'a> {
        Box::pin(echo(payload))
    }
}

async fn echo(payload: Bytes) -> HandlerResult {
    let text = std::str::from_utf8(&payload)?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::testing::stream_pair;

    #[tokio::test]
    async fn test_echo() {
        let (_client, mut conn) = stream_pair().await;
        let header = TcpHeader::new(1);

        let reply = Echo
            .handle(&mut conn, &header, Bytes::from_static(b"hello world"))
            .await
            .unwrap();
        assert_eq!(reply, "hello world");

        let reply = Echo.handle(&mut conn, &header, Bytes::new()).await.unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn test_echo_rejects_binary() {
        let (_client, mut conn) = stream_pair().await;
        let header = TcpHeader::new(1);

        let result = Echo
            .handle(&mut conn, &header, Bytes::from_static(&[0xff, 0xfe, 0x00]))
            .await;
        assert!(result.is_err());
    }
}
