//! One-shot request client.
//!
//! Opens a connection, sends a single request frame, and reads the single
//! response frame the server writes before closing.

use crate::codec::{self, CodecError, StatusMessage, TcpHeader};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

/// Client-side request errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Send one request to `address` and wait for its response.
///
/// `timeout` bounds the connect, the send and the receive separately.
pub async fn request(
    address: SocketAddr,
    header: &TcpHeader,
    payload: &[u8],
    timeout: Duration,
) -> Result<StatusMessage, ClientError> {
    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(ClientError::Connect { address, source }),
        Err(_) => return Err(CodecError::Timeout(timeout).into()),
    };

    let metadata = header.encode()?;
    codec::send_transmission(timeout, &mut stream, payload, &metadata).await?;

    let reply = codec::recv_transmission(timeout, &mut stream).await?;
    Ok(StatusMessage::decode(&reply.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_request_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = codec::recv_transmission(Duration::from_secs(1), &mut stream)
                .await
                .unwrap();
            let header = TcpHeader::decode(&request.metadata).unwrap();
            assert_eq!(header.endpoint, 4);
            assert_eq!(header.agent_name, "tester");
            assert_eq!(&request.data[..], b"ping");

            let reply = StatusMessage::ok("pong").encode().unwrap();
            codec::send_transmission(Duration::from_secs(1), &mut stream, &reply, "")
                .await
                .unwrap();
        });

        let header = TcpHeader::new(4).with_agent_name("tester");
        let status = request(addr, &header, b"ping", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(status, StatusMessage::ok("pong"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_connection_refused() {
        // Grab a free port, then close it again
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let result = request(addr, &TcpHeader::new(1), b"", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_request_server_closes_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = codec::recv_transmission(Duration::from_secs(1), &mut stream).await;
        });

        let result = request(addr, &TcpHeader::new(1), b"", Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(ClientError::Codec(CodecError::Malformed(_)))
        ));
    }
}
