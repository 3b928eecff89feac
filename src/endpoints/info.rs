//! Info endpoint: reports the server name and version, plus the local
//! address the request arrived on.

use bytes::Bytes;
use teamserver::{Handler, HandlerFuture, HandlerResult, TcpHeader};
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct Info;

impl Handler for Info {
    fn handle<'a>(
        &'a self,
        conn: &'a mut TcpStream,
        header: &'a TcpHeader,
        _payload: Bytes,
    ) -> HandlerFuture<'a> {
        Box::pin(info(conn, header))
    }
}

async fn info(conn: &mut TcpStream, header: &TcpHeader) -> HandlerResult {
    debug!(agent = %header.agent_name, "Info requested");
    let local = conn.local_addr()?;
    Ok(format!(
        "{} {} ({local})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::testing::stream_pair;

    #[tokio::test]
    async fn test_info() {
        let (_client, mut conn) = stream_pair().await;
        let local = conn.local_addr().unwrap();
        let header = TcpHeader::new(2).with_agent_name("operator");

        let reply = Info.handle(&mut conn, &header, Bytes::new()).await.unwrap();
        assert_eq!(
            reply,
            format!("teamserver {} ({local})", env!("CARGO_PKG_VERSION"))
        );
    }
}
