//! Per-connection request lifecycle.
//!
//! One connection carries exactly one exchange: read a framed request, decode
//! its header, dispatch to the endpoint handler, send back a status-wrapped
//! response. The stream is owned by this function and dropped on every exit
//! path, which closes the connection. No step is retried and no failure
//! escapes the connection's task.

use crate::codec::{self, StatusMessage, TcpHeader, MIN_METADATA_SIZE};
use crate::server::Shared;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, error, trace, warn};

pub(crate) async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    // Read the request
    let transmission = match codec::recv_transmission(shared.recv_timeout, &mut stream).await {
        Ok(transmission) => transmission,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Error reading request");
            return;
        }
    };

    if transmission.md_size() < MIN_METADATA_SIZE {
        debug!(peer = %peer, "Request carried no metadata");
        report_internal_error(&mut stream, peer, &shared).await;
        return;
    }

    let header = match TcpHeader::decode(&transmission.metadata) {
        Ok(header) => header,
        Err(e) => {
            debug!(peer = %peer, error = %e, "Failed to decode request header");
            report_internal_error(&mut stream, peer, &shared).await;
            return;
        }
    };

    debug!(peer = %peer, endpoint = header.endpoint, "Dispatching request");

    let handler = shared
        .registry
        .resolve(header.endpoint)
        .unwrap_or_else(|| Arc::clone(&shared.invalid_endpoint_handler));

    let response = match handler.handle(&mut stream, &header, transmission.data).await {
        Ok(message) => StatusMessage::ok(message),
        Err(e) => StatusMessage::internal_error(e.to_string()),
    };
    trace!(peer = %peer, code = response.code, "Handler finished");

    let payload = match response.encode() {
        Ok(payload) => payload,
        Err(e) => {
            error!(peer = %peer, error = %e, "Error encoding response");
            return;
        }
    };

    if let Err(e) = codec::send_transmission(shared.send_timeout, &mut stream, &payload, "").await {
        warn!(peer = %peer, error = %e, "Error sending response");
    }
}

async fn report_internal_error(stream: &mut TcpStream, peer: SocketAddr, shared: &Shared) {
    if let Err(e) = shared.internal_error_reporter.report(stream, "").await {
        warn!(peer = %peer, error = %e, "Error reporting internal error");
    }
}
