//! Framed transport for requests and responses.
//!
//! Every transmission is a single length-prefixed frame:
//!
//! ```text
//! +-------------------+--------------------+----------+------+
//! | md_len (u32, BE)  | data_len (u64, BE) | metadata | data |
//! +-------------------+--------------------+----------+------+
//! ```
//!
//! Requests carry a JSON [`TcpHeader`] as metadata and an opaque payload as
//! data. Responses carry a JSON [`StatusMessage`] as data.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the fixed frame prefix (metadata length + data length)
pub const FRAME_PREFIX_SIZE: usize = 12;

/// Largest metadata section accepted in a frame
pub const MAX_METADATA_SIZE: usize = 64 * 1024;

/// Largest data section accepted in a frame
pub const MAX_DATA_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Largest step by which a section buffer grows while it is being read
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Requests with less metadata than this carry no usable header
pub const MIN_METADATA_SIZE: usize = 1;

/// Status code for a successfully handled request
pub const STATUS_OK: u16 = 200;

/// Status code for any failure while handling a request
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Integer discriminator selecting which handler processes a request
pub type EndpointId = i32;

/// Transport errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Request header carried in the metadata section of a request frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpHeader {
    /// Name of the agent issuing the request
    #[serde(default)]
    pub agent_name: String,
    /// Endpoint the request is addressed to. Required on the wire.
    pub endpoint: EndpointId,
}

impl TcpHeader {
    pub fn new(endpoint: EndpointId) -> Self {
        Self {
            agent_name: String::new(),
            endpoint,
        }
    }

    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    /// Decode a header from frame metadata
    pub fn decode(metadata: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(metadata)?)
    }

    /// Encode the header as frame metadata
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Status-wrapped response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub code: u16,
    pub message: String,
}

impl StatusMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: STATUS_OK,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: STATUS_INTERNAL_ERROR,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == STATUS_OK
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A single received frame
#[derive(Debug, Clone, Default)]
pub struct Transmission {
    pub metadata: Bytes,
    pub data: Bytes,
}

impl Transmission {
    /// Size of the metadata section in bytes
    pub fn md_size(&self) -> usize {
        self.metadata.len()
    }
}

/// Build a complete frame from its metadata and data sections.
pub fn encode_frame(metadata: &[u8], data: &[u8]) -> Result<BytesMut, CodecError> {
    if metadata.len() > MAX_METADATA_SIZE {
        return Err(CodecError::Malformed(format!(
            "metadata length {} exceeds {MAX_METADATA_SIZE}",
            metadata.len()
        )));
    }
    if data.len() > MAX_DATA_SIZE {
        return Err(CodecError::Malformed(format!(
            "data length {} exceeds {MAX_DATA_SIZE}",
            data.len()
        )));
    }

    let mut frame = BytesMut::with_capacity(FRAME_PREFIX_SIZE + metadata.len() + data.len());
    frame.put_u32(metadata.len() as u32);
    frame.put_u64(data.len() as u64);
    frame.extend_from_slice(metadata);
    frame.extend_from_slice(data);
    Ok(frame)
}

/// Read one frame with no time bound.
pub async fn read_transmission<R>(reader: &mut R) -> Result<Transmission, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    if let Err(e) = reader.read_exact(&mut prefix).await {
        return Err(match e.kind() {
            io::ErrorKind::UnexpectedEof => closed_while_reading("frame prefix"),
            _ => e.into(),
        });
    }

    let mut cursor = &prefix[..];
    let md_len = cursor.get_u32() as usize;
    let data_len = cursor.get_u64();

    if md_len > MAX_METADATA_SIZE {
        return Err(CodecError::Malformed(format!(
            "metadata length {md_len} exceeds {MAX_METADATA_SIZE}"
        )));
    }
    if data_len > MAX_DATA_SIZE as u64 {
        return Err(CodecError::Malformed(format!(
            "data length {data_len} exceeds {MAX_DATA_SIZE}"
        )));
    }

    let mut metadata = BytesMut::new();
    read_section(reader, &mut metadata, md_len, "metadata").await?;
    let mut data = BytesMut::new();
    read_section(reader, &mut data, data_len as usize, "data").await?;

    Ok(Transmission {
        metadata: metadata.freeze(),
        data: data.freeze(),
    })
}

/// Append exactly `len` bytes to `buf`.
///
/// The buffer grows by at most [`READ_CHUNK_SIZE`] at a time as bytes arrive,
/// so a peer that announces a large section and stalls only costs what it
/// has actually sent.
async fn read_section<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    len: usize,
    section: &str,
) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let target = buf.len() + len;
    let mut limited = (&mut *reader).take(len as u64);

    while buf.len() < target {
        if buf.len() == buf.capacity() {
            buf.reserve((target - buf.len()).min(READ_CHUNK_SIZE));
        }
        if limited.read_buf(buf).await? == 0 {
            return Err(closed_while_reading(section));
        }
    }
    Ok(())
}

fn closed_while_reading(section: &str) -> CodecError {
    CodecError::Malformed(format!("connection closed while reading {section}"))
}

/// Read one frame, failing with [`CodecError::Timeout`] if the whole frame
/// does not arrive within `timeout`.
pub async fn recv_transmission<R>(timeout: Duration, reader: &mut R) -> Result<Transmission, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    tokio::time::timeout(timeout, read_transmission(reader))
        .await
        .map_err(|_| CodecError::Timeout(timeout))?
}

/// Write one frame and flush it with no time bound.
pub async fn write_transmission<W>(writer: &mut W, data: &[u8], metadata: &str) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(metadata.as_bytes(), data)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Write one frame, failing with [`CodecError::Timeout`] if it cannot be
/// flushed within `timeout`.
pub async fn send_transmission<W>(
    timeout: Duration,
    writer: &mut W,
    data: &[u8],
    metadata: &str,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    tokio::time::timeout(timeout, write_transmission(writer, data, metadata))
        .await
        .map_err(|_| CodecError::Timeout(timeout))?
}
