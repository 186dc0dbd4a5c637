//! Length-prefixed frame codec.
//!
//! Request (peer → server), big-endian:
//!
//! ```text
//! ┌──────────────┬──────────────────┬─────────────┬──────────────────┐
//! │ u32 name_len │ u8[name_len]     │ u32 pay_len │ u8[pay_len]      │
//! │              │ channel (UTF-8)  │             │ payload          │
//! └──────────────┴──────────────────┴─────────────┴──────────────────┘
//! ```
//!
//! Response (server → peer): `u32 pay_len` followed by the payload.
//!
//! Length prefixes above the configured limit are rejected before any
//! allocation.

use bytes::{BufMut, Bytes, BytesMut};
use simio_common::consts::DEFAULT_MAX_FRAME_LEN;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame decoding/encoding errors. All of them close the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Socket error or truncated read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel-name length prefix above the limit.
    #[error("Channel name length {len} exceeds limit {max}")]
    ChannelNameTooLong {
        /// Announced length
        len: u32,
        /// Configured limit
        max: u32,
    },

    /// Payload length prefix above the limit.
    #[error("Payload length {len} exceeds limit {max}")]
    PayloadTooLarge {
        /// Announced length
        len: u64,
        /// Configured limit
        max: u32,
    },

    /// Channel name bytes are not UTF-8.
    #[error("Channel name is not valid UTF-8: {0}")]
    InvalidChannelName(#[from] FromUtf8Error),
}

/// Upper bounds accepted for length prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum channel-name length in bytes.
    pub max_name_len: u32,
    /// Maximum payload length in bytes.
    pub max_payload_len: u32,
}

impl FrameLimits {
    /// Same bound for names and payloads.
    pub const fn uniform(max_len: u32) -> Self {
        Self {
            max_name_len: max_len,
            max_payload_len: max_len,
        }
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self::uniform(DEFAULT_MAX_FRAME_LEN)
    }
}

/// One decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Target channel, or `/R` for record data.
    pub channel: String,
    /// Peer's input value or record sub-message.
    pub payload: Bytes,
}

/// Read the next request.
///
/// Returns `Ok(None)` if the peer closed the connection between frames.
///
/// # Errors
/// EOF inside a frame, oversized prefixes and invalid names.
pub async fn read_request<R>(reader: &mut R, limits: &FrameLimits) -> Result<Option<RequestFrame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let first = reader.read(&mut prefix).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut prefix[first..]).await?;

    let name_len = u32::from_be_bytes(prefix);
    if name_len > limits.max_name_len {
        return Err(FrameError::ChannelNameTooLong {
            len: name_len,
            max: limits.max_name_len,
        });
    }
    let mut name = vec![0u8; name_len as usize];
    reader.read_exact(&mut name).await?;
    let channel = String::from_utf8(name)?;

    let payload = read_payload(reader, limits).await?;
    Ok(Some(RequestFrame { channel, payload }))
}

/// Read one response (peer side).
///
/// # Errors
/// EOF (including before the prefix) and oversized prefixes.
pub async fn read_response<R>(reader: &mut R, limits: &FrameLimits) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    read_payload(reader, limits).await
}

async fn read_payload<R>(reader: &mut R, limits: &FrameLimits) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > limits.max_payload_len {
        return Err(FrameError::PayloadTooLarge {
            len: u64::from(len),
            max: limits.max_payload_len,
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Write a response frame.
///
/// # Errors
/// Socket errors, or a payload too long for the `u32` prefix.
pub async fn write_response<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        len: payload.len() as u64,
        max: u32::MAX,
    })?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Encode a request frame (peer side).
pub fn encode_request(channel: &str, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + channel.len() + payload.len());
    buf.put_u32(channel.len() as u32);
    buf.put_slice(channel.as_bytes());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}
