//! Peer-side client: the simulation end of a transport connection.

use bytes::Bytes;
use simio_common::consts::RECORD_CHANNEL;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use super::frame::{FrameError, FrameLimits, encode_request, read_response};

/// One connection to a [`super::TransportServer`].
#[derive(Debug)]
pub struct PeerClient {
    stream: TcpStream,
    limits: FrameLimits,
}

impl PeerClient {
    /// Connect to `addr`.
    ///
    /// # Errors
    /// Connection errors.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, FrameError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            limits: FrameLimits::default(),
        })
    }

    /// Send `payload` as the input of `channel` and return its output.
    ///
    /// # Errors
    /// Socket errors and malformed responses.
    pub async fn exchange(&mut self, channel: &str, payload: &[u8]) -> Result<Bytes, FrameError> {
        self.stream.write_all(&encode_request(channel, payload)).await?;
        read_response(&mut self.stream, &self.limits).await
    }

    /// Send a record sub-message and return the raw reply.
    ///
    /// # Errors
    /// Same as [`exchange`](Self::exchange).
    pub async fn record(&mut self, payload: &[u8]) -> Result<Bytes, FrameError> {
        self.exchange(RECORD_CHANNEL, payload).await
    }

    /// Write raw bytes without waiting for a response.
    ///
    /// # Errors
    /// Socket errors.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Read one response frame.
    ///
    /// # Errors
    /// Socket errors, including EOF.
    pub async fn read_reply(&mut self) -> Result<Bytes, FrameError> {
        read_response(&mut self.stream, &self.limits).await
    }
}
