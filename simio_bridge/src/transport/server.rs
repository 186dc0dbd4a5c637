//! Transport server: accept loop and per-connection frame exchange.
//!
//! Every accepted connection runs its own task reading one request, sending
//! one response, and repeating. A frame error ends that connection only.
//! Cancelling the shutdown token ends the accept loop and aborts every
//! connection task, including frames in flight.

use bytes::Bytes;
use simio_common::consts::RECORD_CHANNEL;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::frame::{FrameLimits, RequestFrame, read_request, write_response};
use crate::cycle::should_log_occurrence;
use crate::record::RecordCorrelator;
use crate::registry::{ChannelError, ChannelRegistry};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    active_connections: AtomicUsize,
    total_connections: AtomicU64,
    frames_served: AtomicU64,
    size_mismatches: AtomicU64,
}

impl ServerStats {
    /// Connections currently open.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Connections accepted since start.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Request frames answered.
    pub fn frames_served(&self) -> u64 {
        self.frames_served.load(Ordering::Relaxed)
    }

    /// Input copies rejected for a length mismatch.
    pub fn size_mismatches(&self) -> u64 {
        self.size_mismatches.load(Ordering::Relaxed)
    }
}

/// Decrements the active-connection count when the task ends or is aborted.
struct ConnectionGuard(Arc<ServerStats>);

impl ConnectionGuard {
    fn open(stats: Arc<ServerStats>) -> Self {
        stats.active_connections.fetch_add(1, Ordering::Relaxed);
        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        Self(stats)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Frame dispatch shared by all connections.
#[derive(Debug, Clone)]
pub struct Exchange {
    registry: ChannelRegistry,
    correlator: Arc<RecordCorrelator>,
    stats: Arc<ServerStats>,
}

impl Exchange {
    /// Dispatch over `registry` and `correlator`.
    pub fn new(registry: ChannelRegistry, correlator: Arc<RecordCorrelator>) -> Self {
        Self {
            registry,
            correlator,
            stats: Arc::new(ServerStats::default()),
        }
    }

    /// Counters updated by this exchange and its server.
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Answer one request.
    ///
    /// - `/R`: the record correlator's reply.
    /// - otherwise: store the payload as the channel's input (a missing or
    ///   differently sized input is skipped) and reply with the channel's
    ///   output, or an empty payload if none is bound.
    pub fn dispatch(&self, frame: &RequestFrame) -> Bytes {
        self.stats.frames_served.fetch_add(1, Ordering::Relaxed);
        if frame.channel == RECORD_CHANNEL {
            return self.correlator.handle(&frame.payload);
        }

        match self.registry.inputs().copy_in(&frame.channel, &frame.payload) {
            Ok(()) => {}
            Err(e @ ChannelError::NotBound(_)) => trace!("{}", e),
            Err(e @ ChannelError::SizeMismatch { .. }) => {
                let count = self.stats.size_mismatches.fetch_add(1, Ordering::Relaxed) + 1;
                if should_log_occurrence(count) {
                    warn!("Input kept stale: {} (#{} total)", e, count);
                }
            }
        }

        self.registry
            .outputs()
            .copy_out(&frame.channel)
            .unwrap_or_default()
    }
}

/// Listening endpoint for simulation peers.
pub struct TransportServer {
    listener: TcpListener,
    exchange: Exchange,
    limits: FrameLimits,
    shutdown: CancellationToken,
}

impl TransportServer {
    /// Bind the listening socket.
    ///
    /// # Errors
    /// Returns the bind error.
    pub async fn bind(addr: SocketAddr, exchange: Exchange, limits: FrameLimits) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Transport server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            exchange,
            limits,
            shutdown: CancellationToken::new(),
        })
    }

    /// Bound address (resolves port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Server counters.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(self.exchange.stats())
    }

    /// Accept connections until the shutdown token is cancelled.
    pub async fn run(self) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let exchange = self.exchange.clone();
                        let limits = self.limits;
                        let token = self.shutdown.child_token();
                        connections.spawn(async move {
                            handle_connection(stream, peer, exchange, limits, token).await;
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Connection task panicked: {}", e);
                        }
                    }
                }
            }
        }

        info!(
            "Transport server shutting down, closing {} connection(s)",
            connections.len()
        );
        connections.shutdown().await;
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    exchange: Exchange,
    limits: FrameLimits,
    token: CancellationToken,
) {
    let _guard = ConnectionGuard::open(Arc::clone(exchange.stats()));
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed for {}: {}", peer, e);
    }
    info!("Peer connected: {}", peer);

    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = read_request(&mut reader, &limits) => next,
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Peer disconnected: {}", peer);
                break;
            }
            Err(e) => {
                warn!("Closing connection {}: {}", peer, e);
                break;
            }
        };

        let reply = exchange.dispatch(&frame);
        trace!(
            "{} '{}': {} bytes in, {} bytes out",
            peer,
            frame.channel,
            frame.payload.len(),
            reply.len()
        );
        if let Err(e) = write_response(&mut writer, &reply).await {
            warn!("Closing connection {}: {}", peer, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simio_common::consts::RECORD_FALLBACK_STATUS;

    fn frame(channel: &str, payload: &[u8]) -> RequestFrame {
        RequestFrame {
            channel: channel.to_string(),
            payload: Bytes::copy_from_slice(payload),
        }
    }

    fn exchange() -> (Exchange, ChannelRegistry) {
        let registry = ChannelRegistry::new();
        let exchange = Exchange::new(registry.clone(), Arc::new(RecordCorrelator::new(4)));
        (exchange, registry)
    }

    #[test]
    fn copies_input_and_returns_output() {
        let (exchange, registry) = exchange();
        registry.bind_input("valve", 2);
        registry.bind_output("valve", 1).copy_in(&[5]).unwrap();

        let reply = exchange.dispatch(&frame("valve", &[1, 2]));
        assert_eq!(reply.as_ref(), &[5]);
        assert_eq!(registry.inputs().copy_out("valve").unwrap().as_ref(), &[1, 2]);
    }

    #[test]
    fn unknown_channel_gets_empty_reply() {
        let (exchange, _registry) = exchange();
        assert!(exchange.dispatch(&frame("nobody", &[1])).is_empty());
    }

    #[test]
    fn size_mismatch_is_counted_and_tolerated() {
        let (exchange, registry) = exchange();
        registry.bind_input("valve", 2).copy_in(&[3, 4]).unwrap();
        registry.bind_output("valve", 1);

        let reply = exchange.dispatch(&frame("valve", &[9]));
        assert_eq!(reply.as_ref(), &[0]);
        assert_eq!(registry.inputs().copy_out("valve").unwrap().as_ref(), &[3, 4]);
        assert_eq!(exchange.stats().size_mismatches(), 1);
    }

    #[test]
    fn record_channel_goes_to_correlator() {
        let (exchange, _registry) = exchange();
        let reply = exchange.dispatch(&frame(RECORD_CHANNEL, &[0xFF]));
        assert_eq!(reply.as_ref(), &[RECORD_FALLBACK_STATUS]);
        assert_eq!(exchange.stats().frames_served(), 1);
    }
}
