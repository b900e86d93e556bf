//! RTP receiver with jitter-buffered playout
//!
//! A single task owns the socket and the jitter buffer: datagrams are
//! parsed and inserted, in-order payloads are drained into a broadcast
//! channel, and the buffer's bounded-wait tick is interleaved with
//! socket reads on the same task. Consumers subscribe for payload
//! batches through [`SampleStream`]; a slow consumer loses the oldest
//! batches rather than stalling the receive loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::buffer::{JitterBuffer, JitterBufferConfig, JitterBufferStats};
use crate::error::Error;
use crate::packet::RtpPacket;
use crate::session::{SessionStats, StreamSession};
use crate::{Result, DEFAULT_MAX_PACKET_SIZE, DEFAULT_RTP_PORT};

/// Default capacity of the payload broadcast channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Floor for the receive-loop tick period
const MIN_TICK_PERIOD: Duration = Duration::from_millis(5);

/// Configuration for a receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Local address to bind the receiving socket to
    pub local_addr: SocketAddr,

    /// Jitter buffer parameters
    pub jitter: JitterBufferConfig,

    /// Broadcast channel capacity; older batches are dropped for slow
    /// consumers once it fills
    pub channel_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            local_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_RTP_PORT)),
            jitter: JitterBufferConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Receiver counters, combined from the socket loop, the jitter
/// buffer, and the per-source session
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    /// Datagrams received on the socket
    pub packets_received: u64,

    /// Datagram bytes received
    pub bytes_received: u64,

    /// Datagrams discarded as unparseable
    pub decode_failures: u64,

    /// Payload batches released to consumers
    pub batches_released: u64,

    /// Jitter buffer counters
    pub jitter: JitterBufferStats,

    /// Arrival classification counters
    pub session: SessionStats,
}

/// Bound RTP receiver, not yet running
pub struct Receiver {
    config: ReceiverConfig,
    socket: UdpSocket,
}

impl Receiver {
    /// Bind the receiving socket
    ///
    /// Binding is the one fatal setup step; everything after it is
    /// per-packet and non-fatal.
    pub async fn bind(config: ReceiverConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.local_addr)
            .await
            .map_err(|e| Error::BindFailed(e.to_string()))?;
        debug!(addr = %config.local_addr, "receiver bound");
        Ok(Self { config, socket })
    }

    /// Actual bound address, useful after binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Spawn the receive loop and return a handle to it
    pub fn start(self) -> ReceiverHandle {
        let (batch_tx, _) = broadcast::channel(self.config.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ReceiverStats::default()));

        let task = tokio::spawn(receive_loop(
            self.socket,
            self.config,
            batch_tx.clone(),
            shutdown_rx,
            stats.clone(),
        ));

        ReceiverHandle {
            batch_tx,
            shutdown: shutdown_tx,
            task,
            stats,
        }
    }
}

/// Handle to a running receiver
pub struct ReceiverHandle {
    batch_tx: broadcast::Sender<Bytes>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<Mutex<ReceiverStats>>,
}

impl ReceiverHandle {
    /// Subscribe to released payload batches
    ///
    /// Each subscriber sees batches released after it subscribed.
    pub fn subscribe(&self) -> SampleStream {
        SampleStream {
            rx: self.batch_tx.subscribe(),
            lagged: 0,
        }
    }

    /// Snapshot of the receiver counters
    pub fn stats(&self) -> ReceiverStats {
        self.stats.lock().clone()
    }

    /// Signal the receive loop to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Ordered stream of released payload batches
///
/// Each batch is the raw PCM payload of one packet. When the consumer
/// falls behind the broadcast channel, the oldest batches are dropped
/// and counted; the stream resumes at the newest available batch.
pub struct SampleStream {
    rx: broadcast::Receiver<Bytes>,
    lagged: u64,
}

impl SampleStream {
    /// Receive the next payload batch
    ///
    /// Returns `None` once the receiver has stopped and all pending
    /// batches are consumed.
    pub async fn next_batch(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.lagged += n;
                    warn!(dropped = n, "consumer lagged, dropping oldest batches");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Batches this consumer has lost to lag
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

/// Tick period: check stalled gaps at twice the rate they expire
fn tick_period(max_wait: Duration) -> Duration {
    (max_wait / 2).max(MIN_TICK_PERIOD)
}

async fn receive_loop(
    socket: UdpSocket,
    config: ReceiverConfig,
    batch_tx: broadcast::Sender<Bytes>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<ReceiverStats>>,
) {
    let mut jitter = JitterBuffer::new(config.jitter.clone());
    let mut session: Option<StreamSession> = None;
    let mut buf = vec![0u8; DEFAULT_MAX_PACKET_SIZE];
    let period = tick_period(config.jitter.max_wait);

    debug!(tick_ms = period.as_millis() as u64, "receive loop started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("receive loop shutting down");
                break;
            }
            result = timeout(period, socket.recv_from(&mut buf)) => {
                match result {
                    Ok(Ok((size, addr))) => {
                        handle_datagram(
                            &buf[..size],
                            addr,
                            &mut jitter,
                            &mut session,
                            &stats,
                        );
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "socket receive error");
                    }
                    // Timeout: nothing arrived this period
                    Err(_) => {}
                }
            }
        }

        // Runs on every iteration, arrival or idle, so a stalled gap
        // is skipped once max_wait elapses even under continuous
        // traffic; the receive timeout only guarantees a tick floor
        jitter.tick();
        drain_ready(&mut jitter, &batch_tx, &stats);
        let mut stats = stats.lock();
        stats.jitter = jitter.stats();
        if let Some(session) = &session {
            stats.session = session.stats();
        }
    }
}

/// Parse and buffer one datagram; malformed input is counted and
/// discarded without disturbing the stream
fn handle_datagram(
    data: &[u8],
    addr: SocketAddr,
    jitter: &mut JitterBuffer,
    session: &mut Option<StreamSession>,
    stats: &Arc<Mutex<ReceiverStats>>,
) {
    {
        let mut stats = stats.lock();
        stats.packets_received += 1;
        stats.bytes_received += data.len() as u64;
    }

    let packet = match RtpPacket::parse(data) {
        Ok(packet) => packet,
        Err(e) => {
            stats.lock().decode_failures += 1;
            debug!(from = %addr, error = %e, "discarding unparseable datagram");
            return;
        }
    };

    let session = session.get_or_insert_with(|| {
        debug!(
            ssrc = format!("{:08x}", packet.header.ssrc),
            from = %addr,
            "locked onto source"
        );
        StreamSession::for_remote(packet.header.ssrc, packet.header.payload_type)
    });

    let seq = packet.header.sequence_number;
    let arrival = session.record_arrival(seq);
    let outcome = jitter.insert(packet);
    trace!(seq, ?arrival, ?outcome, "packet buffered");
}

/// Release contiguous payloads into the broadcast channel
fn drain_ready(
    jitter: &mut JitterBuffer,
    batch_tx: &broadcast::Sender<Bytes>,
    stats: &Arc<Mutex<ReceiverStats>>,
) {
    while let Some(payload) = jitter.pop_ready() {
        stats.lock().batches_released += 1;
        // Err means no subscribers yet; the batch is simply dropped
        let _ = batch_tx.send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_period_bounds() {
        assert_eq!(tick_period(Duration::from_millis(60)), Duration::from_millis(30));
        assert_eq!(tick_period(Duration::ZERO), MIN_TICK_PERIOD);
        assert_eq!(tick_period(Duration::from_millis(4)), MIN_TICK_PERIOD);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ReceiverConfig {
            local_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let receiver = Receiver::bind(config).await.unwrap();
        assert_ne!(receiver.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_sample_stream_skips_lagged_batches() {
        let (tx, rx) = broadcast::channel(2);
        let mut stream = SampleStream { rx, lagged: 0 };

        for i in 0..5u8 {
            tx.send(Bytes::from(vec![i])).unwrap();
        }

        // Capacity 2: only the newest two batches survive the lag
        assert_eq!(stream.next_batch().await, Some(Bytes::from(vec![3])));
        assert_eq!(stream.next_batch().await, Some(Bytes::from(vec![4])));
        assert_eq!(stream.lagged(), 3);

        drop(tx);
        assert_eq!(stream.next_batch().await, None);
    }

    #[tokio::test]
    async fn test_stop_terminates_loop() {
        let config = ReceiverConfig {
            local_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let handle = Receiver::bind(config).await.unwrap().start();
        let mut stream = handle.subscribe();
        handle.stop().await;
        assert_eq!(stream.next_batch().await, None);
    }
}
