//! Paced RTP sender
//!
//! Splits a PCM sample stream into fixed-size packets and transmits
//! them on an absolute-deadline schedule: packet `n` is due at
//! `epoch + n * interval`, so scheduling latency never accumulates
//! across a stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::packet::RtpPacket;
use crate::session::StreamSession;
use crate::time::packet_interval;
use crate::transport::{RtpTransport, UdpTransport};
use crate::{
    Error, Result, RtpSsrc, DEFAULT_PAYLOAD_TYPE, DEFAULT_RTP_PORT, DEFAULT_SAMPLES_PER_PACKET,
    DEFAULT_SAMPLE_RATE,
};

/// Configuration for a paced sender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Destination address for the stream
    pub remote_addr: SocketAddr,

    /// Local address to bind the sending socket to
    pub local_addr: SocketAddr,

    /// Audio clock rate in Hz
    pub sample_rate: u32,

    /// Samples carried per packet
    pub samples_per_packet: u32,

    /// RTP payload type
    pub payload_type: u8,

    /// SSRC to use, randomized when not set
    pub ssrc: Option<RtpSsrc>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            remote_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_RTP_PORT)),
            local_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            sample_rate: DEFAULT_SAMPLE_RATE,
            samples_per_packet: DEFAULT_SAMPLES_PER_PACKET,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            ssrc: None,
        }
    }
}

/// Cumulative sender counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Packets handed to the transport successfully
    pub packets_sent: u64,

    /// Payload and header bytes sent
    pub bytes_sent: u64,

    /// Packets the transport failed to send
    pub send_failures: u64,
}

/// Outcome of one `send_stream` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Packets sent during this call
    pub packets_sent: u64,

    /// Bytes sent during this call
    pub bytes_sent: u64,

    /// Send failures during this call
    pub send_failures: u64,

    /// True when shutdown interrupted the stream
    pub cancelled: bool,
}

/// RTP sender with absolute-deadline pacing
///
/// Sequence numbers and timestamps keep advancing across calls, so a
/// stream sent in several `send_stream` batches stays contiguous on
/// the wire.
pub struct PacedSender {
    config: SenderConfig,
    transport: Arc<dyn RtpTransport>,
    session: StreamSession,
    interval: Duration,
    epoch: Option<Instant>,
    packets_emitted: u64,
    stats: SenderStats,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PacedSender {
    /// Create a sender with a freshly bound UDP socket
    pub async fn new(config: SenderConfig) -> Result<Self> {
        let transport = UdpTransport::connect(config.local_addr, config.remote_addr).await?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a sender over an existing transport
    pub fn with_transport(
        config: SenderConfig,
        transport: Arc<dyn RtpTransport>,
    ) -> Result<Self> {
        if config.samples_per_packet == 0 {
            return Err(Error::InvalidParameter(
                "samples_per_packet must be nonzero".to_string(),
            ));
        }
        if config.sample_rate == 0 {
            return Err(Error::InvalidParameter(
                "sample_rate must be nonzero".to_string(),
            ));
        }

        let session = StreamSession::new(config.ssrc, config.payload_type, config.samples_per_packet);
        let interval = packet_interval(config.samples_per_packet, config.sample_rate);

        debug!(
            ssrc = format!("{:08x}", session.ssrc()),
            interval_ms = interval.as_millis() as u64,
            "created sender"
        );

        Ok(Self {
            config,
            transport,
            session,
            interval,
            epoch: None,
            packets_emitted: 0,
            stats: SenderStats::default(),
            shutdown: None,
        })
    }

    /// Install a shutdown signal checked between packets
    pub fn set_shutdown(&mut self, shutdown: watch::Receiver<bool>) {
        self.shutdown = Some(shutdown);
    }

    /// SSRC this sender stamps on outgoing packets
    pub fn ssrc(&self) -> RtpSsrc {
        self.session.ssrc()
    }

    /// Local address of the underlying transport
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Cumulative counters across all calls
    pub fn stats(&self) -> SenderStats {
        self.stats.clone()
    }

    /// Send a sample buffer as a paced packet stream
    ///
    /// The buffer is split into `samples_per_packet` chunks; a short
    /// final chunk is sent as a short packet. Each packet waits for
    /// its absolute deadline before transmission. A failed send is
    /// logged and counted, and the stream continues.
    pub async fn send_stream(&mut self, samples: &[i16]) -> Result<SendReport> {
        let mut report = SendReport::default();

        let epoch = *self.epoch.get_or_insert_with(Instant::now);

        for chunk in samples.chunks(self.config.samples_per_packet as usize) {
            let deadline = epoch + self.interval * self.packets_emitted as u32;

            if let Some(shutdown) = self.shutdown.as_mut() {
                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = shutdown.changed() => {
                        debug!(
                            packets = report.packets_sent,
                            "stream cancelled by shutdown"
                        );
                        report.cancelled = true;
                        return Ok(report);
                    }
                }
            } else {
                sleep_until(deadline).await;
            }

            self.send_chunk(chunk, &mut report).await;
        }

        debug!(
            packets = report.packets_sent,
            bytes = report.bytes_sent,
            failures = report.send_failures,
            "stream sent"
        );
        Ok(report)
    }

    /// Build and transmit one packet, updating counters
    async fn send_chunk(&mut self, chunk: &[i16], report: &mut SendReport) {
        let (seq, ts) = self.session.advance();
        let packet = RtpPacket::from_samples(
            self.config.payload_type,
            seq,
            ts,
            self.session.ssrc(),
            chunk,
        );
        let size = packet.size() as u64;
        self.packets_emitted += 1;

        match self.transport.send_packet(&packet).await {
            Ok(()) => {
                report.packets_sent += 1;
                report.bytes_sent += size;
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += size;
            }
            Err(e) => {
                warn!(seq, error = %e, "failed to send packet");
                report.send_failures += 1;
                self.stats.send_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Transport that records packets instead of sending them
    struct CapturingTransport {
        packets: Mutex<Vec<RtpPacket>>,
    }

    impl CapturingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                packets: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RtpTransport for CapturingTransport {
        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }

        async fn send_packet(&self, packet: &RtpPacket) -> Result<()> {
            self.packets.lock().push(packet.clone());
            Ok(())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl RtpTransport for FailingTransport {
        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }

        async fn send_packet(&self, _packet: &RtpPacket) -> Result<()> {
            Err(crate::Error::SendFailed("wire down".to_string()))
        }
    }

    fn test_config() -> SenderConfig {
        SenderConfig {
            ssrc: Some(0x12345678),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_zero_rate_or_chunk_rejected() {
        let config = SenderConfig {
            samples_per_packet: 0,
            ..test_config()
        };
        let result = PacedSender::with_transport(config, CapturingTransport::new());
        assert!(matches!(result, Err(crate::Error::InvalidParameter(_))));

        let config = SenderConfig {
            sample_rate: 0,
            ..test_config()
        };
        let result = PacedSender::with_transport(config, CapturingTransport::new());
        assert!(matches!(result, Err(crate::Error::InvalidParameter(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunking_and_sequencing() {
        let transport = CapturingTransport::new();
        let mut sender = PacedSender::with_transport(test_config(), transport.clone()).unwrap();

        // 400 samples at 160 per packet: two full packets, one short
        let samples: Vec<i16> = (0..400).map(|n| n as i16).collect();
        let report = sender.send_stream(&samples).await.unwrap();

        assert_eq!(report.packets_sent, 3);
        assert!(!report.cancelled);

        let packets = transport.packets.lock();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].payload.len(), 320);
        assert_eq!(packets[2].payload.len(), 160);

        let base_seq = packets[0].header.sequence_number;
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(
                packet.header.sequence_number,
                base_seq.wrapping_add(i as u16)
            );
            assert_eq!(packet.header.timestamp, i as u32 * 160);
            assert_eq!(packet.header.ssrc, 0x12345678);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequencing_continues_across_calls() {
        let transport = CapturingTransport::new();
        let mut sender = PacedSender::with_transport(test_config(), transport.clone()).unwrap();

        sender.send_stream(&[0i16; 320]).await.unwrap();
        sender.send_stream(&[0i16; 160]).await.unwrap();

        let packets = transport.packets.lock();
        assert_eq!(packets.len(), 3);
        let base_seq = packets[0].header.sequence_number;
        assert_eq!(packets[2].header.sequence_number, base_seq.wrapping_add(2));
        assert_eq!(packets[2].header.timestamp, 320);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_honors_absolute_deadlines() {
        let transport = CapturingTransport::new();
        let mut sender = PacedSender::with_transport(test_config(), transport.clone()).unwrap();

        let start = Instant::now();
        // 100 packets at 20ms each: last deadline is at 1980ms
        let samples = vec![0i16; 160 * 100];
        let report = sender.send_stream(&samples).await.unwrap();

        assert_eq!(report.packets_sent, 100);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1980), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2200), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failures_do_not_stop_stream() {
        let mut sender =
            PacedSender::with_transport(test_config(), Arc::new(FailingTransport)).unwrap();

        let report = sender.send_stream(&[0i16; 480]).await.unwrap();
        assert_eq!(report.packets_sent, 0);
        assert_eq!(report.send_failures, 3);
        assert_eq!(sender.stats().send_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_stream() {
        let transport = CapturingTransport::new();
        let mut sender = PacedSender::with_transport(test_config(), transport.clone()).unwrap();
        let (tx, rx) = watch::channel(false);
        sender.set_shutdown(rx);

        let handle = tokio::spawn(async move {
            let samples = vec![0i16; 160 * 50];
            sender.send_stream(&samples).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(105)).await;
        tx.send(true).unwrap();

        let report = handle.await.unwrap();
        assert!(report.cancelled);
        assert!(report.packets_sent < 50);
        assert!(report.packets_sent >= 5);
    }
}
