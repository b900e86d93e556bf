//! RTP transport core for PCM audio streaming
//!
//! This crate provides the transport half of a minimal audio streaming
//! pair: RTP packet encoding/decoding, a paced UDP sender, and a
//! jitter-buffered UDP receiver that hands reordered payloads to a
//! consumer in sequence order.
//!
//! The library is organized into several modules:
//!
//! - `packet`: RTP packet definition, parsing and serialization
//! - `pcm`: 16-bit PCM payload conversion helpers
//! - `session`: per-stream sequence/timestamp state and counters
//! - `buffer`: windowed jitter buffer for reordering and loss handling
//! - `transport`: network transport abstraction over UDP
//! - `sender`: paced packetizer with an absolute send schedule
//! - `receiver`: socket read loop feeding the jitter buffer
//! - `source`: synthetic tone generation for demos and tests
//! - `time`: sequence/timestamp wraparound arithmetic

mod error;

// Main modules
pub mod buffer;
pub mod packet;
pub mod pcm;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod source;
pub mod time;
pub mod transport;

// Re-export core types
pub use error::Error;

pub use buffer::{InsertOutcome, JitterBuffer, JitterBufferConfig, JitterBufferStats};
pub use packet::{RtpHeader, RtpPacket};
pub use receiver::{Receiver, ReceiverConfig, ReceiverHandle, ReceiverStats, SampleStream};
pub use sender::{PacedSender, SendReport, SenderConfig, SenderStats};
pub use session::{Arrival, SessionStats, StreamSession};
pub use transport::{RtpTransport, UdpTransport};

/// The default maximum size for RTP packets in bytes
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1500;

/// Default UDP port for an RTP audio stream
pub const DEFAULT_RTP_PORT: u16 = 5004;

/// Default dynamic payload type for raw PCM audio
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// Default sample clock rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Default samples per packet (20ms at 8kHz)
pub const DEFAULT_SAMPLES_PER_PACKET: u32 = 160;

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Result type for RTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        Error, JitterBuffer, JitterBufferConfig, PacedSender, Receiver, ReceiverConfig,
        Result, RtpHeader, RtpPacket, RtpSequenceNumber, RtpSsrc, RtpTimestamp, SenderConfig,
        StreamSession,
    };
}
