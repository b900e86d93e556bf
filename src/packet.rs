//! RTP packet parsing and serialization
//!
//! The codec here is pure and stateless: sequence numbers and
//! timestamps are supplied by the caller (see [`crate::session`]),
//! and decoding never inspects payload content.

use bitvec::prelude::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::Error;
use crate::pcm;
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version (always 2 in practice)
pub const RTP_VERSION: u8 = 2;

/// Fixed RTP header size in bytes (no CSRC list, no extensions)
pub const RTP_HEADER_SIZE: usize = 12;

/// RTP header for the fixed 12-byte profile used by this crate
///
/// Flag bits are parsed and faithfully re-serialized, but the audio
/// profile always emits `0x80` in the first byte (V=2, P=0, X=0, CC=0)
/// and a clear marker bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (should be 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// CSRC count (number of contributing sources)
    pub cc: u8,

    /// Marker bit
    pub marker: bool,

    /// Payload type
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp in sample-clock units
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            cc: 0,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
        }
    }
}

impl RtpHeader {
    /// Create a new RTP header with default flag values
    pub fn new(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
    ) -> Self {
        Self {
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            ..Default::default()
        }
    }

    /// Parse an RTP header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_HEADER_SIZE {
            return Err(Error::PacketTooShort {
                required: RTP_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        // First byte: version (2 bits), padding (1 bit), extension (1 bit), CSRC count (4 bits)
        let first_byte = buf.get_u8();
        let bits = first_byte.view_bits::<Msb0>();

        let version = bits[0..2].load::<u8>();
        if version != RTP_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let padding = bits[2];
        let extension = bits[3];
        let cc = bits[4..8].load::<u8>();

        // Second byte: marker (1 bit), payload type (7 bits)
        let second_byte = buf.get_u8();
        let bits = second_byte.view_bits::<Msb0>();

        let marker = bits[0];
        let payload_type = bits[1..8].load::<u8>();

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        Ok(Self {
            version,
            padding,
            extension,
            cc,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        })
    }

    /// Serialize the header to bytes in network byte order
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(RTP_HEADER_SIZE);

        let mut first_byte = 0u8;
        first_byte |= (self.version & 0x03) << 6;
        if self.padding {
            first_byte |= 1 << 5;
        }
        if self.extension {
            first_byte |= 1 << 4;
        }
        first_byte |= self.cc & 0x0F;
        buf.put_u8(first_byte);

        let mut second_byte = 0u8;
        if self.marker {
            second_byte |= 1 << 7;
        }
        second_byte |= self.payload_type & 0x7F;
        buf.put_u8(second_byte);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }
}

/// RTP packet: fixed header plus raw payload bytes
#[derive(Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// RTP header
    pub header: RtpHeader,

    /// Payload data
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new RTP packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a packet carrying 16-bit little-endian PCM samples
    pub fn from_samples(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
        samples: &[i16],
    ) -> Self {
        let header = RtpHeader::new(payload_type, sequence_number, timestamp, ssrc);
        Self {
            header,
            payload: pcm::samples_to_bytes(samples),
        }
    }

    /// Get the total size of the packet in bytes
    pub fn size(&self) -> usize {
        RTP_HEADER_SIZE + self.payload.len()
    }

    /// Parse an RTP packet from a datagram
    ///
    /// Everything after the 12-byte header is payload; no byte pattern
    /// there is rejected.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let header = RtpHeader::parse(&mut buf)?;
        let payload = Bytes::copy_from_slice(buf);
        Ok(Self { header, payload })
    }

    /// Serialize the packet to bytes
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.serialize(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode the payload as 16-bit little-endian PCM samples
    pub fn samples(&self) -> Result<Vec<i16>> {
        pcm::bytes_to_samples(&self.payload)
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
