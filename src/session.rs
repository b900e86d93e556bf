//! Per-stream session state
//!
//! A [`StreamSession`] owns the mutable counters of one RTP stream: on
//! the send side the next sequence number and timestamp, on the receive
//! side the highest/expected sequence and derived loss counters. The
//! packet codec itself stays pure; all advancement happens here.

use std::collections::BTreeSet;

use rand::Rng;
use tracing::trace;

use crate::time::seq_diff;
use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// Classification of a received sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// First packet of the stream, establishes the sequence base
    First,
    /// Next expected packet
    Sequential,
    /// Packet ahead of the expected one; `lost` packets are missing in between
    Gap { lost: u16 },
    /// Sequence number seen before
    Duplicate,
    /// Late packet that fills in behind the highest sequence seen
    Reordered,
}

/// Snapshot of session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Total packets recorded as received
    pub packets_received: u64,

    /// Packets missing based on sequence gaps (late arrivals refill)
    pub packets_lost: u64,

    /// Duplicate packets received
    pub packets_duplicated: u64,

    /// Out-of-order packets received
    pub packets_out_of_order: u64,

    /// Highest sequence number seen so far
    pub highest_seq: Option<RtpSequenceNumber>,

    /// Next sequence number expected
    pub expected_seq: Option<RtpSequenceNumber>,
}

/// Mutable state for one RTP stream
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// Synchronization source, constant for the session
    ssrc: RtpSsrc,

    /// Payload type carried by the stream
    payload_type: u8,

    /// Sequence number for the next outgoing packet
    next_sequence: RtpSequenceNumber,

    /// Timestamp for the next outgoing packet
    next_timestamp: RtpTimestamp,

    /// Timestamp advance per packet (samples per packet)
    timestamp_increment: u32,

    /// Receive-side counters
    stats: SessionStats,

    /// Gap sequences still counted as lost; a late arrival refills its
    /// entry once, further copies are duplicates
    missing: BTreeSet<RtpSequenceNumber>,
}

impl StreamSession {
    /// Create a send-side session
    ///
    /// SSRC and the initial sequence number are randomized when not
    /// supplied, per RFC 3550.
    pub fn new(ssrc: Option<RtpSsrc>, payload_type: u8, samples_per_packet: u32) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            ssrc: ssrc.unwrap_or_else(|| rng.gen()),
            payload_type,
            next_sequence: rng.gen(),
            next_timestamp: 0,
            timestamp_increment: samples_per_packet,
            stats: SessionStats::default(),
            missing: BTreeSet::new(),
        }
    }

    /// Create a receive-side session for a remote source
    pub fn for_remote(ssrc: RtpSsrc, payload_type: u8) -> Self {
        Self {
            ssrc,
            payload_type,
            next_sequence: 0,
            next_timestamp: 0,
            timestamp_increment: 0,
            stats: SessionStats::default(),
            missing: BTreeSet::new(),
        }
    }

    /// SSRC of this stream
    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    /// Payload type of this stream
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Sequence number the next outgoing packet will carry
    pub fn next_sequence(&self) -> RtpSequenceNumber {
        self.next_sequence
    }

    /// Timestamp the next outgoing packet will carry
    pub fn next_timestamp(&self) -> RtpTimestamp {
        self.next_timestamp
    }

    /// Take the sequence/timestamp pair for one outgoing packet
    ///
    /// Advances the sequence by one (mod 65536) and the timestamp by
    /// the samples-per-packet increment (mod 2^32).
    pub fn advance(&mut self) -> (RtpSequenceNumber, RtpTimestamp) {
        let ids = (self.next_sequence, self.next_timestamp);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.next_timestamp = self.next_timestamp.wrapping_add(self.timestamp_increment);
        ids
    }

    /// Record an incoming sequence number and classify the arrival
    pub fn record_arrival(&mut self, seq: RtpSequenceNumber) -> Arrival {
        let expected = match self.stats.expected_seq {
            None => {
                self.stats.packets_received += 1;
                self.stats.highest_seq = Some(seq);
                self.stats.expected_seq = Some(seq.wrapping_add(1));
                return Arrival::First;
            }
            Some(expected) => expected,
        };

        let diff = seq_diff(seq, expected);

        if diff == 0 {
            self.stats.packets_received += 1;
            self.stats.highest_seq = Some(seq);
            self.stats.expected_seq = Some(seq.wrapping_add(1));
            Arrival::Sequential
        } else if diff > 0 {
            // Packets between expected and seq are missing, at least for now
            let lost = diff as u16;
            let mut gap = expected;
            while gap != seq {
                self.missing.insert(gap);
                gap = gap.wrapping_add(1);
            }
            self.stats.packets_received += 1;
            self.stats.packets_lost += lost as u64;
            self.stats.highest_seq = Some(seq);
            self.stats.expected_seq = Some(seq.wrapping_add(1));
            trace!(seq, lost, "sequence gap");
            Arrival::Gap { lost }
        } else if self.missing.remove(&seq) {
            // Late arrival refills a gap counted as lost earlier;
            // removing its entry means a second copy counts as duplicate
            self.stats.packets_received += 1;
            self.stats.packets_out_of_order += 1;
            self.stats.packets_lost = self.stats.packets_lost.saturating_sub(1);
            Arrival::Reordered
        } else {
            self.stats.packets_duplicated += 1;
            Arrival::Duplicate
        }
    }

    /// Snapshot of the receive-side counters
    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }
}
