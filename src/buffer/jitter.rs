//! Windowed jitter buffer for RTP packet reordering
//!
//! Incoming packets land in a bounded window of `W` sequence slots
//! starting at the playout cursor. Packets behind the cursor are
//! dropped as stale, duplicates are dropped, and packets beyond the
//! window force the cursor forward, counting everything it skips as
//! lost. After each insert the owner drains [`JitterBuffer::pop_ready`]
//! to release contiguous payloads in sequence order; a persistent gap
//! is skipped by [`JitterBuffer::tick`] once it has blocked playout for
//! longer than `max_wait`.
//!
//! Larger `W` and `max_wait` tolerate more reordering and loss at the
//! cost of added delay.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::packet::RtpPacket;
use crate::time::seq_diff;
use crate::RtpSequenceNumber;

/// Default window size in sequence slots
pub const DEFAULT_WINDOW: u16 = 16;

/// Default bounded wait before a missing packet is skipped
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(60);

/// Extended-sequence base; keeps cursor arithmetic clear of underflow
const EXT_BASE: u64 = 1 << 32;

/// Jitter buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterBufferConfig {
    /// Window size `W` in sequence slots (useful range 8-32)
    pub window: u16,

    /// How long playout may stall on a missing packet before skipping it
    pub max_wait: Duration,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Outcome of inserting one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored in its window slot
    Inserted,
    /// Behind the playout cursor, dropped
    Stale,
    /// Slot already occupied, dropped
    Duplicate,
    /// Beyond the window; playout jumped forward over `skipped` sequences
    WindowAdvanced { skipped: u16 },
}

/// Statistics for the jitter buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStats {
    /// Packets offered to the buffer
    pub packets_received: u64,

    /// Payloads released to the consumer in order
    pub packets_released: u64,

    /// Packets dropped for arriving behind the playout cursor
    pub late_drops: u64,

    /// Packets dropped as duplicates of a buffered slot
    pub duplicates: u64,

    /// Sequences playout skipped without releasing (loss)
    pub packets_lost: u64,

    /// Packets currently buffered
    pub buffered: usize,
}

/// Reorder buffer with a bounded sequence window
///
/// Owned exclusively by the receive loop; a single writer mutates it,
/// so no locking is involved. Loss and reordering are not errors here,
/// only counted events.
pub struct JitterBuffer {
    config: JitterBufferConfig,

    /// Pending payloads keyed by extended (unwrapped) sequence
    slots: BTreeMap<u64, Bytes>,

    /// Extended sequence of the next payload to release
    playout: Option<u64>,

    /// When the current head-of-line gap started blocking playout
    gap_since: Option<Instant>,

    stats: JitterBufferStats,
}

impl JitterBuffer {
    /// Create a new jitter buffer
    pub fn new(config: JitterBufferConfig) -> Self {
        let config = JitterBufferConfig {
            window: config.window.max(1),
            ..config
        };
        Self {
            config,
            slots: BTreeMap::new(),
            playout: None,
            gap_since: None,
            stats: JitterBufferStats::default(),
        }
    }

    /// Sequence number the buffer will release next
    pub fn playout_sequence(&self) -> Option<RtpSequenceNumber> {
        self.playout.map(|p| (p & 0xFFFF) as u16)
    }

    /// Number of packets currently buffered
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the buffer holds no pending packets
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert one packet, classifying it against the playout window
    ///
    /// The caller drains [`Self::pop_ready`] afterwards to release any
    /// now-contiguous payloads.
    pub fn insert(&mut self, packet: RtpPacket) -> InsertOutcome {
        let seq = packet.header.sequence_number;
        self.stats.packets_received += 1;

        let playout = match self.playout {
            None => {
                // First packet establishes the cursor at its own sequence
                let ext = EXT_BASE + seq as u64;
                self.playout = Some(ext);
                self.slots.insert(ext, packet.payload);
                self.stats.buffered = self.slots.len();
                return InsertOutcome::Inserted;
            }
            Some(playout) => playout,
        };

        let d = seq_diff(seq, (playout & 0xFFFF) as u16) as i64;

        if d < 0 {
            self.stats.late_drops += 1;
            trace!(seq, "dropping stale packet behind playout");
            return InsertOutcome::Stale;
        }

        let ext = (playout as i64 + d) as u64;
        if self.slots.contains_key(&ext) {
            self.stats.duplicates += 1;
            trace!(seq, "dropping duplicate packet");
            return InsertOutcome::Duplicate;
        }

        let window = self.config.window as i64;
        if d < window {
            self.slots.insert(ext, packet.payload);
            self.stats.buffered = self.slots.len();
            return InsertOutcome::Inserted;
        }

        // Beyond the window: a loss burst or reordering past tolerance.
        // Jump the cursor so the new packet lands in the last slot,
        // flushing anything that falls out of the window.
        let new_playout = ext - window as u64 + 1;
        let skipped = (new_playout - playout) as u16;
        self.slots = self.slots.split_off(&new_playout);
        self.stats.packets_lost += skipped as u64;
        self.playout = Some(new_playout);
        self.gap_since = None;
        debug!(seq, skipped, "window advance past loss burst");

        self.slots.insert(ext, packet.payload);
        self.stats.buffered = self.slots.len();
        InsertOutcome::WindowAdvanced { skipped }
    }

    /// Release the payload at the playout cursor, if present
    ///
    /// Call repeatedly until `None`: each call releases one in-order
    /// payload and advances the cursor. A gap stops the release loop
    /// and starts the bounded wait consumed by [`Self::tick`].
    pub fn pop_ready(&mut self) -> Option<Bytes> {
        let playout = self.playout?;

        if let Some(payload) = self.slots.remove(&playout) {
            self.playout = Some(playout + 1);
            self.gap_since = None;
            self.stats.packets_released += 1;
            self.stats.buffered = self.slots.len();
            return Some(payload);
        }

        if !self.slots.is_empty() && self.gap_since.is_none() {
            self.gap_since = Some(Instant::now());
        }
        None
    }

    /// Periodic check that skips a gap once it has stalled playout for
    /// `max_wait`, counting the skipped sequence as lost
    ///
    /// Runs interleaved with the receive loop on the same task; there
    /// is no timer thread touching the buffer.
    pub fn tick(&mut self) {
        let playout = match self.playout {
            Some(p) => p,
            None => return,
        };

        if self.slots.is_empty() || self.slots.contains_key(&playout) {
            self.gap_since = None;
            return;
        }

        let now = Instant::now();
        let since = *self.gap_since.get_or_insert(now);
        if now.duration_since(since) >= self.config.max_wait {
            self.playout = Some(playout + 1);
            self.stats.packets_lost += 1;
            self.gap_since = None;
            debug!(
                seq = (playout & 0xFFFF) as u16,
                "skipping missing packet after bounded wait"
            );
        }
    }

    /// Snapshot of the buffer statistics
    pub fn stats(&self) -> JitterBufferStats {
        let mut stats = self.stats.clone();
        stats.buffered = self.slots.len();
        stats
    }

    /// Drop all pending packets and counters, ready for a new stream
    pub fn reset(&mut self) {
        self.slots.clear();
        self.playout = None;
        self.gap_since = None;
        self.stats = JitterBufferStats::default();
    }
}
