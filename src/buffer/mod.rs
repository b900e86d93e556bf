//! Packet reordering and playout buffering

mod jitter;

pub use jitter::{InsertOutcome, JitterBuffer, JitterBufferConfig, JitterBufferStats};
