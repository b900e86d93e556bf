//! 16-bit PCM payload conversion
//!
//! Payloads on the wire are raw little-endian signed 16-bit samples.
//! The header stays big-endian; only the sample bytes use LE order.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::Result;

/// Width of one sample in bytes
pub const SAMPLE_WIDTH: usize = 2;

/// Convert samples to their wire representation
pub fn samples_to_bytes(samples: &[i16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * SAMPLE_WIDTH);
    for sample in samples {
        buf.put_i16_le(*sample);
    }
    buf.freeze()
}

/// Convert wire bytes back to samples
///
/// Fails when the length is not a multiple of the sample width; a
/// packet payload carrying PCM must hold whole samples.
pub fn bytes_to_samples(data: &[u8]) -> Result<Vec<i16>> {
    if data.len() % SAMPLE_WIDTH != 0 {
        return Err(Error::OddPayloadLength(data.len()));
    }

    Ok(data
        .chunks_exact(SAMPLE_WIDTH)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
