//! Sequence and sample-clock arithmetic
//!
//! Sequence numbers wrap modulo 65536, so ordering comparisons use
//! signed modular distance rather than direct subtraction: sequence
//! 65535 is one behind sequence 0.

use std::time::Duration;

use crate::RtpSequenceNumber;

/// Signed distance from `b` to `a` in sequence-number space
///
/// Positive when `a` is ahead of `b`, negative when behind. The result
/// is exact for distances under half the sequence space.
pub fn seq_diff(a: RtpSequenceNumber, b: RtpSequenceNumber) -> i32 {
    let diff = (a as i32) - (b as i32);

    if diff > 32767 {
        diff - 65536
    } else if diff < -32768 {
        diff + 65536
    } else {
        diff
    }
}

/// Convert a sample count to wall-clock time at a given clock rate
pub fn samples_to_duration(samples: u32, clock_rate: u32) -> Duration {
    if clock_rate == 0 {
        return Duration::ZERO;
    }

    let seconds = samples / clock_rate;
    let remainder = samples % clock_rate;
    let nanos = ((remainder as u64) * 1_000_000_000) / (clock_rate as u64);

    Duration::new(seconds as u64, nanos as u32)
}

/// Inter-packet interval for a fixed chunk size at a given clock rate
pub fn packet_interval(samples_per_packet: u32, clock_rate: u32) -> Duration {
    samples_to_duration(samples_per_packet, clock_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_diff() {
        assert_eq!(seq_diff(101, 100), 1);
        assert_eq!(seq_diff(100, 101), -1);
        assert_eq!(seq_diff(100, 100), 0);

        // Wraparound: 0 is just ahead of 65535
        assert_eq!(seq_diff(0, 65535), 1);
        assert_eq!(seq_diff(65535, 0), -1);
        assert_eq!(seq_diff(10, 65530), 16);
    }

    #[test]
    fn test_packet_interval() {
        // 160 samples at 8kHz is the canonical 20ms audio packet
        assert_eq!(packet_interval(160, 8000), Duration::from_millis(20));
        assert_eq!(packet_interval(960, 48000), Duration::from_millis(20));
        assert_eq!(packet_interval(160, 0), Duration::ZERO);
    }

    #[test]
    fn test_samples_to_duration() {
        assert_eq!(samples_to_duration(8000, 8000), Duration::from_secs(1));
        assert_eq!(samples_to_duration(1000, 8000), Duration::from_millis(125));
    }
}
