//! Test signal generation
//!
//! Generates the PCM sample buffers fed to [`crate::PacedSender`];
//! tone streams make received audio easy to verify sample-for-sample.

use std::f32::consts::PI;
use std::time::Duration;

/// Generate a sine tone as 16-bit PCM at half full scale
pub fn sine_tone(frequency: f32, duration: Duration, sample_rate: u32) -> Vec<i16> {
    let count = (duration.as_secs_f64() * sample_rate as f64) as usize;
    let amplitude = 0.5 * i16::MAX as f32;

    (0..count)
        .map(|n| {
            let t = n as f32 / sample_rate as f32;
            (amplitude * (2.0 * PI * frequency * t).sin()) as i16
        })
        .collect()
}
