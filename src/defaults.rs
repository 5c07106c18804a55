//! Default configuration constants for voxlink.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Capture sample rate in Hz.
///
/// Realtime voice services ingest 16kHz mono PCM upstream; capturing at the
/// wire rate avoids a resampling stage on the hot path.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Playback sample rate in Hz.
///
/// Service replies arrive as 24kHz mono PCM; the output stream runs at the
/// same rate so decoded segments are scheduled without conversion.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Full-scale value used for float ↔ 16-bit PCM conversion.
pub const PCM_SCALE: f32 = 32_767.0;

/// Interval between polls of the capture source in milliseconds (~60Hz).
///
/// Each poll drains whatever the capture callback accumulated since the last
/// one; the capture → encode → send path must finish within this interval.
pub const CAPTURE_POLL_INTERVAL_MS: u64 = 16;

/// Bound of the outbound frame queue.
///
/// Frames beyond this are dropped rather than queued; the transport gives
/// no backpressure signal to the capture path.
pub const SEND_QUEUE_BOUND: usize = 64;

/// Capacity of the transport event channel drained by the session pump.
pub const EVENT_BUFFER: usize = 256;

/// Socket read timeout for the transport worker.
///
/// Short enough that the worker notices a stop request promptly, long enough
/// to avoid spinning on an idle connection.
pub const TRANSPORT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Default environment variable holding the service API key.
///
/// The key itself is never written to the config file.
pub const API_KEY_ENV: &str = "VOXLINK_API_KEY";

/// Default model requested at session setup.
pub const DEFAULT_MODEL: &str = "realtime-voice-1";

/// How long session teardown waits for worker threads before detaching them.
pub const TEARDOWN_DEADLINE: Duration = Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_rate_is_higher_than_capture_rate() {
        // The service upsamples replies; the two rates are independent knobs
        // and must never be conflated in conversion code.
        assert_eq!(CAPTURE_SAMPLE_RATE, 16_000);
        assert_eq!(PLAYBACK_SAMPLE_RATE, 24_000);
    }

    #[test]
    fn pcm_scale_matches_i16_max() {
        assert_eq!(PCM_SCALE as i32, i16::MAX as i32);
    }
}
