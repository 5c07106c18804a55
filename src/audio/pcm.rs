//! Linear PCM frame conversion between float samples and wire bytes.
//!
//! The transport exchanges 16-bit signed little-endian PCM; capture and
//! playback work in `f32` samples in `[-1.0, 1.0]`. Conversion follows
//! audio-hardware dynamic range handling: out-of-range input clamps
//! silently, there is no error path.

use crate::defaults::PCM_SCALE;
use std::time::Duration;

/// Encode float samples into a 16-bit little-endian PCM frame.
///
/// The output is byte-exact: `2 * samples.len()` bytes, sample order
/// preserved. Values outside `[-1.0, 1.0]` saturate at the i16 range.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Saturating float → int cast handles the clamp.
        let value = (sample * PCM_SCALE) as i16;
        frame.extend_from_slice(&value.to_le_bytes());
    }
    frame
}

/// Decode a 16-bit little-endian PCM frame into float samples.
///
/// An odd trailing byte is dropped; a corrupted tail should not make the
/// rest of the frame unplayable.
pub fn decode_frame(frame: &[u8]) -> Vec<f32> {
    frame
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM_SCALE)
        .collect()
}

/// Playback duration of a sample count at the given rate.
pub fn duration_of(sample_count: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(sample_count as f64 / sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_two_bytes_per_sample() {
        for len in [0usize, 1, 160, 4096] {
            let samples = vec![0.25f32; len];
            assert_eq!(encode_frame(&samples).len(), 2 * len);
        }
    }

    #[test]
    fn encode_half_amplitude_chunk() {
        // 0.5 × 32767 = 16383.5, truncated toward zero: 16383.
        let samples = vec![0.5f32; 4096];
        let frame = encode_frame(&samples);

        assert_eq!(frame.len(), 8192);
        for pair in frame.chunks_exact(2) {
            assert_eq!(i16::from_le_bytes([pair[0], pair[1]]), 16383);
        }
    }

    #[test]
    fn encode_preserves_sample_order() {
        let samples = vec![0.0f32, 0.1, -0.1, 0.9, -0.9];
        let decoded = decode_frame(&encode_frame(&samples));

        assert_eq!(decoded.len(), samples.len());
        for (original, roundtripped) in samples.iter().zip(&decoded) {
            assert!(
                (original - roundtripped).abs() <= 1.0 / PCM_SCALE,
                "sample {} decoded as {}",
                original,
                roundtripped
            );
        }
    }

    #[test]
    fn encode_clamps_out_of_range_silently() {
        let frame = encode_frame(&[2.0, -2.0, 1.0, -1.0]);
        let values: Vec<i16> = frame
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        assert_eq!(values[0], i16::MAX);
        assert_eq!(values[1], i16::MIN);
        assert_eq!(values[2], i16::MAX);
        assert_eq!(values[3], -32767);
    }

    #[test]
    fn encode_full_scale_extremes() {
        let frame = encode_frame(&[1.0, -1.0, 0.0]);
        assert_eq!(&frame[0..2], &i16::MAX.to_le_bytes());
        assert_eq!(&frame[2..4], &(-32767i16).to_le_bytes());
        assert_eq!(&frame[4..6], &0i16.to_le_bytes());
    }

    #[test]
    fn roundtrip_within_one_quantization_step() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 500.0) - 1.0).collect();
        let decoded = decode_frame(&encode_frame(&samples));

        for (original, roundtripped) in samples.iter().zip(&decoded) {
            assert!((original - roundtripped).abs() <= 1.0 / PCM_SCALE);
        }
    }

    #[test]
    fn decode_is_little_endian() {
        // 0x0100 little-endian = 256
        let decoded = decode_frame(&[0x00, 0x01]);
        assert_eq!(decoded.len(), 1);
        assert!((decoded[0] - 256.0 / PCM_SCALE).abs() < f32::EPSILON);
    }

    #[test]
    fn decode_drops_odd_trailing_byte() {
        let decoded = decode_frame(&[0x00, 0x01, 0xFF]);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn decode_empty_frame() {
        assert!(decode_frame(&[]).is_empty());
    }

    #[test]
    fn duration_of_matches_sample_rate() {
        assert_eq!(duration_of(16000, 16000), Duration::from_secs(1));
        assert_eq!(duration_of(24000, 24000), Duration::from_secs(1));
        assert_eq!(duration_of(12000, 24000), Duration::from_millis(500));
        assert_eq!(duration_of(0, 24000), Duration::ZERO);
    }
}
