// PCM conversion at the transport boundary
//
// Both directions of the voice pipeline share one binary framing contract:
// little-endian 16-bit signed PCM, base64-encoded for transport, tagged
// with an explicit sample rate (16000 outbound, 24000 inbound).

use anyhow::{Context, Result};
use base64::Engine;

/// Sample rate of outbound capture audio in Hz
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of inbound agent audio in Hz
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// MIME tag carried by outbound audio frames
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Convert one float sample in [-1.0, 1.0] to a signed 16-bit integer.
///
/// Mapping is `round(sample * 32768)`, saturating at the i16 range, so
/// +1.0 lands on 32767 and -1.0 on -32768.
pub fn sample_to_i16(sample: f32) -> i16 {
    let scaled = (f64::from(sample) * 32768.0).round();
    scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Convert a signed 16-bit integer back to a float sample.
pub fn sample_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Pack 16-bit samples into little-endian bytes.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Unpack little-endian bytes into 16-bit samples.
///
/// A trailing odd byte is ignored.
pub fn le_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Encode float samples into little-endian 16-bit PCM bytes.
pub fn encode_pcm(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Decode little-endian 16-bit PCM bytes into float samples.
pub fn decode_pcm(bytes: &[u8]) -> Vec<f32> {
    le_bytes_to_samples(bytes)
        .into_iter()
        .map(sample_to_f32)
        .collect()
}

/// Base64-encode PCM bytes for transport.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 transport audio back into raw bytes.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("Failed to decode base64 audio")
}

/// Split interleaved samples into per-channel planes.
///
/// Interleaved layout is `[c0, c1, .., cN, c0, c1, ..]`; trailing samples
/// that do not fill a complete frame are dropped.
pub fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let channels = channels.max(1) as usize;
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_saturation() {
        assert_eq!(sample_to_i16(1.5), i16::MAX);
        assert_eq!(sample_to_i16(-1.5), i16::MIN);
        assert_eq!(sample_to_i16(-1.0), i16::MIN);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn test_le_byte_order() {
        let bytes = samples_to_le_bytes(&[0x0102]);
        assert_eq!(bytes, vec![0x02, 0x01]);
        assert_eq!(le_bytes_to_samples(&bytes), vec![0x0102]);
    }

    #[test]
    fn test_trailing_odd_byte_ignored() {
        assert_eq!(le_bytes_to_samples(&[0x00, 0x01, 0xff]), vec![256]);
    }
}
