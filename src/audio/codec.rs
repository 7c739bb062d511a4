//! PCM and base64 conversions shared by the capture and playback paths.
//!
//! Everything here is a pure function. Wire audio is 16-bit signed
//! little-endian PCM; in-memory audio is normalized `f32` in `[-1.0, 1.0)`.

use base64::Engine;

use super::device::AudioBuffer;
use crate::error::DecodeError;

/// Scale between i16 PCM and normalized float samples
const PCM_SCALE: f32 = 32768.0;

/// Encode raw bytes as standard padded base64
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard padded base64
pub fn base64_to_bytes(s: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(s)?)
}

pub fn int16_pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / PCM_SCALE).collect()
}

/// Convert normalized float samples to i16 PCM.
///
/// Out-of-range input is clamped to `[-32768, 32767]` rather than wrapped.
pub fn float_to_int16_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&f| (f * PCM_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Pack samples as little-endian bytes
pub fn samples_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Unpack little-endian bytes into samples; an odd byte count is malformed
pub fn pcm_bytes_to_samples(bytes: &[u8]) -> Result<Vec<i16>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddPcmLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Split interleaved samples `[L, R, L, R, ...]` into one sequence per channel.
///
/// Every channel gets `samples.len() / channel_count` samples; a trailing
/// partial frame is discarded.
pub fn deinterleave_channels(
    samples: &[i16],
    channel_count: usize,
) -> Result<Vec<Vec<i16>>, DecodeError> {
    if channel_count == 0 {
        return Err(DecodeError::ChannelCount(channel_count));
    }

    let frame_count = samples.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];

    for frame in samples.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(channels)
}

/// Decode a raw PCM payload into a playable buffer
pub fn decode_audio_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: usize,
) -> Result<AudioBuffer, DecodeError> {
    if sample_rate == 0 {
        return Err(DecodeError::SampleRate(sample_rate));
    }

    let samples = pcm_bytes_to_samples(bytes)?;
    let channels = deinterleave_channels(&samples, channel_count)?
        .iter()
        .map(|channel| int16_pcm_to_float(channel))
        .collect();

    Ok(AudioBuffer::new(channels, sample_rate))
}

/// Decode a base64 PCM payload as delivered by the live endpoint
pub fn decode_base64_audio(
    data: &str,
    sample_rate: u32,
    channel_count: usize,
) -> Result<AudioBuffer, DecodeError> {
    let bytes = base64_to_bytes(data)?;
    decode_audio_buffer(&bytes, sample_rate, channel_count)
}

/// Convert a captured float frame into a base64 PCM payload
pub fn encode_float_frame(samples: &[f32]) -> String {
    bytes_to_base64(&samples_to_pcm_bytes(&float_to_int16_pcm(samples)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let inputs: [&[u8]; 4] = [b"", b"a", b"ab", &[0, 255, 128, 7, 9]];
        for bytes in inputs {
            let encoded = bytes_to_base64(bytes);
            assert_eq!(base64_to_bytes(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_base64_rejects_malformed_input() {
        assert!(matches!(base64_to_bytes("not*base64"), Err(DecodeError::Base64(_))));
        assert!(matches!(base64_to_bytes("QUJD="), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_int16_to_float_scaling() {
        let floats = int16_pcm_to_float(&[0, 16384, -32768, 32767]);
        assert_eq!(floats[0], 0.0);
        assert_eq!(floats[1], 0.5);
        assert_eq!(floats[2], -1.0);
        assert!(floats[3] < 1.0);
    }

    #[test]
    fn test_int16_float_roundtrip_all_values() {
        let samples: Vec<i16> = (i16::MIN..=i16::MAX).collect();
        let back = float_to_int16_pcm(&int16_pcm_to_float(&samples));
        for (a, b) in samples.iter().zip(&back) {
            assert!((*a as i32 - *b as i32).abs() <= 1);
        }
    }

    #[test]
    fn test_float_to_int16_clamps_out_of_range() {
        let pcm = float_to_int16_pcm(&[1.0, 1.5, -1.0, -2.0, 0.25]);
        assert_eq!(pcm, vec![32767, 32767, -32768, -32768, 8192]);
    }

    #[test]
    fn test_pcm_bytes_little_endian() {
        let bytes = samples_to_pcm_bytes(&[1, -2]);
        assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF]);
        assert_eq!(pcm_bytes_to_samples(&bytes).unwrap(), vec![1, -2]);
    }

    #[test]
    fn test_odd_pcm_length_is_malformed() {
        assert_eq!(
            pcm_bytes_to_samples(&[1, 2, 3]),
            Err(DecodeError::OddPcmLength(3))
        );
    }

    #[test]
    fn test_deinterleave_stereo_drops_partial_frame() {
        let channels = deinterleave_channels(&[1, 2, 3, 4, 5, 6, 7], 2).unwrap();
        assert_eq!(channels, vec![vec![1, 3, 5], vec![2, 4, 6]]);
    }

    #[test]
    fn test_deinterleave_zero_channels() {
        assert!(deinterleave_channels(&[1, 2], 0).is_err());
    }

    #[test]
    fn test_decode_audio_buffer_duration() {
        let bytes = samples_to_pcm_bytes(&vec![0i16; 9600]);
        let buffer = decode_audio_buffer(&bytes, 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 9600);
        assert!((buffer.duration() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_encode_float_frame_length() {
        let encoded = encode_float_frame(&vec![0.0f32; 4096]);
        // 8192 bytes -> ceil(8192 / 3) * 4
        assert_eq!(encoded.len(), 10924);
    }
}
