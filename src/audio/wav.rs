//! RIFF/WAVE decoding and encoding
//!
//! The decoder reads the canonical 44-byte header layout: format fields at
//! fixed offsets, followed by a linear scan for the `data` chunk. `fmt `
//! chunks carrying extension bytes are not supported.

use thiserror::Error;

use super::SampleBuffer;
use crate::{Error, Result};

/// Size of a canonical WAV header
pub const MIN_HEADER_LEN: usize = 44;

const CHANNELS_OFFSET: usize = 22;
const SAMPLE_RATE_OFFSET: usize = 24;
const BITS_OFFSET: usize = 34;
const FIRST_CHUNK_OFFSET: usize = 12;

/// Chunk id + chunk size
const CHUNK_HEADER_LEN: usize = 8;

/// Bytes of a non-RIFF payload echoed back in errors
const PREVIEW_LEN: usize = 64;

/// Reasons a WAV buffer cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer shorter than a WAV header
    #[error("buffer too short for a WAV header ({len} bytes)")]
    TooShort { len: usize },

    /// Buffer does not start with `RIFF`, often a JSON error body
    #[error("not a RIFF container, starts with {preview:?}")]
    NotRiff { preview: String },

    /// Header fields are out of range
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// No `data` chunk before the end of the buffer
    #[error("no data chunk found")]
    DataChunkNotFound,

    /// Bit depth other than 8, 16 or 32
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),
}

/// Result of decoding a WAV buffer
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Decoded samples
    pub buffer: SampleBuffer,
    /// Bit depth of the source payload
    pub bits_per_sample: u16,
    /// Byte offset of the first payload byte
    pub data_offset: usize,
    /// Number of samples converted
    pub samples_written: usize,
    /// Trailing payload bytes that did not form a whole frame
    pub dropped_bytes: usize,
}

impl DecodedAudio {
    /// Whether the payload ended mid-frame
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.dropped_bytes > 0
    }
}

/// Decode a WAV buffer starting at the beginning of `bytes`
///
/// # Errors
///
/// See [`decode`]
pub fn decode_wav(bytes: &[u8]) -> std::result::Result<DecodedAudio, DecodeError> {
    decode(bytes, 0)
}

/// Decode a WAV buffer whose format fields are shifted by `byte_offset`
///
/// A payload that ends mid-sample is not an error: conversion stops at the
/// last complete frame and the remainder is reported in
/// [`DecodedAudio::dropped_bytes`].
///
/// # Errors
///
/// Returns error if the header is missing or malformed, no `data` chunk
/// exists, or the bit depth is unsupported
pub fn decode(bytes: &[u8], byte_offset: usize) -> std::result::Result<DecodedAudio, DecodeError> {
    if bytes.len() < MIN_HEADER_LEN {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }

    if &bytes[..4] != b"RIFF" {
        let preview = String::from_utf8_lossy(&bytes[..bytes.len().min(PREVIEW_LEN)]).into_owned();
        return Err(DecodeError::NotRiff { preview });
    }

    let too_short = || DecodeError::TooShort { len: bytes.len() };
    let channels = read_u16(bytes, CHANNELS_OFFSET.saturating_add(byte_offset)).ok_or_else(too_short)?;
    let sample_rate =
        read_u32(bytes, SAMPLE_RATE_OFFSET.saturating_add(byte_offset)).ok_or_else(too_short)?;
    let bits_per_sample = read_u16(bytes, BITS_OFFSET.saturating_add(byte_offset)).ok_or_else(too_short)?;

    if !(1..=2).contains(&channels) {
        return Err(DecodeError::InvalidFormat(format!("channel count {channels}")));
    }
    if sample_rate == 0 {
        return Err(DecodeError::InvalidFormat("sample rate 0".to_string()));
    }

    let data_offset = find_data_chunk(bytes, FIRST_CHUNK_OFFSET.saturating_add(byte_offset))
        .ok_or(DecodeError::DataChunkNotFound)?;

    let convert: fn(&[u8]) -> f32 = match bits_per_sample {
        8 => |b| (f32::from(b[0]) - 128.0) / 128.0,
        16 => |b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0,
        32 => |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        other => return Err(DecodeError::UnsupportedBitDepth(other)),
    };

    let step = usize::from(bits_per_sample / 8);
    let frame_width = usize::from(channels);
    let payload = &bytes[data_offset..];

    let mut frames = payload.len() / step;
    if channels == 2 {
        frames /= 2;
    }
    let sample_count = frames * frame_width;

    let mut samples = vec![0.0_f32; sample_count];
    let mut samples_written = 0;
    for (slot, raw) in samples.iter_mut().zip(payload.chunks_exact(step)) {
        *slot = convert(raw);
        samples_written += 1;
    }
    samples.truncate(samples_written - samples_written % frame_width);

    let dropped_bytes = payload.len() - samples.len() * step;
    if dropped_bytes > 0 {
        tracing::debug!(dropped_bytes, samples_written, "wav payload truncated mid-frame");
    }

    let buffer = SampleBuffer {
        channels,
        sample_rate,
        samples,
    };

    Ok(DecodedAudio {
        buffer,
        bits_per_sample,
        data_offset,
        samples_written,
        dropped_bytes,
    })
}

/// Encode a sample buffer as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn encode_wav(buffer: &SampleBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in buffer.samples() {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Walk chunks from `start` until `data`, returning the payload offset
fn find_data_chunk(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    loop {
        let id = bytes.get(pos..pos.checked_add(4)?)?;
        let payload = pos.checked_add(CHUNK_HEADER_LEN)?;
        if id == b"data" {
            return (payload <= bytes.len()).then_some(payload);
        }

        let size = usize::try_from(read_u32(bytes, pos + 4)?).ok()?;
        pos = payload.checked_add(size)?;
    }
}

fn read_u16(bytes: &[u8], pos: usize) -> Option<u16> {
    let raw = bytes.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes(raw.try_into().ok()?))
}

fn read_u32(bytes: &[u8], pos: usize) -> Option<u32> {
    let raw = bytes.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a canonical WAV header followed by `payload`
    fn wav_bytes(channels: u16, sample_rate: u32, bits: u16, payload: &[u8]) -> Vec<u8> {
        let block_align = channels * (bits / 8).max(1);
        let mut out = Vec::with_capacity(MIN_HEADER_LEN + payload.len());
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + payload.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&(if bits == 32 { 3u16 } else { 1u16 }).to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_16_bit_mono() {
        let bytes = wav_bytes(1, 22_050, 16, &pcm16(&[0, 16_384, -32_768, 32_767]));
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.data_offset, MIN_HEADER_LEN);
        assert_eq!(decoded.buffer.channels(), 1);
        assert_eq!(decoded.buffer.sample_rate(), 22_050);
        assert_eq!(decoded.buffer.samples(), &[0.0, 0.5, -1.0, 32_767.0 / 32_768.0]);
        assert!(!decoded.is_truncated());
    }

    #[test]
    fn sample_count_matches_payload_length() {
        let payload = pcm16(&(0..500).map(|i| (i * 61) as i16).collect::<Vec<_>>());
        let bytes = wav_bytes(1, 16_000, 16, &payload);
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.buffer.samples().len(), (bytes.len() - decoded.data_offset) / 2);
        assert!(decoded.buffer.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn decodes_8_bit() {
        let bytes = wav_bytes(1, 8_000, 8, &[0, 128, 255]);
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.buffer.samples(), &[-1.0, 0.0, 127.0 / 128.0]);
    }

    #[test]
    fn decodes_32_bit_float() {
        let payload: Vec<u8> = [0.25_f32, -0.75].iter().flat_map(|s| s.to_le_bytes()).collect();
        let bytes = wav_bytes(1, 48_000, 32, &payload);
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.buffer.samples(), &[0.25, -0.75]);
    }

    #[test]
    fn stereo_keeps_whole_frames() {
        let bytes = wav_bytes(2, 44_100, 16, &pcm16(&[1, 2, 3, 4, 5]));
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.buffer.frames(), 2);
        assert_eq!(decoded.buffer.samples().len(), 4);
        assert_eq!(decoded.dropped_bytes, 2);
    }

    #[test]
    fn truncated_final_sample_is_dropped() {
        let mut payload = pcm16(&[100, 200, 300]);
        payload.push(0x7f);
        let bytes = wav_bytes(1, 16_000, 16, &payload);
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.samples_written, 3);
        assert_eq!(decoded.buffer.samples().len(), 3);
        assert_eq!(decoded.dropped_bytes, 1);
        assert!(decoded.is_truncated());
    }

    #[test]
    fn short_input_is_too_short() {
        for len in [0, 1, 4, 43] {
            let bytes = vec![b'R'; len];
            assert_eq!(decode_wav(&bytes), Err(DecodeError::TooShort { len }));
        }
    }

    #[test]
    fn json_body_is_not_riff() {
        let body = br#"{"error": "voice not found", "detail": "male_01.wav missing on server"}"#;
        match decode_wav(body) {
            Err(DecodeError::NotRiff { preview }) => assert!(preview.starts_with("{\"error\"")),
            other => panic!("expected NotRiff, got {other:?}"),
        }
    }

    #[test]
    fn skips_unknown_chunks() {
        let mut bytes = wav_bytes(1, 16_000, 16, &[]);
        // Replace the empty data chunk with LIST + data
        bytes.truncate(36);
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&6u32.to_le_bytes());
        bytes.extend_from_slice(b"abcdef");
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&pcm16(&[1000, -1000]));

        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.data_offset, 36 + 8 + 6 + 8);
        assert_eq!(decoded.buffer.samples().len(), 2);
    }

    #[test]
    fn missing_data_chunk() {
        let mut bytes = wav_bytes(1, 16_000, 16, &pcm16(&[1, 2, 3, 4]));
        bytes[36..40].copy_from_slice(b"junk");
        assert_eq!(decode_wav(&bytes), Err(DecodeError::DataChunkNotFound));
    }

    #[test]
    fn oversized_chunk_size_does_not_panic() {
        let mut bytes = wav_bytes(1, 16_000, 16, &pcm16(&[1, 2, 3, 4]));
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(decode_wav(&bytes), Err(DecodeError::DataChunkNotFound));
    }

    #[test]
    fn rejects_unsupported_bit_depth() {
        let bytes = wav_bytes(1, 16_000, 24, &[0; 9]);
        assert_eq!(decode_wav(&bytes), Err(DecodeError::UnsupportedBitDepth(24)));
    }

    #[test]
    fn missing_data_chunk_reported_before_bit_depth() {
        let mut bytes = wav_bytes(1, 16_000, 24, &[0; 9]);
        bytes[36..40].copy_from_slice(b"LIST");
        assert_eq!(decode_wav(&bytes), Err(DecodeError::DataChunkNotFound));
    }

    #[test]
    fn rejects_zero_channels() {
        let bytes = wav_bytes(0, 16_000, 16, &[0; 4]);
        assert!(matches!(decode_wav(&bytes), Err(DecodeError::InvalidFormat(_))));
    }

    #[test]
    fn offset_past_end_is_too_short() {
        let bytes = wav_bytes(1, 16_000, 16, &[0; 4]);
        assert!(matches!(decode(&bytes, 1000), Err(DecodeError::TooShort { .. })));
        assert!(matches!(decode(&bytes, usize::MAX), Err(DecodeError::TooShort { .. })));
    }

    #[test]
    fn honours_byte_offset() {
        let inner = wav_bytes(1, 16_000, 16, &pcm16(&[8192, -8192]));
        let mut bytes = inner[..4].to_vec();
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&inner[4..]);

        let decoded = decode(&bytes, 4).unwrap();
        assert_eq!(decoded.buffer.samples(), &[0.25, -0.25]);
    }

    #[test]
    fn encode_then_decode_preserves_format() {
        let buffer = SampleBuffer::new(2, 24_000, vec![0.0, 0.5, -0.5, 0.25]).unwrap();
        let bytes = encode_wav(&buffer).unwrap();
        let decoded = decode_wav(&bytes).unwrap();

        assert_eq!(decoded.buffer.channels(), 2);
        assert_eq!(decoded.buffer.sample_rate(), 24_000);
        assert_eq!(decoded.bits_per_sample, 16);
        for (a, b) in decoded.buffer.samples().iter().zip(buffer.samples()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
