use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Serialize, Serializer};

use super::{CodecError, CodecResult};

/// Sample rate of audio captured from clients
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio synthesized by the model
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

pub const SAMPLE_SIZE_BITS: u16 = 16;
pub const BYTES_PER_SAMPLE: usize = 2;
pub const CHANNEL_COUNT: u16 = 1;

/// A validated chunk of PCM16 mono audio.
///
/// Construction fails unless the payload is non-empty and holds a whole number of
/// 16-bit samples, so holders of an `AudioFrame` never need to re-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, sample_rate: u32) -> CodecResult<Self> {
        let data = data.into();
        if sample_rate == 0 {
            return Err(CodecError::MalformedFrame("sample rate must be non-zero".into()));
        }
        if data.is_empty() {
            return Err(CodecError::MalformedFrame("empty audio frame".into()));
        }
        if data.len() % BYTES_PER_SAMPLE != 0 {
            return Err(CodecError::MalformedFrame(format!(
                "{} bytes is not a whole number of 16-bit samples",
                data.len()
            )));
        }
        Ok(Self { data, sample_rate })
    }

    /// Client microphone audio at 16 kHz.
    pub fn input(data: impl Into<Bytes>) -> CodecResult<Self> {
        Self::new(data, INPUT_SAMPLE_RATE)
    }

    /// Model speech at 24 kHz.
    pub fn output(data: impl Into<Bytes>) -> CodecResult<Self> {
        Self::new(data, OUTPUT_SAMPLE_RATE)
    }

    /// Decode a base64 wire payload.
    pub fn from_base64(encoded: &str, sample_rate: u32) -> CodecResult<Self> {
        let data = BASE64
            .decode(encoded.trim())
            .map_err(|e| CodecError::MalformedFrame(format!("invalid base64: {e}")))?;
        Self::new(data, sample_rate)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / BYTES_PER_SAMPLE
    }

    /// Playback duration of the frame.
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.sample_count() as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

impl Serialize for AudioFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}
