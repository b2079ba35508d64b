//! Content primitives exchanged between clients, sessions and the upstream model.
//!
//! Audio is linear PCM, 16-bit little-endian, mono. Input is captured at 16 kHz
//! and model output is synthesized at 24 kHz. On every JSON surface audio is a
//! base64 string.

mod audio;
mod event;

pub use audio::{
    AudioFrame, BYTES_PER_SAMPLE, CHANNEL_COUNT, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
    SAMPLE_SIZE_BITS,
};
pub use event::{ContentEvent, ContentType, EventKind, Role};

use thiserror::Error;

/// Codec validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
