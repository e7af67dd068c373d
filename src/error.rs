//! Crate-wide error types
//!
//! All failure paths in the library surface as [`Error`] values; nothing in the
//! media pipeline panics on bad input. Parse errors carry a short static
//! description of what was wrong so callers can log and drop the offending
//! message without tearing down the stream.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all media-engine operations
#[derive(Debug, Error)]
pub enum Error {
    /// Corrupt codec bitstream: bad NALU length, invalid ADTS sync,
    /// Exp-Golomb overflow, missing start code, truncated config record.
    #[error("malformed bitstream: {0}")]
    MalformedBitstream(&'static str),

    /// Codec the pipeline does not carry (non-AAC audio, non-AVC/HEVC video)
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(&'static str),

    /// Frame data arrived before the stream was configured
    /// (video before a sequence header, audio before an AudioSpecificConfig)
    #[error("premature data: {0}")]
    PrematureData(&'static str),

    /// Container-level violation: PSI section failing CRC, TS packet without
    /// sync byte, FLV signature mismatch.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// File-system failure from the fragment/playlist layer
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is recoverable by dropping the current message and
    /// waiting for the next key frame.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}
