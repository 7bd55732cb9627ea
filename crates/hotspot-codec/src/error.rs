//! Error types for payload decoding.

use hotspot_types::FieldKind;

/// Errors that can occur while decoding or encoding a payload.
///
/// Every variant is a per-message failure: the ingestion path logs it and
/// drops the message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload ended before a required header.
    #[error("payload truncated: {0}")]
    Truncated(&'static str),

    /// The compression envelope carried an unknown tag.
    #[error("unknown compression tag {0}")]
    UnknownCompression(u8),

    /// Block decompression failed.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The body size did not match the size declared in the envelope.
    #[error("uncompressed size mismatch: declared {declared}, got {actual}")]
    SizeMismatch {
        /// Size declared in the envelope.
        declared: usize,
        /// Size actually produced.
        actual: usize,
    },

    /// The body is too large for the envelope's size field.
    #[error("payload too large: {0} bytes")]
    TooLarge(usize),

    /// The binary body could not be decoded.
    #[error("binary decode error: {0}")]
    Binary(#[from] bincode::Error),

    /// The text body could not be parsed.
    #[error("text decode error: {0}")]
    Text(#[from] serde_json::Error),

    /// The text body was not a JSON object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// A declared field carried a value of the wrong kind.
    #[error("field {field}: expected {expected:?}")]
    FieldKind {
        /// The offending field.
        field: String,
        /// Its declared kind.
        expected: FieldKind,
    },
}
