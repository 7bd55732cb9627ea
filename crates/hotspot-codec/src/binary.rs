//! Binary bodies and the compression envelope.
//!
//! # Envelope
//!
//! Schemas declared with `compression: block` wrap their body as
//!
//! ```text
//! [tag: u8][uncompressed_len: u32 LE][body]
//! ```
//!
//! where tag `0` means the body is stored as-is and tag `1` means the body
//! is an LZ4 block that inflates to exactly `uncompressed_len` bytes.

use std::borrow::Cow;

use hotspot_types::{Compression, Message};

use crate::error::CodecError;

/// Envelope tag: body stored uncompressed.
pub const TAG_NONE: u8 = 0;

/// Envelope tag: body is an LZ4 block.
pub const TAG_LZ4_BLOCK: u8 = 1;

/// Strip the compression envelope (if the schema declares one) and return
/// the raw body.
///
/// # Errors
///
/// Returns [`CodecError`] if the header is truncated, the tag is unknown,
/// decompression fails, or the size does not match.
pub fn open(compression: Compression, payload: &[u8]) -> Result<Cow<'_, [u8]>, CodecError> {
    if compression == Compression::None {
        return Ok(Cow::Borrowed(payload));
    }

    let (&tag, rest) = payload
        .split_first()
        .ok_or(CodecError::Truncated("compression tag"))?;
    let (size_bytes, body) = rest
        .split_at_checked(4)
        .ok_or(CodecError::Truncated("uncompressed size"))?;
    let size_bytes: [u8; 4] = size_bytes
        .try_into()
        .map_err(|_e| CodecError::Truncated("uncompressed size"))?;
    let declared = usize::try_from(u32::from_le_bytes(size_bytes))
        .map_err(|_e| CodecError::TooLarge(usize::MAX))?;

    let inflated = match tag {
        TAG_NONE => Cow::Borrowed(body),
        TAG_LZ4_BLOCK => Cow::Owned(
            lz4_flex::block::decompress(body, declared)
                .map_err(|e| CodecError::Decompress(e.to_string()))?,
        ),
        other => return Err(CodecError::UnknownCompression(other)),
    };

    if inflated.len() != declared {
        return Err(CodecError::SizeMismatch {
            declared,
            actual: inflated.len(),
        });
    }
    Ok(inflated)
}

/// Wrap a body in the envelope the schema declares.
///
/// With `compress` false a block schema still gets the envelope, tagged
/// [`TAG_NONE`].
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] if the body does not fit a `u32` size.
pub fn seal(compression: Compression, body: &[u8], compress: bool) -> Result<Vec<u8>, CodecError> {
    if compression == Compression::None {
        return Ok(body.to_vec());
    }

    let size = u32::try_from(body.len()).map_err(|_e| CodecError::TooLarge(body.len()))?;
    let (tag, stored) = if compress {
        (TAG_LZ4_BLOCK, Cow::Owned(lz4_flex::block::compress(body)))
    } else {
        (TAG_NONE, Cow::Borrowed(body))
    };

    let mut out = Vec::with_capacity(stored.len().saturating_add(5));
    out.push(tag);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&stored);
    Ok(out)
}

/// Decode a binary body.
///
/// # Errors
///
/// Returns [`CodecError::Binary`] if the body is malformed.
pub fn decode_body(body: &[u8]) -> Result<Message, CodecError> {
    Ok(bincode::deserialize(body)?)
}

/// Encode a binary body.
///
/// # Errors
///
/// Returns [`CodecError::Binary`] if serialization fails.
pub fn encode_body(message: &Message) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serialize(message)?)
}
