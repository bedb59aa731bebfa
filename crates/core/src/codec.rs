//! Portable text encoding for items and item arrays.
//!
//! A single item is its JSON form, base64-encoded. An array is a 4-byte
//! big-endian count followed by one frame per slot: a 4-byte big-endian
//! length (0 for an empty slot) and that many item bytes. The framed bytes
//! are base64-encoded as a whole.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::models::ItemValue;

const LEN_PREFIX: usize = 4;

/// Reasons an encoded string could not be turned back into items.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Text is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A length prefix or payload runs past the end of the input.
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the frame asked for.
        needed: usize,
        /// Bytes actually left.
        remaining: usize,
    },

    /// Frame bytes are not a valid item.
    #[error("invalid item payload: {0}")]
    Item(String),

    /// Bytes left over after the declared slots.
    #[error("{0} trailing bytes after last slot")]
    TrailingBytes(usize),

    /// The item has no byte representation.
    #[error("item cannot be encoded: {0}")]
    Encode(String),
}

/// Encode one item. `None` only when the item cannot be represented.
pub fn encode(item: &ItemValue) -> Option<String> {
    match item_bytes(item) {
        Ok(bytes) => Some(STANDARD.encode(bytes)),
        Err(err) => {
            debug!(?err, material = %item.material, "item encode failed");
            None
        }
    }
}

/// Decode one item; `None` on malformed input.
pub fn decode(text: &str) -> Option<ItemValue> {
    try_decode(text)
        .map_err(|err| debug!(?err, "item decode failed"))
        .ok()
}

/// Decode one item, reporting why it failed.
pub fn try_decode(text: &str) -> Result<ItemValue, CodecError> {
    let bytes = STANDARD.decode(text.trim())?;
    item_from_bytes(&bytes)
}

/// Encode a slot sequence of any length.
pub fn encode_array(items: &[Option<ItemValue>]) -> Option<String> {
    match try_encode_array(items) {
        Ok(text) => Some(text),
        Err(err) => {
            debug!(?err, "array encode failed");
            None
        }
    }
}

/// Encode a slot sequence, reporting why it failed.
pub fn try_encode_array(items: &[Option<ItemValue>]) -> Result<String, CodecError> {
    let mut buf = Vec::with_capacity(LEN_PREFIX * (items.len() + 1));
    write_len(&mut buf, items.len())?;
    for item in items {
        match item {
            None => write_len(&mut buf, 0)?,
            Some(item) => {
                let bytes = item_bytes(item)?;
                write_len(&mut buf, bytes.len())?;
                buf.extend_from_slice(&bytes);
            }
        }
    }
    Ok(STANDARD.encode(buf))
}

/// Decode a slot sequence; `None` on any structural corruption.
pub fn decode_array(text: &str) -> Option<Vec<Option<ItemValue>>> {
    try_decode_array(text)
        .map_err(|err| debug!(?err, "array decode failed"))
        .ok()
}

/// Decode a slot sequence, reporting why it failed.
pub fn try_decode_array(text: &str) -> Result<Vec<Option<ItemValue>>, CodecError> {
    let bytes = STANDARD.decode(text.trim())?;
    let mut reader = Reader { bytes: &bytes };

    let count = reader.read_len()?;
    // Every slot needs at least its length prefix.
    if count > reader.remaining() / LEN_PREFIX {
        return Err(CodecError::Truncated {
            needed: count * LEN_PREFIX,
            remaining: reader.remaining(),
        });
    }

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_len()?;
        if len == 0 {
            items.push(None);
            continue;
        }
        let payload = reader.take(len)?;
        items.push(Some(item_from_bytes(payload)?));
    }

    match reader.remaining() {
        0 => Ok(items),
        extra => Err(CodecError::TrailingBytes(extra)),
    }
}

fn item_bytes(item: &ItemValue) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(item).map_err(|err| CodecError::Encode(err.to_string()))
}

fn item_from_bytes(bytes: &[u8]) -> Result<ItemValue, CodecError> {
    serde_json::from_slice(bytes).map_err(|err| CodecError::Item(err.to_string()))
}

fn write_len(buf: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    let len = u32::try_from(len)
        .map_err(|_| CodecError::Encode(format!("length {len} exceeds u32")))?;
    buf.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.bytes.len() {
            return Err(CodecError::Truncated {
                needed: len,
                remaining: self.bytes.len(),
            });
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn read_len(&mut self) -> Result<usize, CodecError> {
        let raw = self.take(LEN_PREFIX)?;
        let value = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(value as usize)
    }
}
