use super::Item;
use thiserror::Error;

/// Errors raised while encoding or decoding items
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Item record is empty")]
    Empty,
}

/// Encodes an item as a self-describing JSON record
///
/// The record is framed by the queue; this function only produces the payload.
pub fn encode_item(item: &Item) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(item)?)
}

/// Decodes an item record
///
/// Unknown fields are ignored and missing optional fields take their defaults,
/// so records written by newer or older versions remain readable.
pub fn decode_item(bytes: &[u8]) -> Result<Item, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_slice(bytes)?)
}
