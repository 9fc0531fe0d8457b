//! Length-prefixed framing shared by the data file and the WAL
//!
//! Every record is a 4-byte little-endian payload length followed by the
//! payload. A frame whose prefix or payload runs past the end of the file is
//! a torn write and ends iteration.

use super::{QueueError, QueueResult};

/// Size of the length prefix in bytes
pub const PREFIX_LEN: usize = 4;

/// Appends a framed payload to `out` and returns the framed size
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) -> QueueResult<u64> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        QueueError::Codec(format!("record of {} bytes is too large", payload.len()))
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok((PREFIX_LEN + payload.len()) as u64)
}

/// Returns the payload of a single complete frame
///
/// The length prefix must describe exactly the rest of `bytes`.
pub fn decode_frame(bytes: &[u8]) -> QueueResult<&[u8]> {
    if bytes.len() < PREFIX_LEN {
        return Err(QueueError::Codec(format!(
            "frame of {} bytes is shorter than its prefix",
            bytes.len()
        )));
    }
    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&bytes[..PREFIX_LEN]);
    let len = u32::from_le_bytes(prefix) as usize;
    if len != bytes.len() - PREFIX_LEN {
        return Err(QueueError::Codec(format!(
            "frame prefix says {} bytes, record holds {}",
            len,
            bytes.len() - PREFIX_LEN
        )));
    }
    Ok(&bytes[PREFIX_LEN..])
}

/// Iterator over the complete frames of a buffer
///
/// Yields `(offset, payload)` pairs. Iteration stops at the first incomplete
/// frame; its offset is then available through [`Frames::torn_tail`].
pub struct Frames<'a> {
    buf: &'a [u8],
    offset: usize,
    torn_tail: Option<u64>,
}

impl<'a> Frames<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            torn_tail: None,
        }
    }

    /// Offset of a trailing incomplete frame, if iteration hit one
    pub fn torn_tail(&self) -> Option<u64> {
        self.torn_tail
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = (u64, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.buf.len() - self.offset;
        if remaining == 0 || self.torn_tail.is_some() {
            return None;
        }

        if remaining < PREFIX_LEN {
            self.torn_tail = Some(self.offset as u64);
            return None;
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.buf[self.offset..self.offset + PREFIX_LEN]);
        let len = u32::from_le_bytes(prefix) as usize;

        if remaining - PREFIX_LEN < len {
            self.torn_tail = Some(self.offset as u64);
            return None;
        }

        let start = self.offset + PREFIX_LEN;
        let frame = (self.offset as u64, &self.buf[start..start + len]);
        self.offset = start + len;
        Some(frame)
    }
}
