use crate::error::{FrameError, Result};

/// Header size in bytes: object id (4) + opcode/size word (4).
pub const HEADER_SIZE: usize = 8;

/// Size of one argument word.
pub const WORD_SIZE: usize = 4;

/// Largest size a header can declare.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Fixed message header.
///
/// Wire format, host byte order:
/// ```text
/// ┌──────────────────┬─────────────────────────────────┐
/// │ Object ID (4B)   │ Size << 16 | Opcode (4B)        │
/// └──────────────────┴─────────────────────────────────┘
/// ```
/// On little-endian hosts this reads as `object_id | opcode | size`.
/// Both ends of a connection share the host, so the byte order is never
/// negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Object the message is addressed to (requests) or sent from (events).
    pub object_id: u32,
    /// Request or event index within the object's interface.
    pub opcode: u16,
    /// Total message length in bytes, header included.
    pub size: u16,
}

impl Header {
    /// Payload length implied by `size`, or `None` if `size` is below the header size.
    pub fn payload_len(&self) -> Option<usize> {
        (self.size as usize).checked_sub(HEADER_SIZE)
    }

    /// Whether `size` covers the header and is word aligned.
    pub fn is_valid(&self) -> bool {
        let size = self.size as usize;
        size >= HEADER_SIZE && size % WORD_SIZE == 0
    }
}

/// Encode a header into its 8 wire bytes.
pub fn encode_header(header: &Header) -> [u8; HEADER_SIZE] {
    let word = (u32::from(header.size) << 16) | u32::from(header.opcode);
    let mut out = [0u8; HEADER_SIZE];
    out[..4].copy_from_slice(&header.object_id.to_ne_bytes());
    out[4..].copy_from_slice(&word.to_ne_bytes());
    out
}

/// Decode a header from the front of `buf`.
///
/// Only the first 8 bytes are read; the size field is not validated here.
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    if buf.len() < HEADER_SIZE {
        return Err(FrameError::TruncatedHeader {
            available: buf.len(),
        });
    }

    let object_id = read_word(&buf[0..4]);
    let word = read_word(&buf[4..8]);

    Ok(Header {
        object_id,
        opcode: (word & 0xffff) as u16,
        size: (word >> 16) as u16,
    })
}

/// Read one native-endian word from a 4-byte slice.
pub(crate) fn read_word(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; WORD_SIZE];
    raw.copy_from_slice(&bytes[..WORD_SIZE]);
    u32::from_ne_bytes(raw)
}
