use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{decode_header, encode_header, Header, HEADER_SIZE, MAX_MESSAGE_SIZE, WORD_SIZE};

/// One protocol message: header plus the payload its size declares.
///
/// The payload is kept as raw bytes; use [`ArgReader`](crate::ArgReader) to
/// walk its word-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    /// Exactly `header.size - 8` bytes.
    pub payload: Bytes,
}

impl Message {
    /// Build a message, deriving `size` from the payload length.
    ///
    /// Fails with `InvalidSize` when the payload is not word aligned or the
    /// total would not fit the 16-bit size field.
    pub fn new(object_id: u32, opcode: u16, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let size = HEADER_SIZE + payload.len();
        if size > MAX_MESSAGE_SIZE || payload.len() % WORD_SIZE != 0 {
            return Err(FrameError::InvalidSize { size });
        }
        Ok(Self {
            header: Header {
                object_id,
                opcode,
                size: size as u16,
            },
            payload,
        })
    }

    pub fn object_id(&self) -> u32 {
        self.header.object_id
    }

    pub fn opcode(&self) -> u16 {
        self.header.opcode
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Append one message to `dst`.
pub fn encode_message(message: &Message, dst: &mut BytesMut) {
    debug_assert_eq!(message.header.size as usize, message.wire_size());
    dst.reserve(message.wire_size());
    dst.put_slice(&encode_header(&message.header));
    dst.put_slice(&message.payload);
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete message yet.
/// An invalid size is reported as soon as the header is readable, so a
/// zero-length declaration can never stall the caller.
pub fn decode_message(src: &mut BytesMut) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = decode_header(&src[..])?;
    if !header.is_valid() {
        return Err(FrameError::InvalidSize {
            size: header.size as usize,
        });
    }

    let size = header.size as usize;
    if src.len() < size {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(size - HEADER_SIZE).freeze();
    Ok(Some(Message { header, payload }))
}

/// Split a buffer holding whole messages into a batch, in wire order.
///
/// The buffer must end exactly on a message boundary: a trailing partial
/// header fails with `TruncatedHeader`, a partial body with `ShortMessage`.
/// Nothing is carried over between calls.
pub fn split_messages(buf: &[u8]) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    let mut rest = buf;

    while !rest.is_empty() {
        let header = decode_header(rest)?;
        let size = header.size as usize;
        if !header.is_valid() {
            return Err(FrameError::InvalidSize { size });
        }
        if rest.len() < size {
            return Err(FrameError::ShortMessage {
                declared: size,
                available: rest.len(),
            });
        }

        messages.push(Message {
            header,
            payload: Bytes::copy_from_slice(&rest[HEADER_SIZE..size]),
        });
        rest = &rest[size..];
    }

    Ok(messages)
}

/// Concatenate a batch back into its wire bytes.
pub fn join_messages(messages: &[Message]) -> Bytes {
    let total = messages.iter().map(Message::wire_size).sum();
    let mut buf = BytesMut::with_capacity(total);
    for message in messages {
        encode_message(message, &mut buf);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> Vec<Message> {
        vec![
            Message::new(1, 0, vec![0x01u8, 0x00, 0x00, 0x00]).unwrap(),
            Message::new(3, 2, Bytes::new()).unwrap(),
            Message::new(0xff00_0000, 9, vec![0xABu8; 64]).unwrap(),
        ]
    }

    #[test]
    fn single_message_scenario() {
        let header = Header {
            object_id: 1,
            opcode: 0,
            size: 12,
        };
        let mut wire = encode_header(&header).to_vec();
        wire.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);

        let batch = split_messages(&wire).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].header, header);
        assert_eq!(batch[0].payload.as_ref(), &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn split_join_roundtrip() {
        let batch = sample_batch();
        let wire = join_messages(&batch);
        assert_eq!(wire.len(), 12 + 8 + 72);
        assert_eq!(split_messages(&wire).unwrap(), batch);
    }

    #[test]
    fn empty_buffer_is_empty_batch() {
        assert!(split_messages(&[]).unwrap().is_empty());
        assert!(join_messages(&[]).is_empty());
    }

    #[test]
    fn short_buffer_is_truncated_header() {
        let err = split_messages(&[1, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, FrameError::TruncatedHeader { available: 5 }));
    }

    #[test]
    fn trailing_partial_header_is_truncated_header() {
        let mut wire = join_messages(&sample_batch()).to_vec();
        wire.extend_from_slice(&[0u8; 3]);
        let err = split_messages(&wire).unwrap_err();
        assert!(matches!(err, FrameError::TruncatedHeader { available: 3 }));
    }

    #[test]
    fn last_message_cut_short() {
        let wire = join_messages(&sample_batch());
        let err = split_messages(&wire[..wire.len() - 4]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::ShortMessage {
                declared: 72,
                available: 68
            }
        ));
    }

    #[test]
    fn zero_size_is_rejected_not_looped() {
        let header = Header {
            object_id: 1,
            opcode: 0,
            size: 0,
        };
        let wire = encode_header(&header);
        assert!(matches!(
            split_messages(&wire),
            Err(FrameError::InvalidSize { size: 0 })
        ));

        let mut buf = BytesMut::from(&wire[..]);
        assert!(matches!(
            decode_message(&mut buf),
            Err(FrameError::InvalidSize { size: 0 })
        ));
    }

    #[test]
    fn unaligned_size_is_rejected() {
        let header = Header {
            object_id: 1,
            opcode: 0,
            size: 10,
        };
        let mut wire = encode_header(&header).to_vec();
        wire.extend_from_slice(&[0, 0]);
        assert!(matches!(
            split_messages(&wire),
            Err(FrameError::InvalidSize { size: 10 })
        ));
    }

    #[test]
    fn decode_message_waits_for_more() {
        let wire = join_messages(&sample_batch());
        let mut buf = BytesMut::from(&wire[..6]);
        assert!(decode_message(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[6..10]);
        assert!(decode_message(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[10..]);
        let mut decoded = Vec::new();
        while let Some(message) = decode_message(&mut buf).unwrap() {
            decoded.push(message);
        }
        assert_eq!(decoded, sample_batch());
        assert!(buf.is_empty());
    }

    #[test]
    fn new_rejects_bad_payloads() {
        assert!(matches!(
            Message::new(1, 0, vec![0u8; 3]),
            Err(FrameError::InvalidSize { size: 11 })
        ));
        assert!(matches!(
            Message::new(1, 0, vec![0u8; MAX_MESSAGE_SIZE]),
            Err(FrameError::InvalidSize { .. })
        ));
        let message = Message::new(5, 1, vec![0u8; 8]).unwrap();
        assert_eq!(message.header.size, 16);
        assert_eq!(message.wire_size(), 16);
        assert_eq!((message.object_id(), message.opcode()), (5, 1));
    }
}
