//! Word-encoded argument codec.
//!
//! Every argument starts on a 4-byte boundary. Integers, fixed-point values,
//! object ids and new ids take one word. Strings and arrays are a length word
//! followed by their bytes, zero padded to the next word:
//! ```text
//! string "hi":  [3, 0, 0, 0] ['h', 'i', 0, 0]     length counts the NUL
//! array  [9]:   [1, 0, 0, 0] [9, 0, 0, 0]         length is the byte count
//! null string:  [0, 0, 0, 0]                      no payload words
//! ```
//! File descriptor arguments occupy no payload bytes; they travel in the
//! ancillary channel of the read or write that carries the message.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::framer::Message;
use crate::header::{read_word, WORD_SIZE};

/// Signed 24.8 fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(pub i32);

impl Fixed {
    pub fn from_f64(value: f64) -> Self {
        Self((value * 256.0).round() as i32)
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.0) / 256.0
    }

    pub fn from_int(value: i32) -> Self {
        Self(value.wrapping_shl(8))
    }

    /// Integer part, rounded toward zero.
    pub fn to_int(self) -> i32 {
        self.0 / 256
    }
}

/// Bytes occupied by `len` bytes once padded to a word boundary.
fn padded_len(len: usize) -> Option<usize> {
    len.checked_add(WORD_SIZE - 1).map(|v| v & !(WORD_SIZE - 1))
}

fn truncated(needed: usize, available: usize) -> FrameError {
    FrameError::TruncatedArgument { needed, available }
}

/// Length word plus padded body; returns (declared length, body, words consumed).
fn decode_counted(buf: &[u8]) -> Result<(usize, &[u8], usize)> {
    if buf.len() < WORD_SIZE {
        return Err(truncated(WORD_SIZE, buf.len()));
    }
    let len = read_word(buf) as usize;
    let needed = padded_len(len)
        .and_then(|p| p.checked_add(WORD_SIZE))
        .unwrap_or(usize::MAX);
    if buf.len() < needed {
        return Err(truncated(needed, buf.len()));
    }
    Ok((len, &buf[WORD_SIZE..WORD_SIZE + len], needed / WORD_SIZE))
}

fn encode_counted(len_word: usize, body: &[u8], dst: &mut BytesMut) -> usize {
    let padded = padded_len(body.len()).unwrap_or(body.len());
    dst.reserve(WORD_SIZE + padded);
    dst.put_u32_ne(len_word as u32);
    dst.put_slice(body);
    dst.put_bytes(0, padded - body.len());
    1 + padded / WORD_SIZE
}

/// Decode a string argument from the front of `buf`.
///
/// Returns the text without its terminator and the words consumed, length
/// word included. A zero length (null string) decodes as `""` in one word.
pub fn decode_string(buf: &[u8]) -> Result<(&str, usize)> {
    let (text, words) = decode_optional_string(buf)?;
    Ok((text.unwrap_or(""), words))
}

/// Like [`decode_string`], but a zero length decodes as `None`.
pub fn decode_optional_string(buf: &[u8]) -> Result<(Option<&str>, usize)> {
    let (len, body, words) = decode_counted(buf)?;
    if len == 0 {
        return Ok((None, words));
    }
    let text = std::str::from_utf8(&body[..len - 1])?;
    Ok((Some(text), words))
}

/// Append a string argument to `dst`; returns the words written.
pub fn encode_string(text: &str, dst: &mut BytesMut) -> usize {
    let mut body = Vec::with_capacity(text.len() + 1);
    body.extend_from_slice(text.as_bytes());
    body.push(0);
    encode_counted(body.len(), &body, dst)
}

/// Decode an array argument from the front of `buf`.
///
/// Returns exactly the declared bytes and the words consumed, length word
/// included.
pub fn decode_array(buf: &[u8]) -> Result<(&[u8], usize)> {
    let (_, body, words) = decode_counted(buf)?;
    Ok((body, words))
}

/// Append an array argument to `dst`; returns the words written.
pub fn encode_array(bytes: &[u8], dst: &mut BytesMut) -> usize {
    encode_counted(bytes.len(), bytes, dst)
}

/// Sequential reader over a message payload.
#[derive(Debug, Clone)]
pub struct ArgReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ArgReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            buf: payload,
            pos: 0,
        }
    }

    pub fn for_message(message: &'a Message) -> Self {
        Self::new(&message.payload)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn word(&mut self) -> Result<u32> {
        let rest = self.rest();
        if rest.len() < WORD_SIZE {
            return Err(truncated(WORD_SIZE, rest.len()));
        }
        self.pos += WORD_SIZE;
        Ok(read_word(rest))
    }

    pub fn int(&mut self) -> Result<i32> {
        self.word().map(|w| w as i32)
    }

    pub fn uint(&mut self) -> Result<u32> {
        self.word()
    }

    pub fn fixed(&mut self) -> Result<Fixed> {
        self.int().map(Fixed)
    }

    /// Object id; 0 is the null object.
    pub fn object(&mut self) -> Result<u32> {
        self.word()
    }

    pub fn new_id(&mut self) -> Result<u32> {
        self.word()
    }

    pub fn string(&mut self) -> Result<&'a str> {
        let (text, words) = decode_string(self.rest())?;
        self.pos += words * WORD_SIZE;
        Ok(text)
    }

    pub fn optional_string(&mut self) -> Result<Option<&'a str>> {
        let (text, words) = decode_optional_string(self.rest())?;
        self.pos += words * WORD_SIZE;
        Ok(text)
    }

    pub fn array(&mut self) -> Result<&'a [u8]> {
        let (bytes, words) = decode_array(self.rest())?;
        self.pos += words * WORD_SIZE;
        Ok(bytes)
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Builder for a word-encoded message payload.
#[derive(Debug, Default)]
pub struct ArgWriter {
    buf: BytesMut,
}

impl ArgWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int(mut self, value: i32) -> Self {
        self.buf.put_i32_ne(value);
        self
    }

    pub fn uint(mut self, value: u32) -> Self {
        self.buf.put_u32_ne(value);
        self
    }

    pub fn fixed(self, value: Fixed) -> Self {
        self.int(value.0)
    }

    pub fn object(self, id: u32) -> Self {
        self.uint(id)
    }

    pub fn new_id(self, id: u32) -> Self {
        self.uint(id)
    }

    pub fn string(mut self, text: &str) -> Self {
        encode_string(text, &mut self.buf);
        self
    }

    /// `None` writes a null string (length 0).
    pub fn optional_string(mut self, text: Option<&str>) -> Self {
        match text {
            Some(text) => {
                encode_string(text, &mut self.buf);
            }
            None => self.buf.put_u32_ne(0),
        }
        self
    }

    pub fn array(mut self, bytes: &[u8]) -> Self {
        encode_array(bytes, &mut self.buf);
        self
    }

    /// Encoded payload length so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Wrap the payload in a message header.
    pub fn into_message(self, object_id: u32, opcode: u16) -> Result<Message> {
        Message::new(object_id, opcode, self.finish())
    }
}
