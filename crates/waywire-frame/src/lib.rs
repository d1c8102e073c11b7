//! Wayland wire message framing.
//!
//! Every message starts with an 8-byte header:
//! - a 4-byte object id
//! - a 2-byte opcode and a 2-byte total size, packed in one host-order word
//!
//! followed by word-aligned arguments. [`split_messages`] and
//! [`join_messages`] convert between byte buffers and message batches,
//! [`ArgReader`]/[`ArgWriter`] walk the arguments inside a payload, and
//! [`WireConnection`] moves batches plus their file descriptors over a
//! socket, one `recvmsg`/`sendmsg` at a time.

pub mod args;
pub mod connection;
pub mod error;
pub mod framer;
pub mod header;

pub use args::{
    decode_array, decode_optional_string, decode_string, encode_array, encode_string, ArgReader,
    ArgWriter, Fixed,
};
pub use connection::{
    WireConfig, WireConnection, WireMessage, DEFAULT_ANCILLARY_BUFFER_SIZE,
    DEFAULT_READ_BUFFER_SIZE,
};
pub use error::{FrameError, Result};
pub use framer::{decode_message, encode_message, join_messages, split_messages, Message};
pub use header::{decode_header, encode_header, Header, HEADER_SIZE, MAX_MESSAGE_SIZE, WORD_SIZE};
