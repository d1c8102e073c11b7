use waywire_transport::AncillaryError;

/// Errors that can occur while framing, decoding or moving messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer than 8 bytes were available where a header was expected.
    #[error("truncated header ({available} of 8 bytes)")]
    TruncatedHeader { available: usize },

    /// The declared message size is below the header size or not word aligned.
    #[error("invalid message size {size}")]
    InvalidSize { size: usize },

    /// The declared message size exceeds the bytes available.
    #[error("short message (declared {declared} bytes, {available} available)")]
    ShortMessage { declared: usize, available: usize },

    /// A string or array argument runs past the end of the payload.
    #[error("truncated argument (needs {needed} bytes, {available} available)")]
    TruncatedArgument { needed: usize, available: usize },

    /// A string argument is not valid UTF-8.
    #[error("string argument is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The ancillary control data could not be parsed.
    #[error("malformed ancillary data: {0}")]
    MalformedAncillary(#[from] AncillaryError),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The socket read failed.
    #[error("read failed: {0}")]
    ReadFailed(std::io::Error),

    /// The socket write failed.
    #[error("write failed: {0}")]
    WriteFailed(std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
