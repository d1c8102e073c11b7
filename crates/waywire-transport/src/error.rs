use std::path::PathBuf;

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Ancillary control data could not be parsed.
    #[error("malformed ancillary data: {0}")]
    MalformedAncillary(#[from] AncillaryError),
}

/// Reasons a control-message buffer is rejected by the fd codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AncillaryError {
    /// Fewer bytes remain than a control-message header needs.
    #[error("truncated control message header at offset {offset} ({remaining} bytes left)")]
    TruncatedHeader { offset: usize, remaining: usize },

    /// The record length is smaller than its header or runs past the buffer.
    #[error("control message at offset {offset} declares length {len} ({available} bytes available)")]
    BadLength {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// The record is not an `SCM_RIGHTS` record.
    #[error("unexpected control message (level {level}, type {kind})")]
    Unrecognized { level: i32, kind: i32 },

    /// The descriptor array is not a whole number of descriptors.
    #[error("SCM_RIGHTS payload of {0} bytes is not a whole number of descriptors")]
    PartialDescriptor(usize),

    /// The kernel truncated control data because the receive buffer was too small.
    #[error("control data truncated by the kernel (receive buffer of {capacity} bytes)")]
    Truncated { capacity: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
