use std::fmt;
use std::io;

use waywire_frame::FrameError;
use waywire_relay::RelayError;
use waywire_transport::{AncillaryError, TransportError};

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Exit code a failure maps to when it ends the process.
pub trait ExitCode {
    fn exit_code(&self) -> i32;
}

impl ExitCode for io::Error {
    fn exit_code(&self) -> i32 {
        match self.kind() {
            io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
            io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
            _ => INTERNAL,
        }
    }
}

impl ExitCode for AncillaryError {
    fn exit_code(&self) -> i32 {
        TRANSPORT_ERROR
    }
}

impl ExitCode for TransportError {
    fn exit_code(&self) -> i32 {
        match self {
            TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Accept(source)
            | TransportError::Io(source) => source.exit_code(),
            TransportError::PathTooLong { .. } => USAGE,
            TransportError::MalformedAncillary(err) => err.exit_code(),
        }
    }
}

impl ExitCode for FrameError {
    fn exit_code(&self) -> i32 {
        match self {
            FrameError::ReadFailed(source) | FrameError::WriteFailed(source) => source.exit_code(),
            FrameError::ConnectionClosed => FAILURE,
            FrameError::MalformedAncillary(err) => err.exit_code(),
            FrameError::TruncatedHeader { .. }
            | FrameError::InvalidSize { .. }
            | FrameError::ShortMessage { .. }
            | FrameError::TruncatedArgument { .. }
            | FrameError::InvalidUtf8(_) => DATA_INVALID,
        }
    }
}

impl ExitCode for RelayError {
    fn exit_code(&self) -> i32 {
        match self {
            RelayError::Transport(err) => err.exit_code(),
            RelayError::Frame(err) => err.exit_code(),
            RelayError::Spawn(_) => INTERNAL,
        }
    }
}

/// Turn a library failure into a [`CliError`] prefixed with `context`.
pub trait OrExit<T> {
    fn or_exit(self, context: &str) -> CliResult<T>;
}

impl<T, E> OrExit<T> for Result<T, E>
where
    E: ExitCode + fmt::Display,
{
    fn or_exit(self, context: &str) -> CliResult<T> {
        self.map_err(|err| CliError::new(err.exit_code(), format!("{context}: {err}")))
    }
}
