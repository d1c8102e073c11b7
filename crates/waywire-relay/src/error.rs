/// Errors that can occur while setting up or running a relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Transport-level error (bind, accept, connect).
    #[error("transport error: {0}")]
    Transport(#[from] waywire_transport::TransportError),

    /// Frame-level error while configuring a connection.
    #[error("frame error: {0}")]
    Frame(#[from] waywire_frame::FrameError),

    /// A pump or session thread could not be started.
    #[error("failed to spawn relay thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
