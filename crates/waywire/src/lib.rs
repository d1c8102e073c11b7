//! Wayland wire protocol codec and traffic relay.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix sockets and the `SCM_RIGHTS` descriptor codec
//! - [`frame`]: Header, message framing, argument codec and the fd-carrying connection
//! - [`relay`]: Transparent two-way relay for watching traffic (behind `relay` feature)

/// Re-export transport types.
pub mod transport {
    pub use waywire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use waywire_frame::*;
}

/// Re-export relay types (requires `relay` feature).
#[cfg(feature = "relay")]
pub mod relay {
    pub use waywire_relay::*;
}
