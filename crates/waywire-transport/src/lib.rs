//! Unix domain socket transport for Wayland-style IPC.
//!
//! This is the lowest layer of waywire:
//! - [`WireListener`] binds, accepts and connects socket paths
//! - [`WireStream`] is a connected socket whose `sendmsg`/`recvmsg` keep
//!   payload and file descriptors in one system call
//! - [`fds`] converts descriptor lists to and from `SCM_RIGHTS` control data
//!
//! Everything else builds on the [`WireStream`] type provided here.

pub mod error;

#[cfg(unix)]
pub mod fds;
#[cfg(unix)]
pub mod listener;
#[cfg(unix)]
pub mod stream;

pub use error::{AncillaryError, Result, TransportError};

#[cfg(unix)]
pub use fds::{ancillary_space, decode_fds, decode_fds_lossy, encode_fds};
#[cfg(unix)]
pub use listener::WireListener;
#[cfg(unix)]
pub use stream::{Received, WireStream};
