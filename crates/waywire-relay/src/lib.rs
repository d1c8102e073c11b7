//! Transparent two-way relay for observing Wayland-style IPC traffic.
//!
//! A [`RelayServer`] listens where clients expect the compositor, dials the
//! real compositor for every accepted client, and pumps batches (with their
//! file descriptors) both ways without changing them. An [`Observer`] gets a
//! look at each batch on the way through.

pub mod error;
pub mod observer;
pub mod relay;
pub mod server;

pub use error::{RelayError, Result};
pub use observer::{Direction, NullObserver, Observer, TracingObserver};
pub use relay::{relay, DirectionReport, RelayReport};
pub use server::{RelayConfig, RelayServer, RelaySession};
