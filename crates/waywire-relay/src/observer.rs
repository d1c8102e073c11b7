use std::fmt;

use tracing::debug;
use waywire_frame::WireMessage;

/// Which way a batch is travelling through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the accepted client (leg A) to the upstream server (leg B).
    ClientToServer,
    /// From the upstream server (leg B) back to the client (leg A).
    ServerToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToServer => "client->server",
            Direction::ServerToClient => "server->client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sees every batch before it is forwarded.
///
/// Observation is read-only: the relay forwards the batch unchanged no
/// matter what the observer does. Called from the pump threads, so it must
/// be shareable.
pub trait Observer: Send + Sync {
    fn observe(&self, direction: Direction, wire: &WireMessage);
}

impl<F> Observer for F
where
    F: Fn(Direction, &WireMessage) + Send + Sync,
{
    fn observe(&self, direction: Direction, wire: &WireMessage) {
        self(direction, wire)
    }
}

/// Ignores all traffic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn observe(&self, _direction: Direction, _wire: &WireMessage) {}
}

/// Logs one `debug` event per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, direction: Direction, wire: &WireMessage) {
        for message in &wire.messages {
            debug!(
                %direction,
                object_id = message.header.object_id,
                opcode = message.header.opcode,
                size = message.header.size,
                fds = wire.fds.len(),
                "message"
            );
        }
    }
}
