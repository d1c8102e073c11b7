use std::net::Shutdown;
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn, Span};
use waywire_frame::{FrameError, WireConfig, WireConnection};
use waywire_transport::WireStream;

use crate::error::{RelayError, Result};
use crate::observer::{Direction, Observer};

/// Traffic counters and the terminating error for one direction.
#[derive(Debug)]
pub struct DirectionReport {
    pub direction: Direction,
    /// Physical receives forwarded.
    pub batches: u64,
    pub messages: u64,
    pub fds: u64,
    /// Why the pump stopped. `ConnectionClosed` is the orderly case.
    pub error: FrameError,
}

impl DirectionReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            batches: 0,
            messages: 0,
            fds: 0,
            error: FrameError::ConnectionClosed,
        }
    }

    /// Whether the pump ended because a peer closed its connection.
    pub fn closed_cleanly(&self) -> bool {
        matches!(self.error, FrameError::ConnectionClosed)
    }
}

/// Outcome of a finished relay session.
#[derive(Debug)]
pub struct RelayReport {
    pub client_to_server: DirectionReport,
    pub server_to_client: DirectionReport,
}

/// Relay traffic between `client` (leg A) and `server` (leg B) until either
/// side fails or closes.
///
/// Two pumps run concurrently, one per direction, each doing
/// `receive` → observe → `send` strictly in sequence. Whichever pump stops
/// first shuts down both sockets, which wakes the other pump. Both pumps are
/// joined before this returns, and both sockets are closed.
pub fn relay(
    client: WireStream,
    server: WireStream,
    config: &WireConfig,
    observer: Arc<dyn Observer>,
) -> Result<RelayReport> {
    let client_reader = WireConnection::with_config(client.try_clone()?, config.clone())?;
    let server_reader = WireConnection::with_config(server.try_clone()?, config.clone())?;
    let client_writer = WireConnection::with_config(client, config.clone())?;
    let server_writer = WireConnection::with_config(server, config.clone())?;

    let upstream_observer = Arc::clone(&observer);
    let span = Span::current();
    let downstream = thread::Builder::new()
        .name("relay-server->client".to_string())
        .spawn(move || {
            let _span = span.entered();
            pump(
                Direction::ServerToClient,
                server_reader,
                client_writer,
                upstream_observer.as_ref(),
            )
        })
        .map_err(RelayError::Spawn)?;

    let client_to_server = pump(
        Direction::ClientToServer,
        client_reader,
        server_writer,
        observer.as_ref(),
    );

    let server_to_client = downstream.join().unwrap_or_else(|_| {
        let mut report = DirectionReport::new(Direction::ServerToClient);
        report.error = FrameError::ReadFailed(std::io::Error::other("pump thread panicked"));
        report
    });

    Ok(RelayReport {
        client_to_server,
        server_to_client,
    })
}

fn pump(
    direction: Direction,
    mut from: WireConnection,
    mut to: WireConnection,
    observer: &dyn Observer,
) -> DirectionReport {
    let mut report = DirectionReport::new(direction);

    report.error = loop {
        let wire = match from.receive() {
            Ok(wire) => wire,
            Err(err) => break err,
        };

        observer.observe(direction, &wire);

        if let Err(err) = to.send(&wire) {
            break err;
        }

        report.batches += 1;
        report.messages += wire.messages.len() as u64;
        report.fds += wire.fds.len() as u64;
        // `wire` drops here, closing our copies of the forwarded descriptors.
    };

    if report.closed_cleanly() {
        debug!(%direction, messages = report.messages, "pump finished");
    } else {
        warn!(%direction, error = %report.error, "pump failed");
    }

    // Wake the opposite pump: its blocking read sees end-of-file.
    let _ = from.stream().shutdown(Shutdown::Both);
    let _ = to.stream().shutdown(Shutdown::Both);

    report
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use std::sync::Mutex;
    use std::time::Duration;

    use waywire_frame::{ArgWriter, Message, WireMessage};

    use super::*;
    use crate::observer::NullObserver;

    struct Legs {
        /// Client's own end of leg A.
        client: WireConnection,
        /// Server's own end of leg B.
        server: WireConnection,
        handle: thread::JoinHandle<RelayReport>,
    }

    fn start(observer: Arc<dyn Observer>) -> Legs {
        let (client, relay_a) = WireStream::pair().unwrap();
        let (server, relay_b) = WireStream::pair().unwrap();
        let handle = thread::spawn(move || {
            relay(relay_a, relay_b, &WireConfig::default(), observer).unwrap()
        });
        Legs {
            client: WireConnection::new(client),
            server: WireConnection::new(server),
            handle,
        }
    }

    fn bind_and_sync() -> Vec<Message> {
        vec![
            ArgWriter::new()
                .new_id(2)
                .into_message(1, 1)
                .unwrap(),
            ArgWriter::new()
                .new_id(3)
                .into_message(1, 0)
                .unwrap(),
        ]
    }

    #[test]
    fn forwards_batch_and_descriptor() {
        let mut legs = start(Arc::new(NullObserver));
        let (mine, mut theirs) = UnixStream::pair().unwrap();

        let wire = WireMessage::with_fds(bind_and_sync(), vec![OwnedFd::from(mine)]);
        legs.client.send(&wire).unwrap();
        drop(wire);

        let got = legs.server.receive().unwrap();
        assert_eq!(got.messages, bind_and_sync());
        assert_eq!(got.fds.len(), 1);

        let mut forwarded = UnixStream::from(got.fds.into_iter().next().unwrap());
        forwarded.write_all(b"ok").unwrap();
        let mut out = [0u8; 2];
        theirs.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"ok");

        drop(legs.client);
        let report = legs.handle.join().unwrap();
        assert_eq!(report.client_to_server.messages, 2);
        assert_eq!(report.client_to_server.fds, 1);
        assert!(report.client_to_server.closed_cleanly());
    }

    #[test]
    fn forwards_both_directions_in_order() {
        let mut legs = start(Arc::new(NullObserver));

        for i in 0..8u32 {
            let request = ArgWriter::new().uint(i).into_message(10 + i, 0).unwrap();
            legs.client.send(&WireMessage::new(vec![request])).unwrap();
            let event = ArgWriter::new().uint(i).into_message(20 + i, 1).unwrap();
            legs.server.send(&WireMessage::new(vec![event])).unwrap();
        }

        let mut requests = Vec::new();
        while requests.len() < 8 {
            requests.extend(legs.server.receive().unwrap().messages);
        }
        let mut events = Vec::new();
        while events.len() < 8 {
            events.extend(legs.client.receive().unwrap().messages);
        }

        assert_eq!(
            requests.iter().map(Message::object_id).collect::<Vec<_>>(),
            (10..18).collect::<Vec<_>>()
        );
        assert_eq!(
            events.iter().map(Message::object_id).collect::<Vec<_>>(),
            (20..28).collect::<Vec<_>>()
        );

        drop(legs.server);
        let report = legs.handle.join().unwrap();
        assert_eq!(report.server_to_client.messages, 8);
        assert_eq!(report.client_to_server.messages, 8);
    }

    #[test]
    fn closing_client_ends_both_pumps() {
        let legs = start(Arc::new(NullObserver));
        let mut server = legs.server;

        // Leg B stays idle; only leg A goes away.
        drop(legs.client);

        let report = legs.handle.join().unwrap();
        assert!(report.client_to_server.closed_cleanly());
        assert!(report.server_to_client.closed_cleanly());

        // The relay closed its end of leg B too.
        server
            .stream()
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert!(matches!(server.receive(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn corrupt_stream_ends_session() {
        let (mut raw_client, relay_a) = WireStream::pair().unwrap();
        let (server, relay_b) = WireStream::pair().unwrap();
        let handle = thread::spawn(move || {
            relay(relay_a, relay_b, &WireConfig::default(), Arc::new(NullObserver)).unwrap()
        });

        // size 0 can never be framed
        raw_client.write_all(&[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        let report = handle.join().unwrap();
        assert!(matches!(
            report.client_to_server.error,
            FrameError::InvalidSize { size: 0 }
        ));

        let mut server = WireConnection::new(server);
        assert!(matches!(server.receive(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn observer_sees_every_batch_unchanged() {
        let seen: Arc<Mutex<Vec<(Direction, u32)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let observer = move |direction: Direction, wire: &WireMessage| {
            let mut seen = sink.lock().unwrap();
            seen.extend(wire.messages.iter().map(|m| (direction, m.object_id())));
        };

        let mut legs = start(Arc::new(observer));
        legs.client
            .send(&WireMessage::new(bind_and_sync()))
            .unwrap();
        let got = legs.server.receive().unwrap();
        assert_eq!(got.messages, bind_and_sync());

        drop(legs.client);
        legs.handle.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[
                (Direction::ClientToServer, 1),
                (Direction::ClientToServer, 1)
            ]
        );
    }
}
