//! In-process relay between a toy client and a toy compositor.
//!
//! Run with:
//!   cargo run --example inspect-relay
//!
//! The compositor answers a `get_registry` request with one `global` event.
//! Every batch crossing the relay is printed by a closure observer.

use std::fs;
use std::sync::Arc;
use std::thread;

use waywire::frame::{ArgReader, ArgWriter, WireConnection, WireMessage};
use waywire::relay::{Direction, RelayConfig, RelayServer};
use waywire::transport::WireListener;

type DemoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn main() -> DemoResult<()> {
    let sock_dir = std::env::temp_dir().join(format!("waywire-inspect-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let compositor_path = sock_dir.join("wayland-test");
    let relay_path = sock_dir.join("wayland-relay");

    let compositor = WireListener::bind(&compositor_path)?;
    let compositor_thread = thread::spawn(move || -> DemoResult<()> {
        let stream = compositor.accept()?;
        let mut conn = WireConnection::new(stream);
        let request = conn.receive()?;
        for message in &request.messages {
            let registry = ArgReader::for_message(message).new_id()?;
            let global = ArgWriter::new()
                .uint(1)
                .string("wl_compositor")
                .uint(4)
                .into_message(registry, 0)?;
            conn.send(&WireMessage::new(vec![global]))?;
        }
        Ok(())
    });

    let server = RelayServer::bind(RelayConfig::new(&relay_path, &compositor_path))?
        .with_observer(Arc::new(|direction: Direction, wire: &WireMessage| {
            for message in &wire.messages {
                eprintln!(
                    "[{direction}] object={} opcode={} size={}",
                    message.object_id(),
                    message.opcode(),
                    message.wire_size()
                );
            }
        }));
    eprintln!("Relaying {} -> {}", relay_path.display(), compositor_path.display());

    let client_thread = thread::spawn(move || -> DemoResult<()> {
        let stream = WireListener::connect(&relay_path)?;
        let mut conn = WireConnection::new(stream);
        let get_registry = ArgWriter::new().new_id(2).into_message(1, 1)?;
        conn.send(&WireMessage::new(vec![get_registry]))?;

        let events = conn.receive()?;
        for message in &events.messages {
            let mut args = ArgReader::for_message(message);
            let name = args.uint()?;
            let interface = args.string()?;
            let version = args.uint()?;
            eprintln!("Client saw global {name}: {interface} v{version}");
        }
        Ok(())
    });

    let session = server.accept()?;
    client_thread.join().map_err(|_| "client thread panicked")??;
    compositor_thread
        .join()
        .map_err(|_| "compositor thread panicked")??;

    let report = session.join()?;
    eprintln!(
        "Session done: {} request(s), {} event(s)",
        report.client_to_server.messages, report.server_to_client.messages
    );

    drop(server);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
