use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};
use waywire_frame::WireConfig;
use waywire_transport::{TransportError, WireListener, WireStream};

use crate::error::{RelayError, Result};
use crate::observer::{Observer, TracingObserver};
use crate::relay::{relay, RelayReport};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where the relay listens and where it forwards to.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket path clients connect to.
    pub listen_path: PathBuf,
    /// Socket path of the real server, dialed once per accepted client.
    pub upstream_path: PathBuf,
    /// Buffer sizing and timeouts for both legs.
    pub wire: WireConfig,
}

impl RelayConfig {
    pub fn new(listen_path: impl Into<PathBuf>, upstream_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_path: listen_path.into(),
            upstream_path: upstream_path.into(),
            wire: WireConfig::default(),
        }
    }
}

/// A running relay session for one accepted client.
pub struct RelaySession {
    id: u64,
    handle: thread::JoinHandle<Result<RelayReport>>,
}

impl RelaySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for both directions to finish.
    pub fn join(self) -> Result<RelayReport> {
        self.handle.join().unwrap_or_else(|_| {
            Err(RelayError::Spawn(std::io::Error::other(
                "relay session thread panicked",
            )))
        })
    }
}

/// Accepts clients and relays each one to a fresh upstream connection.
pub struct RelayServer {
    listener: WireListener,
    config: RelayConfig,
    observer: Arc<dyn Observer>,
    next_session: AtomicU64,
}

impl RelayServer {
    /// Bind the listening socket. The upstream is not contacted until a
    /// client arrives.
    pub fn bind(config: RelayConfig) -> Result<Self> {
        let listener = WireListener::bind(&config.listen_path)?;
        Ok(Self {
            listener,
            config,
            observer: Arc::new(TracingObserver),
            next_session: AtomicU64::new(1),
        })
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Accept one client, dial upstream and start relaying on a new thread.
    pub fn accept(&self) -> Result<RelaySession> {
        let client = self.listener.accept()?;
        self.start_session(client)
    }

    /// Accept clients until `running` is cleared.
    ///
    /// Upstream dial failures end only that client's session; listener
    /// failures end the loop. Sessions keep running after this returns.
    pub fn serve(&self, running: &AtomicBool) -> Result<()> {
        self.listener.set_nonblocking(true)?;

        while running.load(Ordering::SeqCst) {
            let client = match self.listener.accept() {
                Ok(client) => client,
                Err(TransportError::Accept(err)) if is_retryable(err.kind()) => {
                    if err.kind() == ErrorKind::WouldBlock {
                        thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            client.set_nonblocking(false)?;

            match self.start_session(client) {
                Ok(session) => debug!(session = session.id(), "session started"),
                Err(RelayError::Transport(err @ TransportError::Connect { .. })) => {
                    warn!(error = %err, "upstream unavailable; dropping client");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn start_session(&self, client: WireStream) -> Result<RelaySession> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let upstream = WireListener::connect(&self.config.upstream_path)?;

        match client.peer_credentials() {
            Some((uid, _gid, pid)) => info!(session = id, uid, pid, "client connected"),
            None => info!(session = id, "client connected"),
        }

        let wire = self.config.wire.clone();
        let observer = Arc::clone(&self.observer);
        let handle = thread::Builder::new()
            .name(format!("relay-session-{id}"))
            .spawn(move || {
                let _session = info_span!("session", id).entered();
                match relay(client, upstream, &wire, observer) {
                    Ok(report) => {
                        info!(
                            requests = report.client_to_server.messages,
                            events = report.server_to_client.messages,
                            "session ended"
                        );
                        Ok(report)
                    }
                    Err(err) => {
                        warn!(error = %err, "session setup failed");
                        Err(err)
                    }
                }
            })
            .map_err(RelayError::Spawn)?;

        Ok(RelaySession { id, handle })
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

fn is_retryable(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use waywire_frame::{ArgWriter, FrameError, WireConnection, WireMessage};

    use super::*;
    use crate::observer::NullObserver;

    fn make_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/wwr-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn relays_one_client_to_upstream() {
        let dir = make_dir("one");
        let upstream = WireListener::bind(dir.join("upstream.sock")).expect("upstream should bind");
        let server = RelayServer::bind(RelayConfig::new(
            dir.join("relay.sock"),
            dir.join("upstream.sock"),
        ))
        .expect("relay should bind")
        .with_observer(Arc::new(NullObserver));

        let relay_path = server.path().to_path_buf();
        let client = thread::spawn(move || {
            let stream = WireListener::connect(&relay_path).expect("client should connect");
            let mut conn = WireConnection::new(stream);
            let hello = ArgWriter::new().new_id(2).into_message(1, 1).unwrap();
            conn.send(&WireMessage::new(vec![hello])).unwrap();
            let reply = conn.receive().expect("reply should arrive");
            assert_eq!(reply.messages[0].object_id(), 2);
        });

        let session = server.accept().expect("session should start");
        let mut upstream_conn = WireConnection::new(upstream.accept().expect("relay should dial"));
        let request = upstream_conn.receive().expect("request should be relayed");
        assert_eq!(request.messages[0].object_id(), 1);

        let done = ArgWriter::new().uint(0).into_message(2, 0).unwrap();
        upstream_conn.send(&WireMessage::new(vec![done])).unwrap();

        client.join().expect("client thread should finish");
        let report = session.join().expect("session should end cleanly");
        assert_eq!(report.client_to_server.messages, 1);
        assert_eq!(report.server_to_client.messages, 1);

        drop(upstream_conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_upstream_fails_session() {
        let dir = make_dir("noup");
        let server = RelayServer::bind(RelayConfig::new(
            dir.join("relay.sock"),
            dir.join("absent.sock"),
        ))
        .expect("relay should bind");

        let relay_path = server.path().to_path_buf();
        let client = thread::spawn(move || {
            let stream = WireListener::connect(&relay_path).expect("client should connect");
            let mut conn = WireConnection::new(stream);
            matches!(conn.receive(), Err(FrameError::ConnectionClosed))
        });

        let result = server.accept();
        assert!(matches!(
            result,
            Err(RelayError::Transport(TransportError::Connect { .. }))
        ));
        drop(result);
        assert!(client.join().expect("client thread should finish"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn session_setup_failure_is_reported() {
        let dir = make_dir("setup");
        let upstream = WireListener::bind(dir.join("upstream.sock")).expect("upstream should bind");
        let mut config = RelayConfig::new(dir.join("relay.sock"), dir.join("upstream.sock"));
        // A zero timeout is rejected by the socket layer.
        config.wire.read_timeout = Some(Duration::ZERO);
        let server = RelayServer::bind(config).expect("relay should bind");

        let relay_path = server.path().to_path_buf();
        let client = thread::spawn(move || {
            let stream = WireListener::connect(&relay_path).expect("client should connect");
            let mut conn = WireConnection::new(stream);
            matches!(conn.receive(), Err(FrameError::ConnectionClosed))
        });

        let session = server.accept().expect("session should start");
        let _upstream_side = upstream.accept().expect("relay should dial");
        assert!(matches!(
            session.join(),
            Err(RelayError::Frame(FrameError::ReadFailed(_)))
        ));
        assert!(client.join().expect("client thread should finish"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn serve_stops_when_flag_cleared() {
        let dir = make_dir("serve");
        let server = RelayServer::bind(RelayConfig::new(
            dir.join("relay.sock"),
            dir.join("absent.sock"),
        ))
        .expect("relay should bind");

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            flag.store(false, Ordering::SeqCst);
        });

        server.serve(&running).expect("serve should stop cleanly");
        stopper.join().expect("stopper should finish");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
