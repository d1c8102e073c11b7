use std::io::ErrorKind;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace};
use waywire_transport::{
    decode_fds, decode_fds_lossy, encode_fds, AncillaryError, TransportError, WireStream,
};

use crate::error::{FrameError, Result};
use crate::framer::{decode_message, join_messages, Message};

/// Default payload bytes taken per socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Default control bytes accepted per socket read.
pub const DEFAULT_ANCILLARY_BUFFER_SIZE: usize = 4096;

/// Configuration for a [`WireConnection`].
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Payload capacity of one physical read. Messages larger than this are
    /// reassembled across reads.
    pub read_buffer_size: usize,
    /// Control-data capacity of one physical read. Bounds how many
    /// descriptors a single read can deliver; excess is reported as
    /// `MalformedAncillary` because the kernel discards it.
    pub ancillary_buffer_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            ancillary_buffer_size: DEFAULT_ANCILLARY_BUFFER_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Messages and descriptors exchanged in one receive or one send.
///
/// Descriptors belong to the transfer, not to a particular message. Received
/// descriptors are owned here and closed when the value is dropped.
#[derive(Debug, Default)]
pub struct WireMessage {
    pub messages: Vec<Message>,
    pub fds: Vec<OwnedFd>,
}

impl WireMessage {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            fds: Vec::new(),
        }
    }

    pub fn with_fds(messages: Vec<Message>, fds: Vec<OwnedFd>) -> Self {
        Self { messages, fds }
    }

    /// Total payload bytes of the batch, headers included.
    pub fn wire_size(&self) -> usize {
        self.messages.iter().map(Message::wire_size).sum()
    }
}

/// A socket speaking the message protocol: batches in, batches out.
pub struct WireConnection {
    stream: WireStream,
    config: WireConfig,
    pending: BytesMut,
    pending_fds: Vec<OwnedFd>,
    read_buf: Vec<u8>,
    ancillary_buf: Vec<u8>,
}

impl WireConnection {
    /// Wrap a connected stream with default configuration.
    pub fn new(stream: WireStream) -> Self {
        Self::build(stream, WireConfig::default())
    }

    /// Wrap a connected stream and apply timeouts from `config`.
    pub fn with_config(stream: WireStream, config: WireConfig) -> Result<Self> {
        stream
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        stream
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::build(stream, config))
    }

    fn build(stream: WireStream, config: WireConfig) -> Self {
        Self {
            read_buf: vec![0u8; config.read_buffer_size.max(1)],
            ancillary_buf: vec![0u8; config.ancillary_buffer_size],
            pending: BytesMut::with_capacity(config.read_buffer_size),
            pending_fds: Vec::new(),
            stream,
            config,
        }
    }

    /// Receive the next batch of complete messages (blocking).
    ///
    /// Normally a single socket read. When a read ends inside a message the
    /// tail is kept and the socket is read again until at least one message
    /// is complete; descriptors received meanwhile are returned with that
    /// batch.
    pub fn receive(&mut self) -> Result<WireMessage> {
        loop {
            let mut messages = Vec::new();
            while let Some(message) = decode_message(&mut self.pending)? {
                messages.push(message);
            }

            if !messages.is_empty() {
                let wire = WireMessage {
                    messages,
                    fds: std::mem::take(&mut self.pending_fds),
                };
                trace!(
                    messages = wire.messages.len(),
                    fds = wire.fds.len(),
                    carried = self.pending.len(),
                    "received batch"
                );
                return Ok(wire);
            }

            self.read_once()?;
        }
    }

    fn read_once(&mut self) -> Result<()> {
        let received = loop {
            match self
                .stream
                .recv_with_ancillary(&mut self.read_buf, &mut self.ancillary_buf)
            {
                Ok(received) => break received,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::ReadFailed(err)),
            }
        };

        // Every error below drops the descriptors of this read and any held
        // for the batch in progress, closing them.
        let ancillary = &self.ancillary_buf[..received.ancillary];
        if received.ancillary_truncated {
            let dropped = take_ownership(decode_fds_lossy(ancillary));
            debug!(closed = dropped.len(), "control data truncated");
            self.pending_fds.clear();
            return Err(AncillaryError::Truncated {
                capacity: self.ancillary_buf.len(),
            }
            .into());
        }

        match decode_fds(ancillary) {
            Ok(fds) => self.pending_fds.extend(take_ownership(fds)),
            Err(err) => {
                let dropped = take_ownership(decode_fds_lossy(ancillary));
                debug!(closed = dropped.len(), error = %err, "malformed control data");
                self.pending_fds.clear();
                return Err(err.into());
            }
        }

        if received.bytes == 0 {
            debug!(pending = self.pending.len(), "peer closed connection");
            return Err(FrameError::ConnectionClosed);
        }

        self.pending
            .extend_from_slice(&self.read_buf[..received.bytes]);
        Ok(())
    }

    /// Send a batch and its descriptors (blocking).
    ///
    /// Payload and control data leave in one `sendmsg`. If the kernel takes
    /// only part of the payload the rest follows without control data, since
    /// descriptors are delivered with the first byte.
    pub fn send(&mut self, wire: &WireMessage) -> Result<()> {
        if wire.messages.is_empty() {
            if wire.fds.is_empty() {
                return Ok(());
            }
            // Descriptors cannot travel without at least one payload byte.
            return Err(FrameError::InvalidSize { size: 0 });
        }

        let payload = join_messages(&wire.messages);
        let raw: Vec<RawFd> = wire.fds.iter().map(AsRawFd::as_raw_fd).collect();
        let control = encode_fds(&raw);

        let mut control: &[u8] = &control;
        let mut offset = 0usize;
        while offset < payload.len() {
            match self
                .stream
                .send_with_ancillary(&payload[offset..], control)
            {
                Ok(0) => {
                    return Err(FrameError::WriteFailed(std::io::Error::from(
                        ErrorKind::WriteZero,
                    )))
                }
                Ok(n) => {
                    offset += n;
                    control = &[];
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::WriteFailed(err)),
            }
        }

        trace!(
            messages = wire.messages.len(),
            fds = raw.len(),
            bytes = payload.len(),
            "sent batch"
        );
        Ok(())
    }

    /// Bytes of an incomplete message carried over to the next receive.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// Borrow the underlying stream.
    pub fn stream(&self) -> &WireStream {
        &self.stream
    }

    /// Current connection configuration.
    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Consume the connection and return the stream. Carried-over bytes and
    /// descriptors are dropped.
    pub fn into_inner(self) -> WireStream {
        self.stream
    }
}

impl std::fmt::Debug for WireConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireConnection")
            .field("stream", &self.stream)
            .field("pending", &self.pending.len())
            .field("pending_fds", &self.pending_fds.len())
            .finish()
    }
}

fn take_ownership(fds: Vec<RawFd>) -> Vec<OwnedFd> {
    fds.into_iter()
        .map(|fd| {
            // SAFETY: the descriptor was just installed by recvmsg and nothing
            // else in this process refers to it.
            unsafe { OwnedFd::from_raw_fd(fd) }
        })
        .collect()
}

fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::ReadFailed(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::ReadFailed(source)
        }
        TransportError::MalformedAncillary(err) => FrameError::MalformedAncillary(err),
        other => FrameError::ReadFailed(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::os::unix::net::UnixStream;

    use super::*;
    use crate::args::ArgWriter;
    use crate::header::{encode_header, Header};

    fn connected(config: WireConfig) -> (WireConnection, WireConnection) {
        let (left, right) = WireStream::pair().unwrap();
        (
            WireConnection::with_config(left, config.clone()).unwrap(),
            WireConnection::with_config(right, config).unwrap(),
        )
    }

    fn two_messages() -> Vec<Message> {
        vec![
            ArgWriter::new()
                .new_id(2)
                .into_message(1, 1)
                .unwrap(),
            ArgWriter::new()
                .uint(1)
                .string("wl_shm")
                .uint(1)
                .into_message(2, 0)
                .unwrap(),
        ]
    }

    #[test]
    fn batch_with_descriptor_roundtrip() {
        let (mut tx, mut rx) = connected(WireConfig::default());
        let (mine, mut theirs) = UnixStream::pair().unwrap();

        let wire = WireMessage::with_fds(two_messages(), vec![OwnedFd::from(mine)]);
        tx.send(&wire).unwrap();
        drop(wire);

        let got = rx.receive().unwrap();
        assert_eq!(got.messages, two_messages());
        assert_eq!(got.fds.len(), 1);

        let mut received = UnixStream::from(got.fds.into_iter().next().unwrap());
        received.write_all(b"usable").unwrap();
        let mut out = [0u8; 6];
        theirs.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"usable");
    }

    #[test]
    fn batch_order_is_preserved_across_sends() {
        let (mut tx, mut rx) = connected(WireConfig::default());
        for i in 0..16u32 {
            let message = ArgWriter::new().uint(i).into_message(i + 1, 0).unwrap();
            tx.send(&WireMessage::new(vec![message])).unwrap();
        }

        let mut seen = Vec::new();
        while seen.len() < 16 {
            let batch = rx.receive().unwrap();
            seen.extend(batch.messages.iter().map(Message::object_id));
        }
        assert_eq!(seen, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn message_split_across_writes_is_reassembled() {
        let (mut raw, right) = WireStream::pair().unwrap();
        let mut rx = WireConnection::new(right);

        let message = ArgWriter::new().string("split me").into_message(9, 3).unwrap();
        let bytes = join_messages(std::slice::from_ref(&message));

        let writer = std::thread::spawn(move || {
            raw.write_all(&bytes[..5]).unwrap();
            std::thread::sleep(Duration::from_millis(20));
            raw.write_all(&bytes[5..]).unwrap();
            raw
        });

        let got = rx.receive().unwrap();
        assert_eq!(got.messages, vec![message]);
        assert_eq!(rx.pending_bytes(), 0);
        drop(writer.join().unwrap());
    }

    #[test]
    fn message_larger_than_read_buffer() {
        let config = WireConfig {
            read_buffer_size: 16,
            ..WireConfig::default()
        };
        let (mut tx, mut rx) = connected(config);

        let big = ArgWriter::new().array(&[0x5A; 200]).into_message(4, 1).unwrap();
        let small = ArgWriter::new().uint(1).into_message(5, 0).unwrap();
        tx.send(&WireMessage::new(vec![big.clone(), small.clone()]))
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            seen.extend(rx.receive().unwrap().messages);
        }
        assert_eq!(seen, vec![big, small]);
    }

    #[test]
    fn orderly_close_is_connection_closed() {
        let (tx, mut rx) = connected(WireConfig::default());
        drop(tx);
        assert!(matches!(rx.receive(), Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn close_mid_message_is_connection_closed() {
        let (mut raw, right) = WireStream::pair().unwrap();
        let mut rx = WireConnection::new(right);

        let header = Header {
            object_id: 1,
            opcode: 0,
            size: 16,
        };
        raw.write_all(&encode_header(&header)).unwrap();
        raw.shutdown(Shutdown::Write).unwrap();

        assert!(matches!(rx.receive(), Err(FrameError::ConnectionClosed)));
        assert_eq!(rx.pending_bytes(), 8);
    }

    #[test]
    fn invalid_size_from_peer() {
        let (mut raw, right) = WireStream::pair().unwrap();
        let mut rx = WireConnection::new(right);

        let header = Header {
            object_id: 1,
            opcode: 0,
            size: 4,
        };
        raw.write_all(&encode_header(&header)).unwrap();

        assert!(matches!(
            rx.receive(),
            Err(FrameError::InvalidSize { size: 4 })
        ));
    }

    #[test]
    fn too_many_descriptors_for_buffer() {
        let config = WireConfig {
            ancillary_buffer_size: waywire_transport::ancillary_space(1),
            ..WireConfig::default()
        };
        let (mut tx, mut rx) = connected(config);

        // One descriptor's space is padded enough for two on some targets.
        let (first, mut first_peer) = UnixStream::pair().unwrap();
        let (b, _b_peer) = UnixStream::pair().unwrap();
        let (c, _c_peer) = UnixStream::pair().unwrap();
        let wire = WireMessage::with_fds(two_messages(), vec![first.into(), b.into(), c.into()]);
        tx.send(&wire).unwrap();
        drop(wire);

        assert!(matches!(
            rx.receive(),
            Err(FrameError::MalformedAncillary(AncillaryError::Truncated { .. }))
        ));
        assert!(rx.pending_fds.is_empty());

        // The copy that did arrive was closed, so its peer sees end-of-file.
        first_peer
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(first_peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn descriptors_without_messages_are_rejected() {
        let (mut tx, _rx) = connected(WireConfig::default());
        let (a, _b) = UnixStream::pair().unwrap();
        let wire = WireMessage::with_fds(Vec::new(), vec![a.into()]);
        assert!(matches!(
            tx.send(&wire),
            Err(FrameError::InvalidSize { size: 0 })
        ));
        tx.send(&WireMessage::default()).unwrap();
    }

    #[test]
    fn send_to_closed_peer_fails() {
        let (mut tx, rx) = connected(WireConfig::default());
        drop(rx);
        let err = tx.send(&WireMessage::new(two_messages())).unwrap_err();
        assert!(matches!(err, FrameError::WriteFailed(_)));
    }
}
