use std::io::{IoSlice, IoSliceMut, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::error::Result;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

/// Result of one `recvmsg` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Payload bytes written into the data buffer.
    pub bytes: usize,
    /// Control bytes written into the ancillary buffer.
    pub ancillary: usize,
    /// The kernel dropped control data that did not fit (`MSG_CTRUNC`).
    pub ancillary_truncated: bool,
}

/// A connected Unix stream socket that can carry descriptors.
///
/// Plain `Read`/`Write` are available for byte-only traffic; the
/// [`send_with_ancillary`](Self::send_with_ancillary) and
/// [`recv_with_ancillary`](Self::recv_with_ancillary) pair keeps payload and
/// control data in the same system call.
pub struct WireStream {
    inner: UnixStream,
}

impl Read for WireStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for WireStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl WireStream {
    /// Wrap an already connected Unix stream.
    pub fn from_unix(stream: UnixStream) -> Self {
        Self { inner: stream }
    }

    /// Create a connected pair of streams.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// One `sendmsg` carrying `payload` and the control buffer `ancillary`.
    ///
    /// Returns the number of payload bytes the kernel accepted. Control data
    /// is attached to the first byte and is never resent.
    pub fn send_with_ancillary(&self, payload: &[u8], ancillary: &[u8]) -> std::io::Result<usize> {
        let iov = [IoSlice::new(payload)];

        // SAFETY: msghdr is a plain C struct; zero is a valid initial value.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = iov.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = iov.len() as _;
        if !ancillary.is_empty() {
            msg.msg_control = ancillary.as_ptr() as *mut libc::c_void;
            msg.msg_controllen = ancillary.len() as _;
        }

        // SAFETY: `msg` points at `iov` and `ancillary`, both alive for the
        // duration of the call; IoSlice is ABI compatible with iovec and the
        // kernel only reads from these buffers.
        let rc = unsafe { libc::sendmsg(self.inner.as_raw_fd(), &msg, SEND_FLAGS) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(rc as usize)
    }

    /// One `recvmsg` into `buf` and `ancillary`.
    ///
    /// Received descriptors are marked close-on-exec where the platform allows.
    pub fn recv_with_ancillary(
        &self,
        buf: &mut [u8],
        ancillary: &mut [u8],
    ) -> std::io::Result<Received> {
        let mut iov = [IoSliceMut::new(buf)];

        // SAFETY: msghdr is a plain C struct; zero is a valid initial value.
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = iov.as_mut_ptr() as *mut libc::iovec;
        msg.msg_iovlen = iov.len() as _;
        if !ancillary.is_empty() {
            msg.msg_control = ancillary.as_mut_ptr() as *mut libc::c_void;
            msg.msg_controllen = ancillary.len() as _;
        }

        // SAFETY: `msg` points at writable buffers of the advertised lengths,
        // alive for the duration of the call; IoSliceMut is ABI compatible
        // with iovec.
        let rc = unsafe { libc::recvmsg(self.inner.as_raw_fd(), &mut msg, RECV_FLAGS) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let ancillary_len = if ancillary.is_empty() {
            0
        } else {
            (msg.msg_controllen as usize).min(ancillary.len())
        };

        Ok(Received {
            bytes: rc as usize,
            ancillary: ancillary_len,
            ancillary_truncated: msg.msg_flags & libc::MSG_CTRUNC != 0,
        })
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Toggle non-blocking mode (shared by every clone).
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.inner.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_unix(cloned))
    }

    /// Shut down one or both halves of the connection.
    ///
    /// Applies to the socket, so every clone observes it: a thread blocked in
    /// a read on another handle wakes with end-of-file.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        self.inner.shutdown(how).map_err(Into::into)
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        let fd = self.inner.as_raw_fd();

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl AsRawFd for WireStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsFd for WireStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl std::fmt::Debug for WireStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireStream")
            .field("fd", &self.inner.as_raw_fd())
            .finish()
    }
}
