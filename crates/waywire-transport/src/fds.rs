//! File descriptor side-channel codec.
//!
//! Descriptors travel as `SCM_RIGHTS` control messages next to the byte
//! payload of a single `sendmsg`/`recvmsg`. This module only converts between
//! descriptor lists and the raw control buffer; it never duplicates, closes
//! or inspects the descriptors themselves.
//!
//! Control buffer layout (one record):
//! ```text
//! ┌────────────────────────────┬──────────────────────┬─────────┐
//! │ cmsghdr                    │ fd[0] fd[1] ...      │ padding │
//! │ len | SOL_SOCKET | RIGHTS  │ (native i32 each)    │         │
//! └────────────────────────────┴──────────────────────┴─────────┘
//! ```
//! Records are aligned the way the platform's `CMSG_SPACE` aligns them.

use std::mem::size_of;
use std::os::fd::RawFd;

use crate::error::AncillaryError;

const FD_SIZE: usize = size_of::<RawFd>();

#[allow(unused_unsafe)]
fn cmsg_len(data_len: usize) -> usize {
    // SAFETY: CMSG_LEN only performs arithmetic on its argument.
    unsafe { libc::CMSG_LEN(data_len as libc::c_uint) as usize }
}

#[allow(unused_unsafe)]
fn cmsg_space(data_len: usize) -> usize {
    // SAFETY: CMSG_SPACE only performs arithmetic on its argument.
    unsafe { libc::CMSG_SPACE(data_len as libc::c_uint) as usize }
}

/// Control buffer size needed to carry `n_fds` descriptors in one record.
pub fn ancillary_space(n_fds: usize) -> usize {
    if n_fds == 0 {
        0
    } else {
        cmsg_space(n_fds * FD_SIZE)
    }
}

/// Pack descriptors into a single `SCM_RIGHTS` control record.
///
/// An empty list yields an empty buffer: no record is sent at all.
pub fn encode_fds(fds: &[RawFd]) -> Vec<u8> {
    if fds.is_empty() {
        return Vec::new();
    }

    let data_len = fds.len() * FD_SIZE;
    let header_len = cmsg_len(0);
    let mut buf = vec![0u8; cmsg_space(data_len)];

    // SAFETY: cmsghdr is a plain C struct; all-zero is a valid value and the
    // private padding fields some targets carry stay zero.
    let mut header: libc::cmsghdr = unsafe { std::mem::zeroed() };
    header.cmsg_len = cmsg_len(data_len) as _;
    header.cmsg_level = libc::SOL_SOCKET;
    header.cmsg_type = libc::SCM_RIGHTS;

    // SAFETY: `buf` holds at least `cmsg_space(data_len) >= size_of::<cmsghdr>()`
    // bytes and the write is unaligned, so no alignment is assumed.
    unsafe {
        std::ptr::write_unaligned(buf.as_mut_ptr().cast::<libc::cmsghdr>(), header);
    }

    for (i, fd) in fds.iter().enumerate() {
        let start = header_len + i * FD_SIZE;
        buf[start..start + FD_SIZE].copy_from_slice(&fd.to_ne_bytes());
    }

    buf
}

/// Parse every control record in `ancillary` and concatenate the descriptors
/// they carry, preserving record order and in-record order.
pub fn decode_fds(ancillary: &[u8]) -> Result<Vec<RawFd>, AncillaryError> {
    let mut fds = Vec::new();
    walk_records(ancillary, |level, kind, data| {
        if level != libc::SOL_SOCKET || kind != libc::SCM_RIGHTS {
            return Err(AncillaryError::Unrecognized { level, kind });
        }
        if data.len() % FD_SIZE != 0 {
            return Err(AncillaryError::PartialDescriptor(data.len()));
        }
        push_fds(&mut fds, data);
        Ok(())
    })?;
    Ok(fds)
}

/// Collect every whole descriptor from the `SCM_RIGHTS` records that can be
/// read, skipping other records and stopping at the first broken header.
///
/// For cleanup after [`decode_fds`] fails: the kernel has already installed
/// these descriptors and the receiver has to close them.
pub fn decode_fds_lossy(ancillary: &[u8]) -> Vec<RawFd> {
    let mut fds = Vec::new();
    let _ = walk_records(ancillary, |level, kind, data| {
        if level == libc::SOL_SOCKET && kind == libc::SCM_RIGHTS {
            push_fds(&mut fds, data);
        }
        Ok(())
    });
    fds
}

fn push_fds(fds: &mut Vec<RawFd>, data: &[u8]) {
    fds.extend(data.chunks_exact(FD_SIZE).map(|chunk| {
        let mut raw = [0u8; FD_SIZE];
        raw.copy_from_slice(chunk);
        RawFd::from_ne_bytes(raw)
    }));
}

/// Hand `(level, type, data)` of each record to `visit`, in buffer order.
fn walk_records<F>(ancillary: &[u8], mut visit: F) -> Result<(), AncillaryError>
where
    F: FnMut(i32, i32, &[u8]) -> Result<(), AncillaryError>,
{
    let header_len = cmsg_len(0);
    let mut offset = 0usize;

    while offset < ancillary.len() {
        let remaining = ancillary.len() - offset;
        if remaining < header_len || remaining < size_of::<libc::cmsghdr>() {
            return Err(AncillaryError::TruncatedHeader { offset, remaining });
        }

        // SAFETY: at least size_of::<cmsghdr>() bytes are readable from
        // `offset`, and the read is unaligned.
        let header: libc::cmsghdr = unsafe {
            std::ptr::read_unaligned(ancillary[offset..].as_ptr().cast::<libc::cmsghdr>())
        };

        let len = header.cmsg_len as usize;
        if len < header_len || len > remaining {
            return Err(AncillaryError::BadLength {
                offset,
                len,
                available: remaining,
            });
        }

        let data_len = len - header_len;
        visit(
            header.cmsg_level,
            header.cmsg_type,
            &ancillary[offset + header_len..offset + len],
        )?;

        // The last record may omit its trailing padding.
        offset = offset.saturating_add(cmsg_space(data_len)).min(ancillary.len());
    }

    Ok(())
}
