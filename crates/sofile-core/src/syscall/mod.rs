//! Typed syscall veneer.
//!
//! Thin safe wrappers over the descriptor syscalls a stream needs. Every
//! wrapper issues exactly one call and converts the C return convention
//! (`-1` plus `errno`) into `Result<T, i32>` carrying the raw errno.
//!
//! No wrapper retries on `EINTR`; callers see every failure.
//!
//! # Safety
//!
//! All `unsafe` in the core crate lives here. Slices guarantee pointer and
//! length validity for `read`/`write`; `CStr` guarantees NUL termination
//! for `open`. Descriptors returned by `open` and `pipe2` are fresh, so
//! wrapping them in `OwnedFd` is the only claim of ownership.

use std::ffi::CStr;
use std::os::fd::{FromRawFd, OwnedFd};

use crate::errno;

/// Fetch the calling thread's errno after a failed libc call.
#[inline]
fn last_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(errno::EIO)
}

/// `open(pathname, flags, mode)`.
#[inline]
pub fn sys_open(pathname: &CStr, flags: i32, mode: u32) -> Result<OwnedFd, i32> {
    // SAFETY: pathname is NUL-terminated by construction of CStr.
    let fd = unsafe { libc::open(pathname.as_ptr(), flags, mode as libc::c_uint) };
    if fd < 0 {
        return Err(last_errno());
    }
    // SAFETY: fd was just returned by open and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// `read(fd, buf, buf.len())`.
#[inline]
pub fn sys_read(fd: i32, buf: &mut [u8]) -> Result<usize, i32> {
    // SAFETY: buf is a valid writable region of buf.len() bytes.
    let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
}

/// `write(fd, buf, buf.len())`.
#[inline]
pub fn sys_write(fd: i32, buf: &[u8]) -> Result<usize, i32> {
    // SAFETY: buf is a valid readable region of buf.len() bytes.
    let rc = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as usize) }
}

/// `lseek(fd, offset, whence)`.
#[inline]
pub fn sys_lseek(fd: i32, offset: i64, whence: i32) -> Result<i64, i32> {
    // SAFETY: lseek takes no pointers; a bad fd yields EBADF.
    let rc = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc as i64) }
}

/// `close(fd)`.
#[inline]
pub fn sys_close(fd: i32) -> Result<(), i32> {
    // SAFETY: close is safe to call on any fd value (bad fd just returns EBADF).
    let rc = unsafe { libc::close(fd) };
    if rc < 0 { Err(last_errno()) } else { Ok(()) }
}

/// `pipe2(fds, flags)`. Returns `(read_end, write_end)`.
#[inline]
pub fn sys_pipe2(flags: i32) -> Result<(OwnedFd, OwnedFd), i32> {
    let mut fds = [-1 as libc::c_int; 2];
    // SAFETY: fds is a valid array of two c_ints.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), flags) };
    if rc < 0 {
        return Err(last_errno());
    }
    // SAFETY: both descriptors were just created by pipe2 and are unowned.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// `fcntl(fd, F_GETFD)`. Used to probe whether a descriptor is still open.
#[inline]
pub fn sys_fcntl_getfd(fd: i32) -> Result<i32, i32> {
    // SAFETY: F_GETFD takes no pointer argument.
    let rc = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if rc < 0 { Err(last_errno()) } else { Ok(rc) }
}

/// `waitpid(pid, &status, options)`. Returns `(pid, raw_status)`.
#[inline]
pub fn sys_waitpid(pid: i32, options: i32) -> Result<(i32, i32), i32> {
    let mut status: libc::c_int = 0;
    // SAFETY: status is a valid writable c_int.
    let rc = unsafe { libc::waitpid(pid, &mut status, options) };
    if rc < 0 {
        Err(last_errno())
    } else {
        Ok((rc, status))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
