//! Low-level descriptor I/O.
//!
//! [`Descriptor`] is the narrow syscall contract a stream drives: one
//! read, one write, one reposition or one close per call, each reporting
//! the raw errno on failure. [`Fd`] is the real implementation over an
//! owned kernel descriptor.

use std::ffi::CStr;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};

use crate::syscall;

/// Reference point for a reposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset (`SEEK_SET`).
    Start,
    /// Relative to the current position (`SEEK_CUR`).
    Current,
    /// Relative to end of file (`SEEK_END`).
    End,
}

impl Whence {
    /// Convert from POSIX integer constant.
    pub fn from_posix(whence: i32) -> Option<Whence> {
        match whence {
            libc::SEEK_SET => Some(Whence::Start),
            libc::SEEK_CUR => Some(Whence::Current),
            libc::SEEK_END => Some(Whence::End),
            _ => None,
        }
    }

    /// POSIX integer constant for `lseek`.
    pub fn to_posix(self) -> i32 {
        match self {
            Whence::Start => libc::SEEK_SET,
            Whence::Current => libc::SEEK_CUR,
            Whence::End => libc::SEEK_END,
        }
    }
}

/// Byte channel underneath a stream.
///
/// Implementations issue exactly one underlying operation per call and
/// never retry. Errors are raw errno values.
pub trait Descriptor {
    /// Raw descriptor number, for diagnostics and `fileno`.
    fn raw_fd(&self) -> i32;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, i32>;

    /// Write up to `buf.len()` bytes; may accept fewer.
    fn write(&mut self, buf: &[u8]) -> Result<usize, i32>;

    /// Reposition and return the new absolute offset.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, i32>;

    /// Release the descriptor, reporting the close result.
    fn close(self) -> Result<(), i32>
    where
        Self: Sized;
}

/// Owned kernel file descriptor.
///
/// Dropping an `Fd` closes it and ignores the result; [`Descriptor::close`]
/// closes it and reports the result.
#[derive(Debug)]
pub struct Fd(OwnedFd);

impl Fd {
    /// Open `pathname` with raw `O_*` flags and creation mode.
    pub fn open(pathname: &CStr, flags: i32, mode: u32) -> Result<Fd, i32> {
        syscall::sys_open(pathname, flags, mode).map(Fd)
    }
}

impl From<OwnedFd> for Fd {
    fn from(fd: OwnedFd) -> Self {
        Fd(fd)
    }
}

impl From<Fd> for OwnedFd {
    fn from(fd: Fd) -> Self {
        fd.0
    }
}

impl Descriptor for Fd {
    fn raw_fd(&self) -> i32 {
        self.0.as_raw_fd()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
        syscall::sys_read(self.raw_fd(), buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        syscall::sys_write(self.raw_fd(), buf)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, i32> {
        syscall::sys_lseek(self.raw_fd(), offset, whence.to_posix())
    }

    fn close(self) -> Result<(), i32> {
        syscall::sys_close(self.0.into_raw_fd())
    }
}

/// Creates a unidirectional pipe with both ends close-on-exec.
///
/// Returns `(read_end, write_end)`.
pub fn pipe() -> Result<(Fd, Fd), i32> {
    let (rd, wr) = syscall::sys_pipe2(libc::O_CLOEXEC)?;
    Ok((Fd(rd), Fd(wr)))
}
