//! Error number definitions.
//!
//! The subset of `<errno.h>` values the stream layer produces or inspects,
//! plus the conversion into `std::io::Error` used by `StreamError`.

pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const ECHILD: i32 = 10;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;
pub const ESPIPE: i32 = 29;

/// Wrap a raw errno as an `io::Error` so it displays with the OS message.
#[must_use]
pub fn to_io_error(errno: i32) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno)
}
