//! Host `errno` access.
//!
//! The exported functions report failures the C way: a sentinel return plus
//! the calling thread's `errno`, which is the host libc's own slot.

use std::ffi::c_int;

#[cfg(any(target_os = "linux", target_os = "android"))]
fn errno_location() -> *mut c_int {
    // SAFETY: always returns the calling thread's errno slot.
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn errno_location() -> *mut c_int {
    // SAFETY: always returns the calling thread's errno slot.
    unsafe { libc::__error() }
}

/// Set the calling thread's `errno`.
#[inline]
pub fn set_errno(val: c_int) {
    // SAFETY: the slot is valid and thread-local for the thread's lifetime.
    unsafe { *errno_location() = val };
}

/// Read the calling thread's `errno`.
#[inline]
pub fn errno() -> c_int {
    // SAFETY: as in `set_errno`.
    unsafe { *errno_location() }
}

/// `errno` as seen by C callers, for FFI consumers without direct access.
#[unsafe(no_mangle)]
pub extern "C" fn so_errno() -> c_int {
    errno()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_read_back() {
        set_errno(libc::ENOSPC);
        assert_eq!(errno(), libc::ENOSPC);
        assert_eq!(so_errno(), libc::ENOSPC);
        set_errno(0);
        assert_eq!(errno(), 0);
    }

    #[test]
    fn matches_std_view() {
        set_errno(libc::EBADF);
        assert_eq!(std::io::Error::last_os_error().raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn errno_is_thread_local() {
        set_errno(libc::EIO);
        std::thread::spawn(|| {
            set_errno(libc::EPIPE);
            assert_eq!(errno(), libc::EPIPE);
        })
        .join()
        .unwrap();
        assert_eq!(errno(), libc::EIO);
    }
}
