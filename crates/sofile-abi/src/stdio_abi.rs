//! ABI layer for buffered streams.
//!
//! Exports the `so_*` functions: a C-shaped surface over
//! [`sofile_core::Stream`] with sentinel returns and `errno`.
//!
//! Architecture: a global registry maps opaque `SO_FILE*` handles to
//! streams. Each entry has its own lock, so a blocking read on one stream
//! never stalls another. Closing removes the entry first, then waits for
//! any in-flight call on that stream to finish.

use std::collections::HashMap;
use std::ffi::{CStr, OsStr, c_char, c_int, c_long, c_void};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use sofile_core::errno;
use sofile_core::stdio::{OpenMode, PipeDirection};
use sofile_core::{Stream, StreamError, Whence, stdio_config};

use crate::errno_abi::set_errno;

/// Sentinel for byte operations and failed status calls.
pub const SO_EOF: c_int = -1;

// ---------------------------------------------------------------------------
// Stream registry
// ---------------------------------------------------------------------------

/// First handle value. Keeps handles clear of small integers and null.
const FIRST_HANDLE: usize = 0x5F11_0010;

/// `None` once closed; late callers holding the entry see `EBADF`.
type Entry = Arc<Mutex<Option<Stream>>>;

struct StreamRegistry {
    streams: HashMap<usize, Entry>,
    next_handle: usize,
}

impl StreamRegistry {
    fn new() -> Self {
        Self {
            streams: HashMap::new(),
            next_handle: FIRST_HANDLE,
        }
    }

    fn insert(&mut self, stream: Stream) -> usize {
        let handle = self.next_handle;
        self.next_handle = handle.wrapping_add(1).max(FIRST_HANDLE);
        self.streams.insert(handle, Arc::new(Mutex::new(Some(stream))));
        handle
    }
}

fn registry() -> &'static Mutex<StreamRegistry> {
    static REG: OnceLock<Mutex<StreamRegistry>> = OnceLock::new();
    REG.get_or_init(|| Mutex::new(StreamRegistry::new()))
}

fn register(stream: Stream) -> *mut c_void {
    registry().lock().insert(stream) as *mut c_void
}

fn lookup(handle: *mut c_void) -> Option<Entry> {
    registry().lock().streams.get(&(handle as usize)).cloned()
}

/// Unregister `handle` and take ownership of its stream.
fn unregister(handle: *mut c_void) -> Option<Stream> {
    let entry = registry().lock().streams.remove(&(handle as usize))?;
    entry.lock().take()
}

/// Run `op` on the stream behind `handle`, or set `EBADF` and return `fail`.
fn with_stream<R>(handle: *mut c_void, fail: R, op: impl FnOnce(&mut Stream) -> R) -> R {
    let Some(entry) = lookup(handle) else {
        set_errno(errno::EBADF);
        return fail;
    };
    let mut guard = entry.lock();
    match guard.as_mut() {
        Some(stream) => op(stream),
        None => {
            set_errno(errno::EBADF);
            fail
        }
    }
}

fn report(err: &StreamError) {
    set_errno(err.errno());
}

/// After a short block transfer, surface the stream's failure through errno.
fn report_stream_error(stream: &Stream) {
    if stream.has_error() {
        if let Some(code) = stream.last_os_error().and_then(|e| e.raw_os_error()) {
            set_errno(code);
        }
    }
}

// ---------------------------------------------------------------------------
// so_fopen / so_fclose / so_fileno
// ---------------------------------------------------------------------------

/// Open a file stream. Returns null and sets `errno` on failure.
///
/// # Safety
///
/// `pathname` and `mode` must be null or valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fopen(pathname: *const c_char, mode: *const c_char) -> *mut c_void {
    if pathname.is_null() || mode.is_null() {
        set_errno(errno::EINVAL);
        return std::ptr::null_mut();
    }
    // SAFETY: caller guarantees NUL-terminated strings.
    let mode_bytes = unsafe { CStr::from_ptr(mode) }.to_bytes();
    let Some(open_mode) = OpenMode::parse_bytes(mode_bytes) else {
        set_errno(errno::EINVAL);
        return std::ptr::null_mut();
    };
    // SAFETY: as above.
    let path_bytes = unsafe { CStr::from_ptr(pathname) }.to_bytes();
    let path = Path::new(OsStr::from_bytes(path_bytes));

    match Stream::open_mode(path, open_mode, stdio_config()) {
        Ok(stream) => register(stream),
        Err(err) => {
            report(&err);
            std::ptr::null_mut()
        }
    }
}

/// Flush and close. Returns 0, or `SO_EOF` with `errno` set. The handle is
/// invalid afterwards either way.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fclose(stream: *mut c_void) -> c_int {
    let Some(s) = unregister(stream) else {
        set_errno(errno::EBADF);
        return SO_EOF;
    };
    match s.close() {
        Ok(()) => 0,
        Err(err) => {
            report(&err);
            SO_EOF
        }
    }
}

/// Underlying descriptor, or -1 with `EBADF`.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fileno(stream: *mut c_void) -> c_int {
    with_stream(stream, -1, |s| s.file_descriptor())
}

// ---------------------------------------------------------------------------
// so_fflush
// ---------------------------------------------------------------------------

/// Flush one stream, or every open stream when `stream` is null.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fflush(stream: *mut c_void) -> c_int {
    if stream.is_null() {
        let entries: Vec<Entry> = registry().lock().streams.values().cloned().collect();
        let mut rc = 0;
        for entry in entries {
            if let Some(s) = entry.lock().as_mut() {
                if let Err(err) = s.flush() {
                    report(&err);
                    rc = SO_EOF;
                }
            }
        }
        return rc;
    }
    with_stream(stream, SO_EOF, |s| match s.flush() {
        Ok(()) => 0,
        Err(err) => {
            report(&err);
            SO_EOF
        }
    })
}

// ---------------------------------------------------------------------------
// Byte and block transfer
// ---------------------------------------------------------------------------

/// Next byte as `unsigned char` widened to int, or `SO_EOF` at end of input
/// or on error.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fgetc(stream: *mut c_void) -> c_int {
    with_stream(stream, SO_EOF, |s| match s.get_byte() {
        Ok(Some(b)) => c_int::from(b),
        Ok(None) => SO_EOF,
        Err(err) => {
            report(&err);
            SO_EOF
        }
    })
}

/// Write `c` converted to `unsigned char`. Returns that byte or `SO_EOF`.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fputc(c: c_int, stream: *mut c_void) -> c_int {
    with_stream(stream, SO_EOF, |s| match s.put_byte(c as u8) {
        Ok(b) => c_int::from(b),
        Err(err) => {
            report(&err);
            SO_EOF
        }
    })
}

/// Read up to `nmemb` elements of `size` bytes. Returns whole elements read.
///
/// # Safety
///
/// `ptr` must be valid for `size * nmemb` writable bytes; `stream` must be
/// null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fread(
    ptr: *mut c_void,
    size: usize,
    nmemb: usize,
    stream: *mut c_void,
) -> usize {
    if size == 0 || nmemb == 0 {
        return 0;
    }
    let Some(total) = size.checked_mul(nmemb) else {
        set_errno(errno::EINVAL);
        return 0;
    };
    if ptr.is_null() {
        set_errno(errno::EINVAL);
        return 0;
    }
    with_stream(stream, 0, |s| {
        // SAFETY: caller guarantees `ptr` covers `total` writable bytes.
        let dst = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), total) };
        let n = s.read_block(dst, size, nmemb);
        if n < nmemb {
            report_stream_error(s);
        }
        n
    })
}

/// Write up to `nmemb` elements of `size` bytes. Returns whole elements
/// accepted.
///
/// # Safety
///
/// `ptr` must be valid for `size * nmemb` readable bytes; `stream` must be
/// null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fwrite(
    ptr: *const c_void,
    size: usize,
    nmemb: usize,
    stream: *mut c_void,
) -> usize {
    if size == 0 || nmemb == 0 {
        return 0;
    }
    let Some(total) = size.checked_mul(nmemb) else {
        set_errno(errno::EINVAL);
        return 0;
    };
    if ptr.is_null() {
        set_errno(errno::EINVAL);
        return 0;
    }
    with_stream(stream, 0, |s| {
        // SAFETY: caller guarantees `ptr` covers `total` readable bytes.
        let src = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), total) };
        let n = s.write_block(src, size, nmemb);
        if n < nmemb {
            report_stream_error(s);
        }
        n
    })
}

// ---------------------------------------------------------------------------
// Positioning
// ---------------------------------------------------------------------------

/// Reposition. `whence` is `SEEK_SET`, `SEEK_CUR` or `SEEK_END`.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_fseek(stream: *mut c_void, offset: c_long, whence: c_int) -> c_int {
    let Some(whence) = Whence::from_posix(whence) else {
        set_errno(errno::EINVAL);
        return -1;
    };
    with_stream(stream, -1, |s| match s.seek(i64::from(offset), whence) {
        Ok(_) => 0,
        Err(err) => {
            report(&err);
            -1
        }
    })
}

/// Logical position, or -1 with `errno` set.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_ftell(stream: *mut c_void) -> c_long {
    with_stream(stream, -1, |s| match c_long::try_from(s.tell()) {
        Ok(pos) => pos,
        Err(_) => {
            set_errno(libc::EOVERFLOW);
            -1
        }
    })
}

/// Seek to the start and clear both indicators.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_rewind(stream: *mut c_void) {
    with_stream(stream, (), |s| {
        if let Err(err) = s.rewind() {
            report(&err);
        }
    });
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Nonzero once a read hit end of input.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_feof(stream: *mut c_void) -> c_int {
    with_stream(stream, 0, |s| c_int::from(s.is_eof()))
}

/// Nonzero once an underlying operation failed.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_ferror(stream: *mut c_void) -> c_int {
    with_stream(stream, 0, |s| c_int::from(s.has_error()))
}

/// Clear the EOF and error indicators.
///
/// # Safety
///
/// `stream` must be null or a handle returned by this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_clearerr(stream: *mut c_void) {
    with_stream(stream, (), Stream::clear_error);
}

// ---------------------------------------------------------------------------
// so_popen / so_pclose
// ---------------------------------------------------------------------------

/// Run `command` through the shell with a pipe in direction `"r"` or `"w"`.
///
/// # Safety
///
/// `command` and `mode` must be null or valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_popen(command: *const c_char, mode: *const c_char) -> *mut c_void {
    if command.is_null() || mode.is_null() {
        set_errno(errno::EINVAL);
        return std::ptr::null_mut();
    }
    // SAFETY: caller guarantees NUL-terminated strings.
    let mode_bytes = unsafe { CStr::from_ptr(mode) }.to_bytes();
    let Some(direction) = PipeDirection::parse_bytes(mode_bytes) else {
        set_errno(errno::EINVAL);
        return std::ptr::null_mut();
    };
    // SAFETY: as above.
    let Ok(command) = unsafe { CStr::from_ptr(command) }.to_str() else {
        set_errno(errno::EINVAL);
        return std::ptr::null_mut();
    };

    match Stream::popen_with_config(command, direction, stdio_config()) {
        Ok(stream) => register(stream),
        Err(err) => {
            report(&err);
            std::ptr::null_mut()
        }
    }
}

/// Close a process stream and wait for its child. Returns the raw wait
/// status, or -1 with `errno` set. The child is reaped on every path.
///
/// # Safety
///
/// `stream` must be null or a handle returned by [`so_popen`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn so_pclose(stream: *mut c_void) -> c_int {
    let Some(s) = unregister(stream) else {
        set_errno(errno::EBADF);
        return -1;
    };
    match s.pclose() {
        Ok(status) => status.raw(),
        Err(err) => {
            report(&err);
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
