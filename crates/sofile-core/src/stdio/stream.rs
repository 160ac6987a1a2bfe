//! Stream state management.
//!
//! `Stream` is the safe Rust model of a C `FILE`: one owned descriptor,
//! one shared buffer, the descriptor's real offset (`cursor`), and the
//! sticky EOF/error indicators.
//!
//! Position bookkeeping: `cursor` always equals the descriptor's offset.
//! The caller's logical position is `cursor - unread + pending`, where
//! `unread` is live read-ahead and `pending` is buffered write data.
//!
//! Direction changes go through `prepare_read` / `prepare_write`, which
//! flush pending writes or pull the descriptor back over unread
//! read-ahead before the buffer is reused.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::Child;

use tracing::{debug, warn};

use super::buffer::{BufferState, StreamBuffer};
use super::error::StreamError;
use super::mode::{CREATE_MODE, OpenMode};
use crate::config::{StdioConfig, stdio_config};
use crate::errno;
use crate::io::{Descriptor, Fd, Whence};

/// Sticky stream indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    pub eof: bool,
    pub error: bool,
}

/// Buffered byte stream over a descriptor.
///
/// Not internally synchronized: every operation takes `&mut self`.
/// Dropping a stream without [`Stream::close`] still flushes, closes and
/// reaps any child, but the outcome is only logged.
#[derive(Debug)]
pub struct Stream<D: Descriptor = Fd> {
    /// `None` once the stream has been torn down.
    descriptor: Option<D>,
    /// Raw number of `descriptor`, kept for diagnostics after teardown.
    fd: i32,
    mode: OpenMode,
    pathname: String,
    /// Real offset of the descriptor.
    cursor: i64,
    buffer: StreamBuffer,
    flags: StreamFlags,
    /// errno of the most recent failure (0 if none).
    last_errno: i32,
    /// Child process for process-backed streams.
    pub(super) child: Option<Child>,
}

impl Stream<Fd> {
    /// Open `pathname` with one of `r`, `r+`, `w`, `w+`, `a`, `a+`.
    pub fn open(pathname: impl AsRef<Path>, mode: &str) -> Result<Self, StreamError> {
        Self::open_with_config(pathname, mode, stdio_config())
    }

    /// [`Stream::open`] with explicit configuration.
    pub fn open_with_config(
        pathname: impl AsRef<Path>,
        mode: &str,
        config: &StdioConfig,
    ) -> Result<Self, StreamError> {
        let Some(open_mode) = OpenMode::parse(mode) else {
            return Err(StreamError::InvalidMode(mode.to_owned()));
        };
        Self::open_mode(pathname, open_mode, config)
    }

    /// Open with an already-validated mode.
    pub fn open_mode(
        pathname: impl AsRef<Path>,
        mode: OpenMode,
        config: &StdioConfig,
    ) -> Result<Self, StreamError> {
        let path = pathname.as_ref();
        let display = path.to_string_lossy().into_owned();
        let open_failed = |code: i32| StreamError::OpenFailed {
            path: display.clone(),
            source: errno::to_io_error(code),
        };

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| open_failed(errno::EINVAL))?;
        let mut fd = Fd::open(&c_path, mode.oflags(), CREATE_MODE).map_err(open_failed)?;

        // Append streams start at end of file. Non-seekable targets stay at 0.
        let cursor = if mode.is_append() {
            fd.seek(0, Whence::End).unwrap_or(0)
        } else {
            0
        };

        let mut stream = Stream::from_descriptor(fd, mode, display, config.buffer_size);
        stream.cursor = cursor;
        debug!(
            path = %stream.pathname,
            mode = %mode,
            fd = stream.fd,
            cursor,
            "stream opened"
        );
        Ok(stream)
    }
}

impl<D: Descriptor> Stream<D> {
    /// Wrap an already-open descriptor positioned at offset 0.
    pub fn from_descriptor(
        descriptor: D,
        mode: OpenMode,
        pathname: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            fd: descriptor.raw_fd(),
            descriptor: Some(descriptor),
            mode,
            pathname: pathname.into(),
            cursor: 0,
            buffer: StreamBuffer::new(capacity),
            flags: StreamFlags::default(),
            last_errno: 0,
            child: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Underlying descriptor number (`fileno`).
    pub fn file_descriptor(&self) -> i32 {
        self.fd
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Path or command this stream was created from.
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffer_state(&self) -> BufferState {
        self.buffer.state()
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }

    /// Check if EOF has been reached.
    pub fn is_eof(&self) -> bool {
        self.flags.eof
    }

    /// Check if an underlying operation has failed.
    pub fn has_error(&self) -> bool {
        self.flags.error
    }

    /// Clear EOF and error indicators (`clearerr`).
    pub fn clear_error(&mut self) {
        self.flags = StreamFlags::default();
    }

    /// OS error of the most recent failure, if any.
    pub fn last_os_error(&self) -> Option<io::Error> {
        (self.last_errno != 0).then(|| errno::to_io_error(self.last_errno))
    }

    /// Process id of the child behind a process stream.
    pub fn child_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    // -----------------------------------------------------------------------
    // Position
    // -----------------------------------------------------------------------

    /// Caller-visible offset, independent of what is still buffered.
    pub fn tell(&self) -> i64 {
        self.cursor - self.buffer.unread() as i64 + self.buffer.pending() as i64
    }

    /// Reposition the stream and return the new offset.
    ///
    /// Pending writes are flushed and read-ahead is dropped first. A
    /// successful seek clears the EOF indicator. If the flush fails the
    /// unwritten bytes are discarded and the flush error is returned.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, StreamError> {
        let unread = self.buffer.unread() as i64;
        // The descriptor sits `unread` bytes past the caller's position.
        let offset = if whence == Whence::Current {
            match offset.checked_sub(unread) {
                Some(adjusted) => adjusted,
                None => {
                    self.fail(errno::EINVAL);
                    return Err(StreamError::seek(errno::EINVAL));
                }
            }
        } else {
            offset
        };
        self.buffer.discard_readahead();

        if self.buffer.pending() > 0 {
            if let Err(err) = self.flush() {
                self.buffer.clear();
                return Err(err);
            }
        }

        let result = match self.descriptor.as_mut() {
            Some(d) => d.seek(offset, whence),
            None => Err(errno::EBADF),
        };
        match result {
            Ok(pos) => {
                self.cursor = pos;
                self.flags.eof = false;
                Ok(pos)
            }
            Err(e) => {
                self.fail(e);
                Err(StreamError::seek(e))
            }
        }
    }

    /// `seek(0, Start)` plus [`Stream::clear_error`]; indicators are cleared
    /// even when the seek fails.
    pub fn rewind(&mut self) -> Result<(), StreamError> {
        let result = self.seek(0, Whence::Start);
        self.clear_error();
        result.map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Buffer engine
    // -----------------------------------------------------------------------

    /// Write out every pending byte.
    ///
    /// Short writes are continued. The first failed write sets the error
    /// indicator and stops; bytes written so far leave the buffer and the
    /// rest stay queued. Read-ahead is left untouched.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        while self.buffer.pending() > 0 {
            let result = match self.descriptor.as_mut() {
                Some(d) => d.write(self.buffer.pending_write_data()),
                None => Err(errno::EBADF),
            };
            match result {
                Ok(0) => {
                    self.fail(errno::EIO);
                    return Err(StreamError::write(errno::EIO));
                }
                Ok(n) => {
                    self.buffer.consume_written(n);
                    self.cursor += n as i64;
                }
                Err(e) => {
                    self.fail(e);
                    return Err(StreamError::write(e));
                }
            }
        }
        self.sync_append_cursor();
        Ok(())
    }

    /// Next byte, `Ok(None)` at end of input.
    pub fn get_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if let Some(byte) = self.buffer.next_byte() {
            return Ok(Some(byte));
        }
        self.prepare_read()?;
        if !self.fill()? {
            return Ok(None);
        }
        Ok(self.buffer.next_byte())
    }

    /// Buffer one byte, flushing first if the buffer is full.
    ///
    /// When that flush fails the error is returned, but the byte is still
    /// queued if the failed flush made room for it.
    pub fn put_byte(&mut self, byte: u8) -> Result<u8, StreamError> {
        self.prepare_write()?;
        if self.buffer.push(byte) {
            return Ok(byte);
        }
        let flushed = self.flush();
        let queued = self.buffer.push(byte);
        flushed?;
        debug_assert!(queued, "buffer still full after a clean flush");
        Ok(byte)
    }

    /// Read `count` elements of `element_size` bytes into `dst`.
    ///
    /// Returns whole elements transferred. A short count means EOF or an
    /// error; check [`Stream::is_eof`] / [`Stream::has_error`]. `count` is
    /// clamped to what fits in `dst`.
    pub fn read_block(&mut self, dst: &mut [u8], element_size: usize, count: usize) -> usize {
        if element_size == 0 {
            return 0;
        }
        let count = count.min(dst.len() / element_size);
        let (done, _) = self.read_inner(&mut dst[..element_size * count]);
        done / element_size
    }

    /// Write `count` elements of `element_size` bytes from `src`.
    ///
    /// Returns whole elements accepted (buffered or written). Stops early
    /// only when an underlying write fails.
    pub fn write_block(&mut self, src: &[u8], element_size: usize, count: usize) -> usize {
        if element_size == 0 {
            return 0;
        }
        let count = count.min(src.len() / element_size);
        let (done, _) = self.write_inner(&src[..element_size * count]);
        done / element_size
    }

    /// Byte-granular [`Stream::read_block`].
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> usize {
        self.read_inner(dst).0
    }

    /// Byte-granular [`Stream::write_block`].
    pub fn write_bytes(&mut self, src: &[u8]) -> usize {
        self.write_inner(src).0
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Flush, close the descriptor and release the stream.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned as `CloseFailed`. A child process, if any, is reaped.
    pub fn close(mut self) -> Result<(), StreamError> {
        self.shutdown()
    }

    /// Flush and close the descriptor exactly once. Later calls are no-ops.
    pub(super) fn shutdown(&mut self) -> Result<(), StreamError> {
        if self.descriptor.is_none() {
            return Ok(());
        }
        let flushed = self.flush();
        self.buffer.clear();

        let closed = match self.descriptor.take() {
            Some(d) => d.close().map_err(|e| StreamError::CloseFailed(errno::to_io_error(e))),
            None => Ok(()),
        };
        debug!(
            path = %self.pathname,
            fd = self.fd,
            flush_ok = flushed.is_ok(),
            close_ok = closed.is_ok(),
            "stream closed"
        );

        match flushed {
            Err(err) => Err(err.into_close_failure()),
            Ok(()) => closed,
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn fail(&mut self, errno: i32) {
        self.flags.error = true;
        self.last_errno = errno;
    }

    /// With `O_APPEND` the kernel picks the write offset; read it back.
    fn sync_append_cursor(&mut self) {
        if !self.mode.is_append() {
            return;
        }
        if let Some(Ok(pos)) = self.descriptor.as_mut().map(|d| d.seek(0, Whence::Current)) {
            self.cursor = pos;
        }
    }

    /// Resolve the buffer for reading: pending writes must reach the
    /// descriptor before read-ahead can use the buffer.
    fn prepare_read(&mut self) -> Result<(), StreamError> {
        if !self.mode.is_readable() {
            self.fail(errno::EBADF);
            return Err(StreamError::read(errno::EBADF));
        }
        if self.buffer.pending() > 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Resolve the buffer for writing: unread read-ahead is dropped and
    /// the descriptor moved back to the caller's position.
    fn prepare_write(&mut self) -> Result<(), StreamError> {
        if !self.mode.is_writable() {
            self.fail(errno::EBADF);
            return Err(StreamError::write(errno::EBADF));
        }
        let unread = self.buffer.discard_readahead();
        let target = if self.mode.is_append() && self.buffer.is_empty() {
            // O_APPEND writes land at end of file; count pending bytes from there.
            Some((0, Whence::End))
        } else if unread > 0 {
            Some((-(unread as i64), Whence::Current))
        } else {
            None
        };
        if let Some((offset, whence)) = target {
            if let Some(Ok(pos)) = self.descriptor.as_mut().map(|d| d.seek(offset, whence)) {
                self.cursor = pos;
            }
        }
        Ok(())
    }

    /// One read of up to `capacity` bytes into the empty buffer.
    ///
    /// `Ok(false)` at end of input.
    fn fill(&mut self) -> Result<bool, StreamError> {
        let result = match self.descriptor.as_mut() {
            Some(d) => d.read(self.buffer.fill_target()),
            None => Err(errno::EBADF),
        };
        match result {
            Ok(0) => {
                self.flags.eof = true;
                Ok(false)
            }
            Ok(n) => {
                self.buffer.commit_fill(n);
                self.cursor += n as i64;
                Ok(true)
            }
            Err(e) => {
                self.fail(e);
                Err(StreamError::read(e))
            }
        }
    }

    /// One read straight into caller memory, bypassing the buffer.
    fn read_direct(&mut self, dst: &mut [u8]) -> Result<usize, StreamError> {
        let result = match self.descriptor.as_mut() {
            Some(d) => d.read(dst),
            None => Err(errno::EBADF),
        };
        match result {
            Ok(0) => {
                self.flags.eof = true;
                Ok(0)
            }
            Ok(n) => {
                self.cursor += n as i64;
                Ok(n)
            }
            Err(e) => {
                self.fail(e);
                Err(StreamError::read(e))
            }
        }
    }

    /// Write all of `src` straight to the descriptor, continuing short
    /// writes. Returns bytes written and the error that stopped it, if any.
    fn write_direct(&mut self, src: &[u8]) -> (usize, Option<StreamError>) {
        let mut done = 0;
        while done < src.len() {
            let result = match self.descriptor.as_mut() {
                Some(d) => d.write(&src[done..]),
                None => Err(errno::EBADF),
            };
            match result {
                Ok(0) => {
                    self.fail(errno::EIO);
                    return (done, Some(StreamError::write(errno::EIO)));
                }
                Ok(n) => {
                    done += n;
                    self.cursor += n as i64;
                }
                Err(e) => {
                    self.fail(e);
                    return (done, Some(StreamError::write(e)));
                }
            }
        }
        self.sync_append_cursor();
        (done, None)
    }

    /// Fill `dst` from read-ahead, then from the descriptor. Requests of at
    /// least one buffer's worth bypass the buffer.
    fn read_inner(&mut self, dst: &mut [u8]) -> (usize, Option<StreamError>) {
        let mut done = self.buffer.take_into(dst);
        if done == dst.len() {
            return (done, None);
        }
        if let Err(err) = self.prepare_read() {
            return (done, Some(err));
        }
        while done < dst.len() {
            let rest = &mut dst[done..];
            if rest.len() >= self.buffer.capacity() {
                match self.read_direct(rest) {
                    Ok(0) => break,
                    Ok(n) => done += n,
                    Err(err) => return (done, Some(err)),
                }
            } else {
                match self.fill() {
                    Ok(true) => done += self.buffer.take_into(rest),
                    Ok(false) => break,
                    Err(err) => return (done, Some(err)),
                }
            }
        }
        (done, None)
    }

    /// Queue `src`, flushing whenever the buffer fills. With an empty
    /// buffer, a chunk of at least one buffer's worth is written directly.
    fn write_inner(&mut self, src: &[u8]) -> (usize, Option<StreamError>) {
        if src.is_empty() {
            return (0, None);
        }
        if let Err(err) = self.prepare_write() {
            return (0, Some(err));
        }
        let mut done = 0;
        while done < src.len() {
            let rest = &src[done..];
            if self.buffer.is_empty() && rest.len() >= self.buffer.capacity() {
                let (n, err) = self.write_direct(rest);
                done += n;
                if err.is_some() {
                    return (done, err);
                }
            } else {
                done += self.buffer.extend(rest);
                if self.buffer.is_full() {
                    if let Err(err) = self.flush() {
                        return (done, Some(err));
                    }
                }
            }
        }
        (done, None)
    }
}

impl<D: Descriptor> Drop for Stream<D> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(path = %self.pathname, error = %err, "stream teardown failed on drop");
        }
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => debug!(path = %self.pathname, %status, "child reaped on drop"),
                Err(err) => warn!(path = %self.pathname, error = %err, "cannot reap child"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::io adapters
// ---------------------------------------------------------------------------

impl<D: Descriptor> io::Read for Stream<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_inner(buf) {
            (0, Some(err)) => Err(err.into()),
            (n, _) => Ok(n),
        }
    }
}

impl<D: Descriptor> io::Write for Stream<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_inner(buf) {
            (0, Some(err)) => Err(err.into()),
            (n, _) => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Stream::flush(self).map_err(Into::into)
    }
}

impl<D: Descriptor> io::Seek for Stream<D> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(off) => (
                i64::try_from(off).map_err(|_| errno::to_io_error(errno::EINVAL))?,
                Whence::Start,
            ),
            io::SeekFrom::Current(off) => (off, Whence::Current),
            io::SeekFrom::End(off) => (off, Whence::End),
        };
        let pos = Stream::seek(self, offset, whence)?;
        Ok(pos as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::rc::Rc;

    use super::*;

    /// Observable state of a [`Scripted`] descriptor.
    #[derive(Debug, Default)]
    struct Backing {
        data: Vec<u8>,
        pos: usize,
        /// Largest chunk a single write accepts.
        max_write: Option<usize>,
        /// Successful writes left before `write_errno` kicks in.
        writes_before_failure: Option<usize>,
        write_errno: i32,
        read_errno: Option<i32>,
        close_errno: Option<i32>,
        seekable: bool,
        write_calls: usize,
        read_calls: usize,
        closed: bool,
    }

    /// In-memory descriptor with scripted short and failing writes.
    #[derive(Debug, Clone)]
    struct Scripted(Rc<RefCell<Backing>>);

    impl Scripted {
        fn new(data: &[u8]) -> Self {
            Scripted(Rc::new(RefCell::new(Backing {
                data: data.to_vec(),
                seekable: true,
                write_errno: errno::ENOSPC,
                ..Backing::default()
            })))
        }

        fn contents(&self) -> Vec<u8> {
            self.0.borrow().data.clone()
        }
    }

    impl Descriptor for Scripted {
        fn raw_fd(&self) -> i32 {
            42
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
            let mut b = self.0.borrow_mut();
            b.read_calls += 1;
            if let Some(e) = b.read_errno {
                return Err(e);
            }
            let start = b.pos.min(b.data.len());
            let n = buf.len().min(b.data.len() - start);
            buf[..n].copy_from_slice(&b.data[start..start + n]);
            b.pos = start + n;
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize, i32> {
            let mut b = self.0.borrow_mut();
            b.write_calls += 1;
            let budget = b.writes_before_failure;
            match budget {
                Some(0) => return Err(b.write_errno),
                Some(left) => b.writes_before_failure = Some(left - 1),
                None => {}
            }
            let n = b.max_write.map_or(buf.len(), |m| m.min(buf.len()));
            let pos = b.pos;
            if b.data.len() < pos + n {
                b.data.resize(pos + n, 0);
            }
            b.data[pos..pos + n].copy_from_slice(&buf[..n]);
            b.pos = pos + n;
            Ok(n)
        }

        fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, i32> {
            let mut b = self.0.borrow_mut();
            if !b.seekable {
                return Err(errno::ESPIPE);
            }
            let base = match whence {
                Whence::Start => 0,
                Whence::Current => b.pos as i64,
                Whence::End => b.data.len() as i64,
            };
            let target = base + offset;
            if target < 0 {
                return Err(errno::EINVAL);
            }
            b.pos = target as usize;
            Ok(target)
        }

        fn close(self) -> Result<(), i32> {
            let mut b = self.0.borrow_mut();
            b.closed = true;
            match b.close_errno {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn stream(data: &[u8], mode: OpenMode, capacity: usize) -> (Stream<Scripted>, Scripted) {
        let backing = Scripted::new(data);
        let s = Stream::from_descriptor(backing.clone(), mode, "scripted", capacity);
        (s, backing)
    }

    #[test]
    fn get_byte_fills_once_per_buffer() {
        let (mut s, backing) = stream(b"abcdef", OpenMode::Read, 4);
        let mut out = Vec::new();
        while let Some(b) = s.get_byte().unwrap() {
            out.push(b);
        }
        assert_eq!(out, b"abcdef");
        assert!(s.is_eof());
        assert!(!s.has_error());
        // 4 + 2 + the read that hit EOF.
        assert_eq!(backing.0.borrow().read_calls, 3);
    }

    #[test]
    fn tell_subtracts_unread_readahead() {
        let (mut s, _) = stream(b"abcdefgh", OpenMode::Read, 8);
        assert_eq!(s.get_byte().unwrap(), Some(b'a'));
        assert_eq!(s.buffer_state(), BufferState::Readahead { pos: 1, filled: 8 });
        assert_eq!(s.tell(), 1);
    }

    #[test]
    fn tell_is_flush_transparent() {
        let (mut s, _) = stream(b"", OpenMode::ReadWriteTruncate, 16);
        assert_eq!(s.write_bytes(b"hello"), 5);
        let before = s.tell();
        s.flush().unwrap();
        assert_eq!(before, 5);
        assert_eq!(s.tell(), before);
    }

    #[test]
    fn append_tell_counts_pending_from_end_of_file() {
        let (mut s, backing) = stream(b"head-tail", OpenMode::Append, 16);
        s.seek(0, Whence::Start).unwrap();
        s.put_byte(b'!').unwrap();
        let before = s.tell();
        assert_eq!(before, 10);
        s.flush().unwrap();
        assert_eq!(s.tell(), before);
        assert_eq!(backing.contents(), b"head-tail!");
    }

    #[test]
    fn append_write_after_read_goes_to_end() {
        let (mut s, backing) = stream(b"12345", OpenMode::AppendReadWrite, 16);
        assert_eq!(s.get_byte().unwrap(), Some(b'1'));
        s.write_bytes(b"6");
        assert_eq!(s.tell(), 6);
        s.flush().unwrap();
        assert_eq!(s.tell(), 6);
        assert_eq!(backing.contents(), b"123456");
    }

    #[test]
    fn put_byte_flushes_when_full() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 2);
        for b in *b"xyz" {
            assert_eq!(s.put_byte(b).unwrap(), b);
        }
        assert_eq!(backing.contents(), b"xy");
        assert_eq!(s.buffer_state(), BufferState::PendingWrite { len: 1 });
        s.close().unwrap();
        assert_eq!(backing.contents(), b"xyz");
    }

    #[test]
    fn flush_continues_short_writes() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 16);
        backing.0.borrow_mut().max_write = Some(3);
        s.write_bytes(b"0123456789");
        s.flush().unwrap();
        assert_eq!(backing.contents(), b"0123456789");
        assert_eq!(backing.0.borrow().write_calls, 4);
        assert_eq!(s.tell(), 10);
        assert!(!s.has_error());
    }

    #[test]
    fn failed_flush_keeps_unwritten_bytes() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 16);
        {
            let mut b = backing.0.borrow_mut();
            b.max_write = Some(4);
            b.writes_before_failure = Some(1);
        }
        s.write_bytes(b"abcdefgh");
        let err = s.flush().unwrap_err();
        assert!(matches!(err, StreamError::WriteFailed(_)));
        assert_eq!(err.errno(), errno::ENOSPC);
        assert!(s.has_error());
        assert_eq!(backing.contents(), b"abcd");
        assert_eq!(s.buffer_state(), BufferState::PendingWrite { len: 4 });
        // Position still counts the queued bytes.
        assert_eq!(s.tell(), 8);
    }

    #[test]
    fn put_byte_reports_flush_failure_but_queues() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 2);
        {
            let mut b = backing.0.borrow_mut();
            b.max_write = Some(1);
            b.writes_before_failure = Some(1);
        }
        s.put_byte(b'a').unwrap();
        s.put_byte(b'b').unwrap();
        // Buffer full: flush writes 'a', then fails; 'c' fits behind 'b'.
        assert!(s.put_byte(b'c').is_err());
        assert_eq!(s.buffer_state(), BufferState::PendingWrite { len: 2 });
        assert_eq!(backing.contents(), b"a");
        backing.0.borrow_mut().writes_before_failure = None;
        s.flush().unwrap();
        assert_eq!(backing.contents(), b"abc");
    }

    #[test]
    fn zero_length_write_is_an_error() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 8);
        backing.0.borrow_mut().max_write = Some(0);
        s.put_byte(b'q').unwrap();
        let err = s.flush().unwrap_err();
        assert_eq!(err.errno(), errno::EIO);
        assert!(s.has_error());
    }

    #[test]
    fn read_error_sets_error_not_eof() {
        let (mut s, backing) = stream(b"data", OpenMode::Read, 8);
        backing.0.borrow_mut().read_errno = Some(errno::EIO);
        assert!(matches!(s.get_byte(), Err(StreamError::ReadFailed(_))));
        assert!(s.has_error());
        assert!(!s.is_eof());
        assert_eq!(s.last_os_error().and_then(|e| e.raw_os_error()), Some(errno::EIO));
    }

    #[test]
    fn read_on_write_only_stream_fails() {
        let (mut s, backing) = stream(b"zz", OpenMode::Append, 8);
        assert!(s.get_byte().is_err());
        assert!(s.has_error());
        assert_eq!(backing.0.borrow().read_calls, 0);
    }

    #[test]
    fn write_on_read_only_stream_fails() {
        let (mut s, backing) = stream(b"", OpenMode::Read, 8);
        assert!(s.put_byte(b'x').is_err());
        assert_eq!(s.write_block(b"abcd", 2, 2), 0);
        assert!(s.has_error());
        assert_eq!(backing.0.borrow().write_calls, 0);
    }

    #[test]
    fn write_after_read_lands_at_logical_position() {
        let (mut s, backing) = stream(b"abcdef", OpenMode::ReadWrite, 16);
        assert_eq!(s.get_byte().unwrap(), Some(b'a'));
        assert_eq!(s.get_byte().unwrap(), Some(b'b'));
        s.put_byte(b'X').unwrap();
        assert_eq!(s.tell(), 3);
        s.flush().unwrap();
        assert_eq!(backing.contents(), b"abXdef");
        assert_eq!(s.get_byte().unwrap(), Some(b'd'));
    }

    #[test]
    fn read_after_write_flushes_first() {
        let (mut s, backing) = stream(b"0123456789", OpenMode::ReadWrite, 16);
        s.write_bytes(b"ab");
        assert_eq!(s.get_byte().unwrap(), Some(b'2'));
        assert_eq!(&backing.contents()[..4], b"ab23");
        assert_eq!(s.tell(), 3);
    }

    #[test]
    fn seek_discards_readahead() {
        let (mut s, _) = stream(b"abcdefgh", OpenMode::Read, 8);
        s.get_byte().unwrap();
        assert_eq!(s.seek(5, Whence::Start).unwrap(), 5);
        assert!(s.buffer_state() == BufferState::Empty);
        assert_eq!(s.get_byte().unwrap(), Some(b'f'));
    }

    #[test]
    fn seek_current_is_relative_to_logical_position() {
        let (mut s, _) = stream(b"abcdefgh", OpenMode::Read, 8);
        s.get_byte().unwrap();
        s.get_byte().unwrap();
        assert_eq!(s.seek(1, Whence::Current).unwrap(), 3);
        assert_eq!(s.get_byte().unwrap(), Some(b'd'));
        assert_eq!(s.seek(-2, Whence::End).unwrap(), 6);
        assert_eq!(s.get_byte().unwrap(), Some(b'g'));
    }

    #[test]
    fn seek_flushes_pending_then_moves() {
        let (mut s, backing) = stream(b"", OpenMode::ReadWriteTruncate, 16);
        s.write_bytes(b"hello");
        s.seek(0, Whence::Start).unwrap();
        assert_eq!(backing.contents(), b"hello");
        let mut out = [0u8; 5];
        assert_eq!(s.read_block(&mut out, 1, 5), 5);
        assert_eq!(&out, b"hello");
        assert!(!s.is_eof());
        assert_eq!(s.get_byte().unwrap(), None);
        assert!(s.is_eof());
    }

    #[test]
    fn seek_clears_eof_but_not_error() {
        let (mut s, _) = stream(b"ab", OpenMode::Read, 8);
        let mut out = [0u8; 4];
        assert_eq!(s.read_block(&mut out, 1, 4), 2);
        assert!(s.is_eof());
        s.fail(errno::EIO);
        s.seek(0, Whence::Start).unwrap();
        assert!(!s.is_eof());
        assert!(s.has_error());
    }

    #[test]
    fn seek_failure_sets_error_and_clears_buffer() {
        let (mut s, backing) = stream(b"abcdef", OpenMode::Read, 8);
        s.get_byte().unwrap();
        backing.0.borrow_mut().seekable = false;
        let err = s.seek(0, Whence::Start).unwrap_err();
        assert!(matches!(err, StreamError::SeekFailed(_)));
        assert_eq!(err.errno(), errno::ESPIPE);
        assert!(s.has_error());
        assert_eq!(s.buffer_state(), BufferState::Empty);
    }

    #[test]
    fn seek_current_offset_overflow_is_rejected() {
        let (mut s, _) = stream(b"abcdef", OpenMode::Read, 8);
        assert_eq!(s.get_byte().unwrap(), Some(b'a'));
        let err = s.seek(i64::MIN, Whence::Current).unwrap_err();
        assert!(matches!(err, StreamError::SeekFailed(_)));
        assert_eq!(err.errno(), errno::EINVAL);
        assert!(s.has_error());
        // Read-ahead survives, so the position is unchanged.
        assert_eq!(s.tell(), 1);
        assert_eq!(s.get_byte().unwrap(), Some(b'b'));

        let err = Seek::seek(&mut s, SeekFrom::Current(i64::MIN)).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(errno::EINVAL));
    }

    #[test]
    fn seek_with_failed_flush_discards_pending() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 8);
        backing.0.borrow_mut().writes_before_failure = Some(0);
        s.write_bytes(b"lost");
        assert!(matches!(s.seek(0, Whence::Start), Err(StreamError::WriteFailed(_))));
        assert_eq!(s.buffer_state(), BufferState::Empty);
        assert!(backing.contents().is_empty());
    }

    #[test]
    fn rewind_clears_indicators() {
        let (mut s, _) = stream(b"x", OpenMode::Read, 8);
        s.get_byte().unwrap();
        s.get_byte().unwrap();
        s.fail(errno::EIO);
        s.rewind().unwrap();
        assert_eq!(s.flags(), StreamFlags::default());
        assert_eq!(s.get_byte().unwrap(), Some(b'x'));
    }

    #[test]
    fn read_block_counts_whole_elements() {
        let (mut s, _) = stream(b"0123456", OpenMode::Read, 4);
        let mut out = [0u8; 8];
        assert_eq!(s.read_block(&mut out, 2, 4), 3);
        assert_eq!(&out[..7], b"0123456");
        assert!(s.is_eof());
        assert!(!s.has_error());
    }

    #[test]
    fn read_block_clamps_to_destination() {
        let (mut s, _) = stream(b"abcdef", OpenMode::Read, 4);
        let mut out = [0u8; 3];
        assert_eq!(s.read_block(&mut out, 2, 10), 1);
        assert_eq!(&out[..2], b"ab");
        assert_eq!(s.read_block(&mut out, 0, 10), 0);
    }

    #[test]
    fn large_read_bypasses_buffer() {
        let data: Vec<u8> = (0..=255u8).cycle().take(40).collect();
        let (mut s, backing) = stream(&data, OpenMode::Read, 8);
        let mut out = vec![0u8; 40];
        assert_eq!(s.read_bytes(&mut out), 40);
        assert_eq!(out, data);
        assert_eq!(backing.0.borrow().read_calls, 1);
        assert_eq!(s.buffer_state(), BufferState::Empty);
        assert_eq!(s.tell(), 40);
    }

    #[test]
    fn large_write_bypasses_buffer() {
        let data = vec![7u8; 20];
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 8);
        assert_eq!(s.write_block(&data, 4, 5), 5);
        assert_eq!(backing.0.borrow().write_calls, 1);
        assert_eq!(backing.contents(), data);
        assert_eq!(s.tell(), 20);
    }

    #[test]
    fn write_block_stops_on_failure() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 4);
        backing.0.borrow_mut().writes_before_failure = Some(0);
        s.put_byte(b'z').unwrap();
        // "abc" fills the buffer behind 'z', then the flush fails.
        assert_eq!(s.write_block(b"abcdefgh", 2, 3), 1);
        assert!(s.has_error());
        assert_eq!(s.buffer_state(), BufferState::PendingWrite { len: 4 });
    }

    #[test]
    fn close_reports_first_failure_and_releases() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 8);
        {
            let mut b = backing.0.borrow_mut();
            b.writes_before_failure = Some(0);
            b.close_errno = Some(errno::EBADF);
        }
        s.put_byte(b'a').unwrap();
        let err = s.close().unwrap_err();
        assert!(matches!(err, StreamError::CloseFailed(_)));
        assert_eq!(err.errno(), errno::ENOSPC);
        assert!(backing.0.borrow().closed);
    }

    #[test]
    fn close_failure_alone_is_reported() {
        let (s, backing) = stream(b"", OpenMode::Read, 8);
        backing.0.borrow_mut().close_errno = Some(errno::EIO);
        let err = s.close().unwrap_err();
        assert_eq!(err.errno(), errno::EIO);
    }

    #[test]
    fn drop_flushes_and_closes() {
        let (mut s, backing) = stream(b"", OpenMode::WriteTruncate, 8);
        s.write_bytes(b"kept");
        drop(s);
        assert_eq!(backing.contents(), b"kept");
        assert!(backing.0.borrow().closed);
    }

    #[test]
    fn std_io_traits_round_trip() {
        let (mut s, _) = stream(b"", OpenMode::ReadWriteTruncate, 4);
        s.write_all(b"through std::io").unwrap();
        Write::flush(&mut s).unwrap();
        assert_eq!(Seek::seek(&mut s, SeekFrom::Start(8)).unwrap(), 8);
        let mut out = String::new();
        s.read_to_string(&mut out).unwrap();
        assert_eq!(out, "std::io");
    }

    #[test]
    fn std_io_read_surfaces_os_error() {
        let (mut s, backing) = stream(b"abc", OpenMode::Read, 4);
        backing.0.borrow_mut().read_errno = Some(errno::EIO);
        let mut buf = [0u8; 2];
        let err = Read::read(&mut s, &mut buf).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(errno::EIO));
    }
}
