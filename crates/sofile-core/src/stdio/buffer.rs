//! Single shared stream buffer.
//!
//! One fixed-capacity byte array serves both directions, never both at
//! once. Occupancy is a tagged state rather than a pair of loose offsets:
//!
//! - `Empty`: nothing buffered.
//! - `Readahead { pos, filled }`: bytes `pos..filled` were fetched from the
//!   descriptor but not yet handed to the caller.
//! - `PendingWrite { len }`: bytes `0..len` were accepted from the caller
//!   but not yet written to the descriptor.
//!
//! Invariants:
//! - `pos < filled <= capacity` while in `Readahead` (an exhausted
//!   read-ahead collapses to `Empty`).
//! - `0 < len <= capacity` while in `PendingWrite` (a drained write buffer
//!   collapses to `Empty`).
//! - write-side calls are never made while read-ahead is live; the stream
//!   resolves direction before switching.

/// Occupancy of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Readahead { pos: usize, filled: usize },
    PendingWrite { len: usize },
}

/// Fixed-capacity buffer with direction-tagged occupancy.
#[derive(Debug)]
pub struct StreamBuffer {
    data: Box<[u8]>,
    state: BufferState,
}

impl StreamBuffer {
    /// Create an empty buffer. Capacity is at least one byte.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            state: BufferState::Empty,
        }
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current occupancy.
    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == BufferState::Empty
    }

    /// Bytes fetched from the descriptor that the caller has not consumed.
    pub fn unread(&self) -> usize {
        match self.state {
            BufferState::Readahead { pos, filled } => filled - pos,
            _ => 0,
        }
    }

    /// Bytes accepted from the caller that are not yet written out.
    pub fn pending(&self) -> usize {
        match self.state {
            BufferState::PendingWrite { len } => len,
            _ => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Take the next read-ahead byte, if any.
    pub fn next_byte(&mut self) -> Option<u8> {
        let BufferState::Readahead { pos, filled } = self.state else {
            return None;
        };
        let byte = self.data[pos];
        self.set_readahead(pos + 1, filled);
        Some(byte)
    }

    /// Copy as many read-ahead bytes as fit into `dst`. Returns the count.
    pub fn take_into(&mut self, dst: &mut [u8]) -> usize {
        let BufferState::Readahead { pos, filled } = self.state else {
            return 0;
        };
        let take = dst.len().min(filled - pos);
        dst[..take].copy_from_slice(&self.data[pos..pos + take]);
        self.set_readahead(pos + take, filled);
        take
    }

    /// Whole buffer as a fill target. Only valid while `Empty`.
    pub fn fill_target(&mut self) -> &mut [u8] {
        debug_assert!(self.is_empty(), "fill over live buffer: {:?}", self.state);
        &mut self.data
    }

    /// Record that `n` bytes were read into the fill target.
    pub fn commit_fill(&mut self, n: usize) {
        debug_assert!(self.is_empty());
        let n = n.min(self.data.len());
        self.set_readahead(0, n);
    }

    /// Drop unconsumed read-ahead. Returns how many bytes were discarded.
    pub fn discard_readahead(&mut self) -> usize {
        let unread = self.unread();
        if matches!(self.state, BufferState::Readahead { .. }) {
            self.state = BufferState::Empty;
        }
        unread
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Append one byte. Returns `false` if the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        debug_assert!(self.unread() == 0, "write over live read-ahead");
        let len = self.pending();
        if len == self.data.len() {
            return false;
        }
        self.data[len] = byte;
        self.state = BufferState::PendingWrite { len: len + 1 };
        true
    }

    /// Append as much of `src` as fits. Returns the count accepted.
    pub fn extend(&mut self, src: &[u8]) -> usize {
        debug_assert!(self.unread() == 0, "write over live read-ahead");
        let len = self.pending();
        let take = src.len().min(self.data.len() - len);
        if take == 0 {
            return 0;
        }
        self.data[len..len + take].copy_from_slice(&src[..take]);
        self.state = BufferState::PendingWrite { len: len + take };
        take
    }

    pub fn is_full(&self) -> bool {
        self.pending() == self.data.len()
    }

    /// Bytes waiting to be written, in order.
    pub fn pending_write_data(&self) -> &[u8] {
        &self.data[..self.pending()]
    }

    /// Remove the first `n` pending bytes after they reached the descriptor.
    ///
    /// The unwritten remainder moves to the front of the buffer.
    pub fn consume_written(&mut self, n: usize) {
        let len = self.pending();
        let n = n.min(len);
        if n == len {
            if len > 0 {
                self.state = BufferState::Empty;
            }
            return;
        }
        self.data.copy_within(n..len, 0);
        self.state = BufferState::PendingWrite { len: len - n };
    }

    /// Discard everything regardless of direction.
    pub fn clear(&mut self) {
        self.state = BufferState::Empty;
    }

    fn set_readahead(&mut self, pos: usize, filled: usize) {
        self.state = if pos < filled {
            BufferState::Readahead { pos, filled }
        } else {
            BufferState::Empty
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
