//! Open modes.
//!
//! Exactly six mode strings are accepted: `r`, `r+`, `w`, `w+`, `a`, `a+`.
//! No `b`, `x` or other modifiers. Each maps to a fixed set of `O_*` flags;
//! every mode that can create a file creates it with permission 0644.

use std::fmt;

/// Permission bits for files created by `w`, `w+`, `a` and `a+`.
pub const CREATE_MODE: u32 = 0o644;

/// How a stream was opened. Fixed for the stream's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// `r`: read-only, file must exist.
    Read,
    /// `r+`: read-write, file must exist.
    ReadWrite,
    /// `w`: write-only, create, truncate.
    WriteTruncate,
    /// `w+`: read-write, create, truncate.
    ReadWriteTruncate,
    /// `a`: write-only, create, every write lands at end of file.
    Append,
    /// `a+`: read-write, create, every write lands at end of file.
    AppendReadWrite,
}

impl OpenMode {
    pub const ALL: [OpenMode; 6] = [
        OpenMode::Read,
        OpenMode::ReadWrite,
        OpenMode::WriteTruncate,
        OpenMode::ReadWriteTruncate,
        OpenMode::Append,
        OpenMode::AppendReadWrite,
    ];

    /// Parse a mode string. Returns `None` for anything outside the six.
    pub fn parse(mode: &str) -> Option<OpenMode> {
        Self::parse_bytes(mode.as_bytes())
    }

    /// Parse a mode given as raw bytes (as received over the C ABI).
    pub fn parse_bytes(mode: &[u8]) -> Option<OpenMode> {
        match mode {
            b"r" => Some(OpenMode::Read),
            b"r+" => Some(OpenMode::ReadWrite),
            b"w" => Some(OpenMode::WriteTruncate),
            b"w+" => Some(OpenMode::ReadWriteTruncate),
            b"a" => Some(OpenMode::Append),
            b"a+" => Some(OpenMode::AppendReadWrite),
            _ => None,
        }
    }

    /// Canonical mode string.
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::ReadWrite => "r+",
            OpenMode::WriteTruncate => "w",
            OpenMode::ReadWriteTruncate => "w+",
            OpenMode::Append => "a",
            OpenMode::AppendReadWrite => "a+",
        }
    }

    pub fn is_readable(self) -> bool {
        !matches!(self, OpenMode::WriteTruncate | OpenMode::Append)
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    pub fn is_append(self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::AppendReadWrite)
    }

    /// `O_*` flags for `open(2)`. Always includes `O_CLOEXEC`.
    pub fn oflags(self) -> i32 {
        let access = match self {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::WriteTruncate => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            OpenMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
            OpenMode::ReadWrite => libc::O_RDWR,
            OpenMode::ReadWriteTruncate => libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC,
            OpenMode::AppendReadWrite => libc::O_RDWR | libc::O_CREAT | libc::O_APPEND,
        };
        access | libc::O_CLOEXEC
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way bytes flow between a process stream and its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeDirection {
    /// The stream reads what the child writes to stdout.
    Read,
    /// The stream writes what the child reads from stdin.
    Write,
}

impl PipeDirection {
    /// Parse `"r"` or `"w"`.
    pub fn parse(direction: &str) -> Option<PipeDirection> {
        Self::parse_bytes(direction.as_bytes())
    }

    pub fn parse_bytes(direction: &[u8]) -> Option<PipeDirection> {
        match direction {
            b"r" => Some(PipeDirection::Read),
            b"w" => Some(PipeDirection::Write),
            _ => None,
        }
    }

    /// Stream mode equivalent for the local pipe end.
    pub fn open_mode(self) -> OpenMode {
        match self {
            PipeDirection::Read => OpenMode::Read,
            PipeDirection::Write => OpenMode::WriteTruncate,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
