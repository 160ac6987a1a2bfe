//! Child process status.
//!
//! Process streams report how their child ended as a raw `waitpid` status.
//! The decoding helpers follow the glibc bit layout; [`WaitStatus`] wraps
//! them for Rust callers.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

// ---------------------------------------------------------------------------
// Wait-status decoding (glibc bit layout)
// ---------------------------------------------------------------------------

/// True if the child terminated normally (via `_exit` or `exit`).
#[must_use]
pub const fn wifexited(status: i32) -> bool {
    (status & 0x7f) == 0
}

/// Exit code of a normally-terminated child (valid only when `wifexited`).
#[must_use]
pub const fn wexitstatus(status: i32) -> i32 {
    (status >> 8) & 0xff
}

/// True if the child was killed by a signal.
#[must_use]
pub const fn wifsignaled(status: i32) -> bool {
    let low7 = status & 0x7f;
    low7 != 0 && low7 != 0x7f
}

/// Signal number that killed the child (valid only when `wifsignaled`).
#[must_use]
pub const fn wtermsig(status: i32) -> i32 {
    status & 0x7f
}

// ---------------------------------------------------------------------------
// WaitStatus
// ---------------------------------------------------------------------------

/// Termination status of a reaped child, as `waitpid` reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus(i32);

impl WaitStatus {
    pub const fn from_raw(raw: i32) -> Self {
        WaitStatus(raw)
    }

    /// Raw status word, as returned by `pclose`.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Exit code if the child exited normally.
    pub const fn exit_code(self) -> Option<i32> {
        if wifexited(self.0) {
            Some(wexitstatus(self.0))
        } else {
            None
        }
    }

    /// Signal number if the child was killed by a signal.
    pub const fn signal(self) -> Option<i32> {
        if wifsignaled(self.0) {
            Some(wtermsig(self.0))
        } else {
            None
        }
    }

    pub const fn success(self) -> bool {
        matches!(self.exit_code(), Some(0))
    }
}

impl From<ExitStatus> for WaitStatus {
    fn from(status: ExitStatus) -> Self {
        WaitStatus(status.into_raw())
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code(), self.signal()) {
            (Some(code), _) => write!(f, "exit status {code}"),
            (None, Some(sig)) => write!(f, "killed by signal {sig}"),
            (None, None) => write!(f, "wait status {:#x}", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
