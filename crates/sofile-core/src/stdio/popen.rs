//! Process-backed streams (`popen` / `pclose`).
//!
//! The command runs as `<shell> -c <command>` with one end of a pipe as
//! its stdout (direction `r`) or stdin (direction `w`). Both pipe ends are
//! close-on-exec, so the child sees only the end wired to its standard
//! stream and unrelated children never hold a copy.

use std::os::fd::OwnedFd;
use std::process::{Command, Stdio};

use tracing::debug;

use super::error::StreamError;
use super::mode::PipeDirection;
use super::stream::Stream;
use crate::config::{StdioConfig, stdio_config};
use crate::errno;
use crate::io::{self, Fd};
use crate::process::WaitStatus;

impl Stream<Fd> {
    /// Run `command` through the shell, connected by a pipe.
    ///
    /// `direction` is `"r"` to read the child's stdout or `"w"` to feed its
    /// stdin.
    pub fn popen(command: &str, direction: &str) -> Result<Self, StreamError> {
        let Some(direction) = PipeDirection::parse(direction) else {
            return Err(StreamError::InvalidMode(direction.to_owned()));
        };
        Self::popen_with_config(command, direction, stdio_config())
    }

    /// [`Stream::popen`] with explicit direction and configuration.
    pub fn popen_with_config(
        command: &str,
        direction: PipeDirection,
        config: &StdioConfig,
    ) -> Result<Self, StreamError> {
        let (read_end, write_end) =
            io::pipe().map_err(|e| StreamError::SpawnFailed(errno::to_io_error(e)))?;
        let (local, remote) = match direction {
            PipeDirection::Read => (read_end, write_end),
            PipeDirection::Write => (write_end, read_end),
        };

        let spawned = {
            let mut cmd = Command::new(&config.shell);
            cmd.arg("-c").arg(command);
            let remote = Stdio::from(OwnedFd::from(remote));
            match direction {
                PipeDirection::Read => cmd.stdout(remote),
                PipeDirection::Write => cmd.stdin(remote),
            };
            cmd.spawn()
            // `cmd` drops here and closes our copy of the child's end.
        };
        // On failure `local` drops with this frame, so no descriptor leaks.
        let child = spawned.map_err(StreamError::SpawnFailed)?;

        let mut stream =
            Stream::from_descriptor(local, direction.open_mode(), command, config.buffer_size);
        debug!(
            command,
            pid = child.id(),
            fd = stream.file_descriptor(),
            ?direction,
            "process stream spawned"
        );
        stream.child = Some(child);
        Ok(stream)
    }

    /// Flush, close the pipe, then wait for the child.
    ///
    /// The child is reaped even if flushing or closing fails; the first
    /// failure wins. Calling this on a file stream closes it and reports
    /// `ECHILD`.
    pub fn pclose(mut self) -> Result<WaitStatus, StreamError> {
        let closed = self.shutdown();
        let waited = match self.child.take() {
            Some(mut child) => child.wait().map_err(StreamError::WaitFailed),
            None => Err(StreamError::WaitFailed(errno::to_io_error(errno::ECHILD))),
        };
        closed?;
        let status = WaitStatus::from(waited?);
        debug!(command = %self.pathname(), %status, "process stream closed");
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
