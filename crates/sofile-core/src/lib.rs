//! # sofile-core
//!
//! Buffered byte streams over raw file descriptors.
//!
//! A [`stdio::Stream`] owns one descriptor (a regular file or one end of a
//! pipe to a child process), one fixed-capacity buffer shared by both
//! directions, and the cursor/flag bookkeeping of a C `FILE`. Only the
//! [`syscall`] module is allowed `unsafe`; everything above it is safe Rust.

#![deny(unsafe_code)]

pub mod config;
pub mod errno;
pub mod io;
pub mod process;
pub mod stdio;
#[allow(unsafe_code)]
pub mod syscall;

pub use config::{StdioConfig, stdio_config};
pub use stdio::{OpenMode, PipeDirection, Stream, StreamError, WaitStatus, Whence};
