//! Buffered streams.
//!
//! File streams come from [`Stream::open`], process streams from
//! [`Stream::popen`]. Both share the buffer engine in [`stream`].

pub mod buffer;
pub mod error;
pub mod mode;
pub mod popen;
pub mod stream;

pub use crate::io::Whence;
pub use crate::process::WaitStatus;
pub use buffer::BufferState;
pub use error::StreamError;
pub use mode::{CREATE_MODE, OpenMode, PipeDirection};
pub use stream::{Stream, StreamFlags};
