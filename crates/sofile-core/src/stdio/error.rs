//! Stream error taxonomy.

use std::io;

use thiserror::Error;

use crate::errno;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid open mode {0:?}")]
    InvalidMode(String),
    #[error("cannot open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("seek failed: {0}")]
    SeekFailed(#[source] io::Error),
    #[error("cannot spawn process: {0}")]
    SpawnFailed(#[source] io::Error),
    #[error("cannot reap child process: {0}")]
    WaitFailed(#[source] io::Error),
    #[error("close failed: {0}")]
    CloseFailed(#[source] io::Error),
}

impl StreamError {
    pub(crate) fn read(errno: i32) -> Self {
        StreamError::ReadFailed(errno::to_io_error(errno))
    }

    pub(crate) fn write(errno: i32) -> Self {
        StreamError::WriteFailed(errno::to_io_error(errno))
    }

    pub(crate) fn seek(errno: i32) -> Self {
        StreamError::SeekFailed(errno::to_io_error(errno))
    }

    /// Raw OS error number behind this failure.
    ///
    /// `InvalidMode` maps to `EINVAL`; errors without an OS code map to `EIO`.
    pub fn errno(&self) -> i32 {
        match self {
            StreamError::InvalidMode(_) => errno::EINVAL,
            StreamError::OpenFailed { source, .. }
            | StreamError::ReadFailed(source)
            | StreamError::WriteFailed(source)
            | StreamError::SeekFailed(source)
            | StreamError::SpawnFailed(source)
            | StreamError::WaitFailed(source)
            | StreamError::CloseFailed(source) => source.raw_os_error().unwrap_or(errno::EIO),
        }
    }

    /// Re-wrap as `CloseFailed`, keeping the underlying OS error.
    pub(crate) fn into_close_failure(self) -> Self {
        match self {
            StreamError::CloseFailed(_) => self,
            StreamError::InvalidMode(_) => StreamError::CloseFailed(errno::to_io_error(errno::EINVAL)),
            StreamError::OpenFailed { source, .. }
            | StreamError::ReadFailed(source)
            | StreamError::WriteFailed(source)
            | StreamError::SeekFailed(source)
            | StreamError::SpawnFailed(source)
            | StreamError::WaitFailed(source) => StreamError::CloseFailed(source),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::InvalidMode(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            StreamError::OpenFailed { source, .. }
            | StreamError::ReadFailed(source)
            | StreamError::WriteFailed(source)
            | StreamError::SeekFailed(source)
            | StreamError::SpawnFailed(source)
            | StreamError::WaitFailed(source)
            | StreamError::CloseFailed(source) => source,
        }
    }
}
