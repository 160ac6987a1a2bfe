//! # sofile-abi
//!
//! C ABI over `sofile-core`. Streams are handed out as opaque `SO_FILE*`
//! handles; failures return a sentinel and set the host `errno`.

pub mod errno_abi;
pub mod stdio_abi;

pub use stdio_abi::SO_EOF;
