//! Stream configuration.
//!
//! Two knobs are read from the environment on first use:
//! - `SOFILE_BUFSIZE`: capacity of each stream's buffer in bytes
//!   (default 4096, clamped to `1..=MAX_BUFFER_SIZE`, unparsable values
//!   fall back to the default).
//! - `SOFILE_SHELL`: command interpreter used by process streams
//!   (default `/bin/sh`, invoked as `<shell> -c <command>`).
//!
//! Streams capture the configuration at construction; changing the
//! environment later does not affect open streams or the cached value.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default buffer capacity (`BUFSIZE`).
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Upper bound accepted from `SOFILE_BUFSIZE`.
pub const MAX_BUFFER_SIZE: usize = 1 << 20;

/// Default command interpreter for process streams.
pub const DEFAULT_SHELL: &str = "/bin/sh";

pub const ENV_BUFFER_SIZE: &str = "SOFILE_BUFSIZE";
pub const ENV_SHELL: &str = "SOFILE_SHELL";

/// Construction-time parameters shared by every stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioConfig {
    /// Capacity of the single read/write buffer.
    pub buffer_size: usize,
    /// Interpreter for process streams.
    pub shell: PathBuf,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl StdioConfig {
    /// Build from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let buffer_size = lookup(ENV_BUFFER_SIZE)
            .map(|raw| parse_buffer_size(&raw))
            .unwrap_or(defaults.buffer_size);
        let shell = lookup(ENV_SHELL)
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.shell);
        Self { buffer_size, shell }
    }

    /// Same configuration with a different buffer capacity.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.clamp(1, MAX_BUFFER_SIZE);
        self
    }
}

fn parse_buffer_size(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => DEFAULT_BUFFER_SIZE,
        Ok(n) => n.min(MAX_BUFFER_SIZE),
    }
}

/// Process-wide configuration, resolved from the environment once.
pub fn stdio_config() -> &'static StdioConfig {
    static CONFIG: OnceLock<StdioConfig> = OnceLock::new();
    CONFIG.get_or_init(StdioConfig::from_env)
}
