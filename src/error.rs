//! Startup and infrastructure errors.
//!
//! Request-level failures (404, 403, ...) are expressed as HTTP responses,
//! not as `Error`s. This type covers what can stop the server from starting:
//! bad configuration, an unusable served root, or a socket that won't bind.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    /// Configuration could not be loaded or deserialized
    Config(::config::ConfigError),
    /// `server.host` / `server.port` do not form a socket address
    InvalidAddress(String),
    /// `server.root` is missing or not a directory
    InvalidRoot(PathBuf, std::io::Error),
    /// Socket or log file I/O
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::InvalidAddress(addr) => write!(f, "invalid listen address: {addr}"),
            Self::InvalidRoot(path, e) => {
                write!(f, "cannot serve '{}': {e}", path.display())
            }
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::InvalidRoot(_, e) | Self::Io(e) => Some(e),
            Self::InvalidAddress(_) => None,
        }
    }
}

impl From<::config::ConfigError> for Error {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
