// Application state module
// Immutable runtime state shared by every connection task

use std::path::PathBuf;

use super::types::Config;
use crate::error::Error;
use crate::http::mime::MimeTable;

/// Application state
///
/// Built once before the listener starts and shared through `Arc`;
/// nothing in here is written after construction.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    /// Canonical form of `config.server.root`
    pub root: PathBuf,
    pub mime: MimeTable,
}

impl AppState {
    /// Canonicalize the served root and build the MIME table
    pub fn new(config: Config) -> Result<Self, Error> {
        let root = config
            .server
            .root
            .canonicalize()
            .map_err(|e| Error::InvalidRoot(config.server.root.clone(), e))?;

        if !root.is_dir() {
            return Err(Error::InvalidRoot(
                config.server.root.clone(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let mime = MimeTable::new(&config.mime.overrides);

        Ok(Self { config, root, mime })
    }
}
