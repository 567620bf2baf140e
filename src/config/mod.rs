// Configuration module entry point
// Loads layered configuration and builds the immutable runtime state

mod state;
mod types;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::error::Error;

// Re-export public types
pub use state::AppState;
pub use types::{Config, HttpConfig, LoggingConfig, MimeConfig, PerformanceConfig, ServerConfig};

/// Default config file name (without extension) looked up in the working directory
pub const DEFAULT_CONFIG_NAME: &str = "coiserve";

/// Environment variable prefix, e.g. `COISERVE_SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "COISERVE";

/// Values given on the command line; they win over every other source
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub workers: Option<usize>,
}

impl Config {
    /// Load configuration: defaults, then the config file, then
    /// `COISERVE_*` environment variables, then command-line overrides.
    ///
    /// An explicit `config_path` must exist; the default `coiserve.toml`
    /// is optional.
    pub fn load_from(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self, Error> {
        Self::load_layers(config_path, None, overrides)
    }

    /// `env` replaces the process environment when given
    fn load_layers(
        config_path: Option<&Path>,
        env: Option<config::Map<String, String>>,
        overrides: &Overrides,
    ) -> Result<Self, Error> {
        let file = match config_path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .set_override_option("server.host", overrides.host.clone())?
            .set_override_option("server.port", overrides.port.map(u64::from))?
            .set_override_option(
                "server.root",
                overrides
                    .root
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option(
                "server.workers",
                overrides.workers.and_then(|w| u64::try_from(w).ok()),
            )?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Resolve `server.host` and `server.port` into the address to bind
    pub fn get_socket_addr(&self) -> Result<SocketAddr, Error> {
        let display = format!("{}:{}", self.server.host, self.server.port);
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .map_err(|e| Error::InvalidAddress(format!("{display} ({e})")))?
            .next()
            .ok_or(Error::InvalidAddress(display))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
