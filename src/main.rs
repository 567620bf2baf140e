use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use coiserve::config::{AppState, Config, Overrides};
use coiserve::{logger, server};

/// Serve a directory over HTTP with cross-origin isolation headers
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to ./coiserve.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind, e.g. 0.0.0.0 to listen on all interfaces
    #[arg(long, value_name = "HOSTNAME_OR_IP")]
    host: Option<String>,

    #[arg(short, long, value_name = "NUM")]
    port: Option<u16>,

    /// Directory to serve
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Runtime worker threads (defaults to the number of CPU cores)
    #[arg(short, long, value_name = "NUM")]
    workers: Option<usize>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            root: self.root.clone(),
            workers: self.workers,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = Config::load_from(cli.config.as_deref(), &cli.overrides())?;

    if cli.dump_config {
        print!("{}", cfg.to_toml()?);
        return Ok(());
    }

    logger::init(&cfg.logging)?;

    let addr = cfg.get_socket_addr()?;
    let state = Arc::new(AppState::new(cfg)?);

    // Tokio runtime sized from `server.workers`
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    match state.config.server.workers {
        Some(0) => logger::log_warning("server.workers = 0 ignored, using CPU core count"),
        Some(workers) => {
            runtime_builder.worker_threads(workers);
        }
        None => {}
    }
    if state.config.performance.max_connections == Some(0) {
        logger::log_warning("performance.max_connections = 0 means no connection limit");
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async move {
        let listener = server::create_listener(addr).map_err(|e| {
            logger::log_error(&format!("Failed to bind {addr}: {e}"));
            e
        })?;
        let local_addr = listener.local_addr()?;

        logger::log_server_start(&local_addr, &state.config, &state.root);
        server::run(listener, state).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
