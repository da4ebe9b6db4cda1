//! Server configuration
//!
//! Every setting can come from a command-line flag or a `STATEHOUSE_*`
//! environment variable; flags win.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use statehouse_state::BackendConfig;

use crate::api::DEFAULT_MAX_BODY_BYTES;

/// Statehouse server CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "statehouse-server")]
#[command(about = "Remote state backend with locking for infrastructure tools")]
#[command(version)]
pub struct Cli {
    /// Bind address
    #[arg(short, long, env = "STATEHOUSE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Storage backend
    #[arg(long, env = "STATEHOUSE_BACKEND", default_value = "sqlite", value_parser = ["sqlite", "memory"])]
    pub backend: String,

    /// SQLite database file
    #[arg(short, long, env = "STATEHOUSE_DATABASE", default_value = "statehouse.db")]
    pub database: PathBuf,

    /// How long a write waits for another writer before failing, in milliseconds
    #[arg(long, env = "STATEHOUSE_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Refuse to start unless the database file already exists
    #[arg(long, env = "STATEHOUSE_REQUIRE_DATABASE")]
    pub require_database: bool,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "STATEHOUSE_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Backend configuration described by the flags
    pub fn backend_config(&self) -> BackendConfig {
        let config = BackendConfig::new(self.backend.clone());

        match self.backend.as_str() {
            "sqlite" => config
                .with_attribute("path", self.database.to_string_lossy().to_string())
                .with_attribute(
                    "busy_timeout_ms",
                    i64::try_from(self.busy_timeout_ms).unwrap_or(i64::MAX),
                )
                .with_attribute("create", !self.require_database),
            _ => config,
        }
    }

    /// Default log filter when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
