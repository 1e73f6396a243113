pub mod cli;
pub mod clock;
pub mod config;
pub mod constants;
pub mod shutdown;
pub mod storage;

pub use cli::CliConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use shutdown::ShutdownService;

use tracing_subscriber::EnvFilter;

use self::constants::ENV_LOG;

/// Configure the global `tracing` subscriber. Respects `RUST_LOG` first
/// (standard override for anyone used to it) and falls back to `FORGE_LOG`,
/// then an `info`-level default.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env(ENV_LOG))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}
