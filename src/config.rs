//! Engine configuration: the paths and runtime binary every component
//! needs, as CLI flags doubling as env vars.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "dockgeac")]
#[command(version, about, long_about = None)]
pub struct EngineConfig {
    /// Data directory for lock files and other engine state.
    #[arg(long, env = "DOCKGEAC_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Directory containing one subdirectory per stack.
    #[arg(long, env = "DOCKGEAC_STACKS_DIR", default_value = "/opt/stacks")]
    pub stacks_dir: PathBuf,

    /// Name of the runtime CLI binary to invoke.
    #[arg(long, env = "DOCKGEAC_RUNTIME_BINARY", default_value = "container")]
    pub runtime_binary: String,

    /// Observer poll interval in seconds.
    #[arg(long, env = "DOCKGEAC_POLL_INTERVAL_SECS", default_value_t = crate::constants::DEFAULT_OBSERVER_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
}

impl EngineConfig {
    /// Directory holding per-stack lock files (`<data_dir>/locks`).
    pub fn locks_dir(&self) -> PathBuf {
        self.data_dir.join("locks")
    }

    /// Directory for a single stack's compose file and `.env`.
    pub fn stack_dir(&self, name: &str) -> PathBuf {
        self.stacks_dir.join(name)
    }
}

/// Initialise a `tracing` subscriber from `RUST_LOG`, defaulting to `info`.
/// Library consumers call this from their own `main`; the crate never
/// installs a subscriber itself.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .try_init();
}
