//! Tracing subscriber setup.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs a compact stdout subscriber filtered by `RUST_LOG`, `info` when
/// unset. Later calls are no-ops.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .with_writer(std::io::stdout)
            .compact()
            .try_init();
        if let Err(e) = installed {
            eprintln!("Failed to install tracing subscriber: {}", e);
        }
    });
}
