//! netvisor daemon entry point.
//!
//! Reads configuration from the environment, selects the runtime client
//! (live, or simulated when `DEBUG=true`), and runs the daemon on a
//! current-thread runtime. Reconciliation failures never exit non-zero;
//! only an exceeded shutdown grace period does, with the distinguished
//! forced exit code.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use netvisor::{Config, Daemon, DockerRuntime, RuntimeClient, SimRuntime, FORCED_EXIT_CODE};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = Config::from_env();
    info!("netvisor starting");
    info!(debug = cfg.debug, connect_all = cfg.connect_all, "configuration loaded");
    if cfg.connect_all {
        info!(shared_network = %cfg.shared_network, "connect-all mode enabled");
    }
    info!(policy_label = %cfg.policy_label, project_prefix = %cfg.project_prefix, "policy");

    let live = DockerRuntime::connect()?;
    let runtime: Arc<dyn RuntimeClient> = if cfg.debug {
        info!("DEBUG mode: mutating runtime calls are simulated");
        Arc::new(SimRuntime::over(Arc::new(live)))
    } else {
        Arc::new(live)
    };

    match Daemon::new(cfg, runtime).run().await {
        Ok(()) => {
            info!("netvisor stopped");
            Ok(())
        }
        // Only the exceeded grace period reaches here; reconciliation
        // failures are absorbed inside the daemon.
        Err(e) => {
            error!(label = e.as_label(), error = %e, "forcing exit");
            std::process::exit(FORCED_EXIT_CODE);
        }
    }
}

/// Console logging with `LOG_LEVEL` (fallback `RUST_LOG`, default `info`).
fn init_tracing() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
