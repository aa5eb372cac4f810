//! # Event dispatcher: single consumer of the lifecycle event queue.
//!
//! The runtime's event feed is produced into a bounded channel (see
//! `daemon`); [`Dispatcher`] is the one task that drains it, which keeps all
//! engine and cache access on a single logical thread.
//!
//! ## State machine
//! ```text
//!            shutdown signal
//!  running ───────────────────► terminating   (terminal)
//!
//!  running:      start → converge, stop → reset
//!  terminating:  start → ignored, stop → reset
//! ```
//!
//! Start events are dropped while terminating so a container starting
//! mid-shutdown cannot re-create networks the teardown pass is removing.
//! Stop events are always honored: a stopping container must be cleanly
//! detached regardless of daemon state.
//!
//! Errors raised while handling one event are logged and must not crash the
//! dispatcher or block subsequent events.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::engine::ConvergenceEngine;
use crate::error::ClientError;
use crate::policy::{self, Desired};
use crate::runtime::{EventAction, RuntimeEvent};

/// Consumes lifecycle events and drives the convergence engine.
pub struct Dispatcher {
    cfg: Config,
    terminating: CancellationToken,
}

impl Dispatcher {
    /// Creates a dispatcher; `terminating` flips the running → terminating
    /// transition when cancelled.
    pub fn new(cfg: Config, terminating: CancellationToken) -> Self {
        Self { cfg, terminating }
    }

    /// Drains the event queue until it closes.
    ///
    /// Events are handled strictly one at a time; the queue buffers bursts.
    pub async fn run(
        &self,
        engine: &mut ConvergenceEngine,
        rx: &mut mpsc::Receiver<RuntimeEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            self.handle_event(engine, &event).await;
        }
        debug!("event queue closed; dispatcher exiting");
    }

    /// Handles one lifecycle event. Failures are logged, never propagated.
    pub async fn handle_event(&self, engine: &mut ConvergenceEngine, event: &RuntimeEvent) {
        let project = event.attributes.get(&self.cfg.project_label);
        if !policy::is_managed_project(project.map(String::as_str), &self.cfg) {
            debug!(container = %event.container_id, "ignoring event outside managed projects");
            return;
        }

        let result = match event.action {
            EventAction::Start => self.handle_start(engine, event).await,
            EventAction::Stop => self.handle_stop(engine, event).await,
        };
        if let Err(e) = result {
            error!(
                container = %event.container_id,
                action = ?event.action,
                error = %e,
                "failed to handle container event"
            );
        }
    }

    async fn handle_start(
        &self,
        engine: &mut ConvergenceEngine,
        event: &RuntimeEvent,
    ) -> Result<(), ClientError> {
        if self.terminating.is_cancelled() {
            info!(
                container = %event.container_id,
                "terminating; ignoring container start"
            );
            return Ok(());
        }

        // Networks may have changed since the last refresh (manual edits,
        // compose up); re-list before converging.
        engine.refresh_cache().await?;

        // Containers are never cached; fetch a fresh inspect per trigger.
        let container = engine.runtime().inspect_container(&event.container_id).await?;
        match policy::desired_networks(&container, &self.cfg) {
            Desired::Networks(networks) => {
                info!(container = %container.name, targets = ?networks, "container starting");
                engine.move_container_to_networks(&container, &networks).await;
            }
            Desired::Exempt => {
                debug!(container = %container.name, "container is not under policy");
            }
        }
        Ok(())
    }

    async fn handle_stop(
        &self,
        engine: &mut ConvergenceEngine,
        event: &RuntimeEvent,
    ) -> Result<(), ClientError> {
        let container = engine.runtime().inspect_container(&event.container_id).await?;
        if !policy::should_reset_on_stop(&container, &self.cfg) {
            debug!(container = %container.name, "runtime teardown will detach this container");
            return Ok(());
        }

        info!(container = %container.name, "container stopping; resetting to default network");
        engine.reset_container(&container).await;
        Ok(())
    }
}
