//! # Daemon wiring: event queue, signal handling, grace-bounded teardown.
//!
//! [`Daemon`] owns the convergence engine and drives the whole lifecycle:
//!
//! ```text
//! run():
//!   1. bulk initialise (refresh cache, converge every managed container)
//!   2. spawn event producer: runtime feed ──► bounded mpsc queue
//!   3. select:
//!        ├─ dispatcher drains the queue (single consumer)
//!        └─ OS termination signal → terminating flag set
//!   4. teardown pass under the grace timeout
//!        ├─ completed → clean exit
//!        └─ exceeded  → RuntimeError::GraceExceeded (forced exit code)
//! ```
//!
//! The queue keeps event handling on one logical thread: the producer task
//! only forwards feed items; every engine and cache access happens in the
//! dispatcher or in the bulk passes, never concurrently.
//!
//! Initialisation failures are logged and the daemon continues into the
//! live event window; reconciliation is self-healing per event. Only the
//! grace timeout produces a non-zero exit.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::engine::ConvergenceEngine;
use crate::error::RuntimeError;
use crate::reconciler;
use crate::runtime::{RuntimeClient, RuntimeEvent};
use crate::signals;

/// The reconciliation daemon.
pub struct Daemon {
    cfg: Config,
    engine: ConvergenceEngine,
    runtime: Arc<dyn RuntimeClient>,
}

impl Daemon {
    /// Builds the daemon over a runtime client chosen at startup.
    pub fn new(cfg: Config, runtime: Arc<dyn RuntimeClient>) -> Self {
        let engine = ConvergenceEngine::new(runtime.clone(), cfg.clone());
        Self {
            cfg,
            engine,
            runtime,
        }
    }

    /// Runs until a termination signal (or the event feed ends), then
    /// performs the teardown pass bounded by the configured grace period.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        match reconciler::initialise(&mut self.engine).await {
            Ok(n) => info!(processed = n, "initialisation complete"),
            Err(e) => error!(
                error = %e,
                "initialisation failed; continuing with live events"
            ),
        }

        let (tx, mut rx) = mpsc::channel(self.cfg.queue_capacity_clamped());
        let terminating = CancellationToken::new();
        self.spawn_event_producer(tx);

        let dispatcher = Dispatcher::new(self.cfg.clone(), terminating.clone());
        tokio::select! {
            _ = dispatcher.run(&mut self.engine, &mut rx) => {
                warn!("event feed ended; proceeding to teardown");
            }
            res = signals::wait_for_shutdown_signal() => {
                if let Err(e) = res {
                    error!(error = %e, "signal listener failed; shutting down");
                }
                info!("termination signal received");
            }
        }
        terminating.cancel();

        let grace = self.cfg.grace;
        info!(?grace, "terminating; resetting managed containers");
        match time::timeout(grace, reconciler::terminate(&mut self.engine)).await {
            Ok(Ok(n)) => {
                info!(processed = n, "teardown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                // A failed listing still exits cleanly; reconciliation
                // failures never produce a non-zero exit on their own.
                error!(error = %e, "teardown pass failed");
                Ok(())
            }
            Err(_) => Err(RuntimeError::GraceExceeded { grace }),
        }
    }

    /// Forwards the runtime event feed into the bounded queue.
    ///
    /// Feed errors are logged and the stream is kept; only stream end or a
    /// closed queue stops the producer.
    fn spawn_event_producer(&self, tx: mpsc::Sender<RuntimeEvent>) {
        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            let mut stream = match runtime.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "failed to subscribe to the event feed");
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            // Consumer is gone; nothing left to do.
                            return;
                        }
                    }
                    Err(e) => error!(error = %e, "event feed error"),
                }
            }
            warn!("runtime event stream closed");
        });
    }
}
