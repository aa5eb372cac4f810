//! # netvisor
//!
//! **netvisor** keeps container network membership in sync with a
//! label-driven policy, running continuously alongside the container
//! runtime. It observes container start/stop events, computes the set of
//! virtual networks each container should belong to, and performs the
//! connect/disconnect/create/remove operations needed to converge actual
//! membership to the desired state — including a full pass at startup and a
//! teardown pass on shutdown.
//!
//! ## Architecture
//! ```text
//!   ┌────────────────────────────┐         ┌───────────────────────────┐
//!   │ Runtime event feed         │ produce │  bounded mpsc queue       │
//!   │ (container start/stop)     ├────────►│  (Config::queue_capacity) │
//!   └────────────────────────────┘         └─────────────┬─────────────┘
//!                                                        ▼ single consumer
//!   ┌─────────────────┐   desired set   ┌────────────────────────────────┐
//!   │ Policy Resolver │◄────────────────┤  Dispatcher                    │
//!   │ (pure, policy)  │                 │  running ──signal──► terminating│
//!   └─────────────────┘                 └───────────────┬────────────────┘
//!                                                       ▼ per event
//!   ┌──────────────────┐   reads/writes  ┌──────────────────────────────┐
//!   │  NetworkCache    │◄───────────────►│  ConvergenceEngine           │
//!   │ (single writer)  │                 │  diff → connect/disconnect   │
//!   └──────────────────┘                 │       → create/collect       │
//!                                        └──────────────┬───────────────┘
//!                                                       ▼
//!                                        ┌──────────────────────────────┐
//!                                        │  RuntimeClient (trait)       │
//!                                        │  ├─ DockerRuntime (live)     │
//!                                        │  └─ SimRuntime   (DEBUG)     │
//!                                        └──────────────────────────────┘
//! ```
//!
//! The bulk passes (`reconciler::initialise` / `reconciler::terminate`)
//! drive the same engine over every managed container outside the live
//! event window.
//!
//! ## Concurrency model
//! Everything runs on one logical thread (current-thread runtime).
//! Multiple reconciliations can be *in flight* only in the sense of
//! interleaving at `await` points; the daemon never fans out mutations for
//! the same network name. The two designed same-name race mitigations are
//! the conflict-tolerant create ([`runtime::CreateOutcome::AlreadyExists`])
//! and the empty-check before network removal.
//!
//! ## Behavior reference
//! | Event | Condition | Action |
//! |-------|-----------|--------|
//! | start | connect-all | converge to the shared network |
//! | start | policy label | converge to the labeled set (fallback: shared) |
//! | start | neither | leave untouched |
//! | start | terminating | ignored |
//! | stop  | under policy | reset to `<project>_default` |
//! | stop  | otherwise | left to runtime teardown |

pub mod cache;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod model;
pub mod policy;
pub mod reconciler;
pub mod runtime;
pub mod signals;

// ---- Public re-exports ----

pub use cache::NetworkCache;
pub use config::{Config, FORCED_EXIT_CODE};
pub use daemon::Daemon;
pub use dispatcher::Dispatcher;
pub use engine::{ConvergenceEngine, EnsureOutcome};
pub use error::{ClientError, RuntimeError};
pub use model::{Container, Network, NetworkMember, NetworkMode, NetworkSpec};
pub use policy::Desired;
pub use runtime::{
    CreateOutcome, DockerRuntime, EventAction, RuntimeClient, RuntimeEvent, SimOp, SimRuntime,
};
