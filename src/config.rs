//! # Global daemon configuration.
//!
//! Provides [`Config`] centralized settings for the reconciliation daemon.
//!
//! Configuration is environment-derived ([`Config::from_env`]):
//! - `CONNECT_ALL` — `"false"` disables the single-shared-network mode;
//!   any other value (or absence) leaves it enabled.
//! - `DEBUG` — `"true"` switches all mutating runtime calls to the simulated
//!   adapter; anything else runs live.
//! - `LOG_LEVEL` — verbosity passed to the tracing subscriber in `main`;
//!   not consumed here.
//!
//! Label keys and well-known names are plain fields so tests can substitute
//! them without touching the process environment.

use std::time::Duration;

/// Exit code used when the shutdown grace period is exceeded.
pub const FORCED_EXIT_CODE: i32 = 123;

/// Global configuration for the reconciliation daemon.
///
/// ## Field semantics
/// - `connect_all`: every eligible container converges to the single shared
///   network instead of its labeled set.
/// - `debug`: mutating runtime calls are simulated against an in-memory
///   network view; reads and the event feed stay live.
/// - `grace`: maximum wait for the teardown pass after a termination signal.
/// - `queue_capacity`: bound of the lifecycle event queue (min 1, clamped).
#[derive(Clone, Debug)]
pub struct Config {
    /// Connect every eligible container to the shared network.
    pub connect_all: bool,
    /// Simulate mutating runtime calls instead of issuing them.
    pub debug: bool,
    /// Maximum time to wait for the shutdown teardown pass.
    pub grace: Duration,
    /// Capacity of the bounded lifecycle event queue.
    pub queue_capacity: usize,
    /// Name of the single shared network used in connect-all mode and as the
    /// fallback when a policy label is present but unparseable.
    pub shared_network: String,
    /// Label key with dual use: on a container its value is the
    /// comma-separated desired network list; on a network the value `"true"`
    /// marks it as created (and garbage-collectable) by this daemon.
    pub policy_label: String,
    /// Compose project label key.
    pub project_label: String,
    /// Compose service label key.
    pub service_label: String,
    /// Prefix a compose project value must carry to be managed.
    pub project_prefix: String,
}

impl Config {
    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self {
            connect_all: parse_connect_all(std::env::var("CONNECT_ALL").ok().as_deref()),
            debug: parse_debug(std::env::var("DEBUG").ok().as_deref()),
            ..Self::default()
        }
    }

    /// Returns the event queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `connect_all = true`, `debug = false`
    /// - `grace = 5s`, `queue_capacity = 256`
    /// - shared network `apps-internal`, policy label `netvisor.networks`
    /// - compose labels `com.docker.compose.{project,service}`, prefix `ix-`
    fn default() -> Self {
        Self {
            connect_all: true,
            debug: false,
            grace: Duration::from_secs(5),
            queue_capacity: 256,
            shared_network: "apps-internal".to_string(),
            policy_label: "netvisor.networks".to_string(),
            project_label: "com.docker.compose.project".to_string(),
            service_label: "com.docker.compose.service".to_string(),
            project_prefix: "ix-".to_string(),
        }
    }
}

/// `CONNECT_ALL` is opt-out: only the literal `"false"` disables it.
pub(crate) fn parse_connect_all(value: Option<&str>) -> bool {
    !matches!(value, Some("false"))
}

/// `DEBUG` is opt-in: only the literal `"true"` enables it.
pub(crate) fn parse_debug(value: Option<&str>) -> bool {
    matches!(value, Some("true"))
}
