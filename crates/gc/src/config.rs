use std::time::Duration;

use keeper_resources::TrackerTtls;

/// Invalid value in the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    NotPositive { var: &'static str },
}

/// Garbage collector configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Pause between two cycles.
    pub interval: Duration,
    /// Items processed concurrently within one sweep.
    pub max_concurrency: usize,
    /// Pause after a failed cycle before the loop resumes.
    pub restart_delay: Duration,
    /// Liveness TTL refreshed by client heartbeats.
    pub heartbeat_ttl: Duration,
    /// Liveness TTL set when a client disconnects.
    pub resource_deletion_timeout: Duration,
    /// Project lock lease, extended while held.
    pub project_lock_ttl: Duration,
    /// How long a looked-up user role is reused.
    pub role_cache_ttl: Duration,
    /// Timeout of a single stop request to the orchestrator.
    pub service_stop_timeout: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_concurrency: 10,
            restart_delay: Duration::from_secs(5),
            heartbeat_ttl: Duration::from_secs(60),
            resource_deletion_timeout: Duration::from_secs(900),
            project_lock_ttl: Duration::from_secs(30),
            role_cache_ttl: Duration::from_secs(5),
            service_stop_timeout: Duration::from_secs(3600),
        }
    }
}

impl GcConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default |
    /// |--------------------------------------|---------|
    /// | `GC_INTERVAL_SECONDS`                | `30`    |
    /// | `GC_MAX_CONCURRENCY`                 | `10`    |
    /// | `GC_RESTART_DELAY_SECONDS`           | `5`     |
    /// | `RESOURCE_HEARTBEAT_TTL_SECONDS`     | `60`    |
    /// | `RESOURCE_DELETION_TIMEOUT_SECONDS`  | `900`   |
    /// | `PROJECT_LOCK_TTL_SECONDS`           | `30`    |
    /// | `ROLE_CACHE_TTL_SECONDS`             | `5`     |
    /// | `DIRECTOR_STOP_TIMEOUT_SECONDS`      | `3600`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |var: &'static str, default: Duration, positive: bool| {
            read_u64(&lookup, var, default.as_secs(), positive).map(Duration::from_secs)
        };

        Ok(Self {
            interval: secs("GC_INTERVAL_SECONDS", defaults.interval, true)?,
            max_concurrency: read_u64(
                &lookup,
                "GC_MAX_CONCURRENCY",
                defaults.max_concurrency as u64,
                true,
            )? as usize,
            restart_delay: secs("GC_RESTART_DELAY_SECONDS", defaults.restart_delay, false)?,
            heartbeat_ttl: secs("RESOURCE_HEARTBEAT_TTL_SECONDS", defaults.heartbeat_ttl, true)?,
            resource_deletion_timeout: secs(
                "RESOURCE_DELETION_TIMEOUT_SECONDS",
                defaults.resource_deletion_timeout,
                true,
            )?,
            project_lock_ttl: secs("PROJECT_LOCK_TTL_SECONDS", defaults.project_lock_ttl, true)?,
            role_cache_ttl: secs("ROLE_CACHE_TTL_SECONDS", defaults.role_cache_ttl, false)?,
            service_stop_timeout: secs(
                "DIRECTOR_STOP_TIMEOUT_SECONDS",
                defaults.service_stop_timeout,
                true,
            )?,
        })
    }

    /// Liveness TTLs for the session tracker of the same deployment.
    pub fn tracker_ttls(&self) -> TrackerTtls {
        TrackerTtls {
            heartbeat: self.heartbeat_ttl,
            resource_deletion: self.resource_deletion_timeout,
        }
    }
}

fn read_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
    positive: bool,
) -> Result<u64, ConfigError> {
    let value = match lookup(var) {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
            var,
            value: raw.clone(),
        })?,
        None => default,
    };
    if positive && value == 0 {
        return Err(ConfigError::NotPositive { var });
    }
    Ok(value)
}
