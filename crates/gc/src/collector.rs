//! The garbage collector and its per-cycle report.
//!
//! A cycle runs three sweeps in order:
//!
//! 1. **disconnect**: releases what dead session keys hold, then prunes
//!    them and removes guests left without any key;
//! 2. **guests**: removes guest accounts no session references anymore;
//! 3. **orphans**: stops services whose project nobody has open.
//!
//! Sweeps fan out with bounded concurrency and isolate failures per item:
//! one failing key, user or service is logged and retried next cycle
//! without affecting its siblings.

use std::future::Future;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use keeper_core::orchestrator::{Orchestrator, OrchestratorError};
use keeper_core::projects::ProjectStore;
use keeper_core::types::{NodeId, UserId};
use keeper_core::users::UserStore;
use keeper_resources::{ProjectLockFacade, ResourceRegistry};

use crate::cache::TtlCache;
use crate::config::GcConfig;
use crate::error::GcError;

/// Collaborators of the collector.
#[derive(Clone)]
pub struct GcDeps {
    pub registry: ResourceRegistry,
    pub project_locks: ProjectLockFacade,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub projects: Arc<dyn ProjectStore>,
    pub users: Arc<dyn UserStore>,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Session keys removed from the registry.
    pub keys_pruned: usize,
    /// Resources released after their last holder died.
    pub resources_released: usize,
    /// Guest accounts deleted.
    pub guests_removed: usize,
    /// Orphaned services stopped.
    pub services_stopped: usize,
}

impl GcReport {
    pub fn is_empty(&self) -> bool {
        *self == GcReport::default()
    }
}

impl Add for GcReport {
    type Output = GcReport;

    fn add(mut self, rhs: GcReport) -> GcReport {
        self += rhs;
        self
    }
}

impl AddAssign for GcReport {
    fn add_assign(&mut self, rhs: GcReport) {
        self.keys_pruned += rhs.keys_pruned;
        self.resources_released += rhs.resources_released;
        self.guests_removed += rhs.guests_removed;
        self.services_stopped += rhs.services_stopped;
    }
}

impl Sum for GcReport {
    fn sum<I: Iterator<Item = GcReport>>(iter: I) -> GcReport {
        iter.fold(GcReport::default(), Add::add)
    }
}

// ---------------------------------------------------------------------------
// GarbageCollector
// ---------------------------------------------------------------------------

pub struct GarbageCollector {
    pub(crate) deps: GcDeps,
    pub(crate) config: GcConfig,
    /// `user_id -> is guest`, shared by every sweep.
    pub(crate) guest_roles: TtlCache<UserId, bool>,
    pub(crate) force_stop: AtomicBool,
}

impl GarbageCollector {
    pub fn new(deps: GcDeps, config: GcConfig) -> Self {
        Self {
            guest_roles: TtlCache::new(config.role_cache_ttl),
            deps,
            config,
            force_stop: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Run one cycle: the three sweeps in order.
    ///
    /// Every sweep runs even if an earlier one failed; the first failure is
    /// returned after the cycle so the caller can back off.
    pub async fn collect_garbage(&self) -> Result<GcReport, GcError> {
        tracing::debug!("Collecting garbage");
        let mut report = GcReport::default();
        let mut failure = None;

        for (sweep, outcome) in [
            ("disconnect", self.sweep_disconnected().await),
            ("guests", self.sweep_guest_users().await),
            ("orphans", self.sweep_orphaned_services().await),
        ] {
            match outcome {
                Ok(partial) => report += partial,
                Err(e) => {
                    tracing::warn!(sweep, error = %e, "Sweep failed, will retry next cycle");
                    failure.get_or_insert(e);
                }
            }
        }

        if report.is_empty() {
            tracing::debug!("Garbage collection found nothing to do");
        } else {
            tracing::info!(
                keys_pruned = report.keys_pruned,
                resources_released = report.resources_released,
                guests_removed = report.guests_removed,
                services_stopped = report.services_stopped,
                "Garbage collection cycle completed"
            );
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Run `work` over `items` with at most `max_concurrency` in flight and
    /// add up the reports.
    pub(crate) async fn fan_out<T, F, Fut>(&self, items: Vec<T>, work: F) -> GcReport
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = GcReport>,
    {
        stream::iter(items)
            .map(work)
            .buffer_unordered(self.config.max_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .sum()
    }

    /// `true` if `user_id` is a guest, through the role cache.
    pub(crate) async fn is_guest_cached(&self, user_id: UserId) -> Result<bool, GcError> {
        if let Some(is_guest) = self.guest_roles.get(&user_id).await {
            return Ok(is_guest);
        }
        let is_guest = self.deps.users.is_guest(user_id).await?;
        self.guest_roles.insert(user_id, is_guest).await;
        Ok(is_guest)
    }

    /// Stop one service. Returns `true` once the service is gone.
    pub(crate) async fn stop_service(&self, service_uuid: NodeId, save_state: bool) -> bool {
        match self
            .deps
            .orchestrator
            .stop_service(service_uuid, save_state)
            .await
        {
            Ok(()) => {
                tracing::info!(%service_uuid, save_state, "Service stopped");
                true
            }
            Err(OrchestratorError::NotFound(_)) => {
                tracing::debug!(%service_uuid, "Service already gone");
                true
            }
            Err(e @ OrchestratorError::Forbidden(_)) => {
                tracing::warn!(%service_uuid, error = %e, "Orchestrator refused to stop service");
                false
            }
            Err(e) => {
                tracing::warn!(%service_uuid, error = %e, "Failed to stop service");
                false
            }
        }
    }
}
