use std::sync::Arc;

use anyhow::Context;
use keeper_db::{PgLockStore, PgProjectStore, PgResourceStore, PgUserStore};
use keeper_director::DirectorClient;
use keeper_gc::{GarbageCollector, GcConfig, GcDeps};
use keeper_resources::{BroadcastNotifier, LockManager, ProjectLockFacade, ResourceRegistry};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keeper_gc=debug,keeper_resources=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = GcConfig::from_env().context("Invalid garbage collector configuration")?;
    tracing::info!(?config, "Loaded garbage collector configuration");

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let director_url = std::env::var("DIRECTOR_URL").context("DIRECTOR_URL must be set")?;

    // --- Database ---
    let pool = keeper_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    keeper_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    keeper_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Shared stores ---
    let registry = ResourceRegistry::new(Arc::new(PgResourceStore::new(pool.clone())));
    let locks = LockManager::new(Arc::new(PgLockStore::new(pool.clone())));

    // --- Lock notifications ---
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut lock_events = notifier.subscribe();
    let events_handle = tokio::spawn(async move {
        loop {
            match lock_events.recv().await {
                Ok(event) => tracing::debug!(
                    project_id = %event.project_id,
                    locked = event.state.locked,
                    status = ?event.state.status,
                    "Project lock state changed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Lock event log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let project_locks = ProjectLockFacade::new(locks, notifier, config.project_lock_ttl);

    // --- Orchestrator ---
    let director =
        DirectorClient::new(director_url).with_stop_timeout(config.service_stop_timeout);

    // --- Garbage collector ---
    let gc = Arc::new(GarbageCollector::new(
        GcDeps {
            registry,
            project_locks,
            orchestrator: Arc::new(director),
            projects: Arc::new(PgProjectStore::new(pool.clone())),
            users: Arc::new(PgUserStore::new(pool.clone())),
        },
        config,
    ));

    let cancel = CancellationToken::new();
    let handle = gc.spawn(&cancel);

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    handle.shutdown().await;
    events_handle.abort();
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
