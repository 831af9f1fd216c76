//! Recur - Main Entry Point
//! Composition root: settings, logging, storage, registry, job manager

mod events;
mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recur_core::application::{JobManager, Registry};
use recur_core::port::id_provider::UuidProvider;
use recur_core::port::time_provider::SystemTimeProvider;
use recur_core::port::TimeProvider;
use recur_infra_sqlite::{create_pool, run_migrations, SqliteHistoryProvider, SqliteLockProvider};
use recur_infra_system::{command_task_factory, FileTaskProvider, COMMAND_TASK_TYPE};
use settings::{DaemonSettings, Settings, SettingsConfigProvider};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registry name of the SQLite lock and history providers
const SQLITE_PROVIDER: &str = "sqlite";
/// Registry name of the job file task provider
const FILE_TASK_PROVIDER: &str = "file";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config_path = settings::config_path();
    let settings = Settings::load_from(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path))?;

    // 2. Initialize logging
    let _log_guard = init_logging(&settings.daemon)?;
    info!("Recur v{} starting...", VERSION);
    if telemetry::endpoint().is_some() && !telemetry::enabled() {
        warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
    }

    // 3. Initialize database
    let db_path = settings.daemon.database_path();
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(db_path = %db_path, "Initializing database...");
    let pool = create_pool(&format!("sqlite://{}", db_path))
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let jobs_file = settings.daemon.jobs_file();
    let mut registry = Registry::new();
    registry
        .register_task_factory(
            COMMAND_TASK_TYPE,
            command_task_factory(settings.daemon.env_allowlist.clone()),
        )
        .register_lock_provider(
            SQLITE_PROVIDER,
            Arc::new(
                SqliteLockProvider::new(pool.clone(), time_provider.clone())
                    .with_ttl(settings.daemon.lock_ttl()),
            ),
        )
        .register_history_provider(
            SQLITE_PROVIDER,
            Arc::new(SqliteHistoryProvider::new(pool.clone(), time_provider.clone())),
        )
        .register_task_provider(FILE_TASK_PROVIDER, Arc::new(FileTaskProvider::new(&jobs_file)));
    info!(jobs_file = %jobs_file, "Registry ready");

    // 5. Start the job manager
    let manager = JobManager::with_providers(
        Arc::new(SettingsConfigProvider::new(config_path)),
        Arc::new(registry),
        time_provider,
        Arc::new(UuidProvider),
    );
    let event_log = tokio::spawn(events::log_events(manager.subscribe()));

    manager
        .start()
        .await
        .context("Job manager failed to start")?;
    log_schedule(&manager).await;

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal (SIGHUP reloads)
    wait_for_shutdown(&manager).await?;
    info!("Shutdown signal received. Stopping jobs...");

    // 7. Graceful shutdown
    if !manager.stop().await {
        warn!(
            running = manager.running_count(),
            "Exiting with runs still in progress"
        );
    }
    event_log.abort();
    telemetry::shutdown();

    info!("Shutdown complete.");
    Ok(())
}

/// stdout logging (`pretty` or `json`), optional rolling file, optional
/// OpenTelemetry export
fn init_logging(daemon: &DaemonSettings) -> Result<Option<WorkerGuard>> {
    let log_format =
        std::env::var("RECUR_LOG_FORMAT").unwrap_or_else(|_| daemon.log_format.clone());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("recur=info"))?;

    let (file_layer, guard) = match daemon.log_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "recur.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(telemetry::layer()?)
        .with(env_filter)
        .with(file_layer);

    match log_format.as_str() {
        // Production: JSON structured logging
        "json" => subscriber.with(fmt::layer().json()).init(),
        // Development: Pretty formatting with colors
        _ => subscriber.with(fmt::layer().pretty()).init(),
    }

    Ok(guard)
}

async fn log_schedule(manager: &JobManager) {
    for job in manager.snapshots().await {
        info!(
            job = %job.name,
            group = %job.group,
            next_run_at = ?job.next_run_at,
            "Job scheduled"
        );
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(manager: &JobManager) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result.map_err(Into::into),
            _ = terminate.recv() => return Ok(()),
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                match manager.reload(true).await {
                    Ok(()) => log_schedule(manager).await,
                    Err(e) => error!(error = %e, "Reload failed, no jobs scheduled"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_manager: &JobManager) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
