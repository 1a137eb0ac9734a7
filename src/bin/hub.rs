use std::sync::Arc;

use anyhow::Context;
use chrono::TimeDelta;
use clap::Parser;
use lifeguard::{
    actors::{LifecycleHandle, MonitorHandle, RetentionPolicy},
    alerts::AlertManager,
    config::{Config, StorageConfig, read_config_file},
    lifecycle::LifecycleScheduler,
    monitors::{
        HealthProbe, SystemMonitor, fetch::ReqwestFetcher, port::TcpPortChecker,
        process::SysinfoInspector, resources::SysinfoSampler,
    },
    notify::Notifier,
    settings::SettingsStore,
    storage::Storage,
    util::get_log_filter,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = get_log_filter()
        .parse::<filter::Targets>()
        .unwrap_or_else(|_| filter::Targets::new().with_default(LevelFilter::INFO));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let (storage, retention) = open_storage(&config.storage).await?;

    let settings = Arc::new(SettingsStore::open(storage.settings.clone()).await);
    if let Some(error) = settings.last_reload_error() {
        warn!("starting with default settings: {error}");
    }

    let client = reqwest::Client::new();
    let notifier = Arc::new(Notifier::from_config(&config.channels, client));
    info!("{} notification channel(s) configured", notifier.channel_count());

    let alerts = Arc::new(
        AlertManager::new(settings.clone(), notifier)
            .with_admin_recipient(config.admin_email.clone()),
    );

    let probe = HealthProbe::new(
        Arc::new(ReqwestFetcher::new()?),
        Arc::new(SysinfoInspector),
        Arc::new(TcpPortChecker),
    );
    let monitor = Arc::new(
        SystemMonitor::new(
            probe,
            Arc::new(SysinfoSampler),
            alerts.clone(),
            settings.clone(),
            config.probe.clone(),
        )
        .with_history(storage.history.clone()),
    );
    for target in monitor.targets() {
        info!("probe target: {} ({:?})", target.url, target.kind);
    }

    let retention = retention.map(|keep| RetentionPolicy {
        history: storage.history.clone(),
        keep,
    });
    let monitor_handle = MonitorHandle::spawn(monitor, retention);

    let scheduler = Arc::new(LifecycleScheduler::new(storage.entities.clone(), alerts));
    let lifecycle_handle = LifecycleHandle::spawn(scheduler, settings);

    start_api(&config, &monitor_handle, &lifecycle_handle, &storage).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    monitor_handle.shutdown().await?;
    lifecycle_handle.shutdown().await?;
    if let Err(e) = storage.backend.close().await {
        warn!("failed to close storage: {e}");
    }

    Ok(())
}

/// Storage plus the report retention it asks for
async fn open_storage(config: &StorageConfig) -> anyhow::Result<(Storage, Option<TimeDelta>)> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, nothing survives a restart");
            Ok((Storage::in_memory(), None))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite {
            path,
            retention_days,
        } => {
            use lifeguard::storage::sqlite::SqliteBackend;

            let backend = SqliteBackend::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            info!("using SQLite storage at {}", path.display());
            Ok((
                Storage::from_backend(backend),
                Some(TimeDelta::days(i64::from(*retention_days))),
            ))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            warn!("built without SQLite support, falling back to in-memory storage");
            Ok((Storage::in_memory(), None))
        }
    }
}

#[cfg(feature = "api")]
async fn start_api(
    config: &Config,
    monitor: &MonitorHandle,
    lifecycle: &LifecycleHandle,
    storage: &Storage,
) -> anyhow::Result<()> {
    use lifeguard::api::{ApiState, spawn_api_server};

    let Some(api_config) = config.api.clone() else {
        info!("no api section configured, REST API disabled");
        return Ok(());
    };

    let state = ApiState::new(
        monitor.clone(),
        lifecycle.clone(),
        storage.backend.clone(),
        storage.history.clone(),
    );
    spawn_api_server(api_config, state).await?;
    Ok(())
}

#[cfg(not(feature = "api"))]
async fn start_api(
    config: &Config,
    _monitor: &MonitorHandle,
    _lifecycle: &LifecycleHandle,
    _storage: &Storage,
) -> anyhow::Result<()> {
    if config.api.is_some() {
        warn!("built without the api feature, ignoring api section");
    }
    Ok(())
}
