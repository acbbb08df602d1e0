mod cache;
mod engine;
mod entities;
mod errors;
mod events;
mod failover;
mod jobs;
mod settings;
mod store;
mod token;
mod web;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use cache::abac::AbacCache;
use cache::hot::PolicyHotCache;
use cache::kv::{KvStore, MemoryKv};
use cache::multilevel::{MultiLevelCache, MultiLevelConfig};
use cache::session::SessionPermissionCache;
use events::bus::{EventBus, MemoryBus};
use failover::monitor::DbMonitor;
use failover::pool::FailoverPool;

#[derive(Parser, Debug)]
#[command(name = "apsis", version, about = "Multi-tenant authorization platform")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database)
    let db = sea_orm::Database::connect(&settings.database.url)
        .await
        .into_diagnostic()?;

    // shutdown signal shared by every background task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // event bus and cache fabric
    let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
    let remote_kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    // Snapshots rebuild from the store on miss, so the failover warm
    // loader starts empty; deployments with a bulk source plug it in here.
    let warm_loader: cache::multilevel::Loader = Arc::new(|| {
        Box::pin(async { Ok::<Vec<(String, String)>, errors::ApsisError>(Vec::new()) })
    });
    let kv: Arc<dyn KvStore> = Arc::new(MultiLevelCache::new(
        remote_kv.clone(),
        warm_loader,
        MultiLevelConfig {
            refresh_interval: Duration::from_secs(settings.cache.refresh_secs),
            ping_interval: Duration::from_secs(settings.cache.ping_secs),
            ring_size: settings.cache.ring_size,
            ring_threshold: settings.cache.ring_threshold,
            ring_min_errors: settings.cache.ring_min_errors,
        },
        shutdown_rx.clone(),
    ));

    // database health monitor and failover pool
    let monitor = Arc::new(DbMonitor::new());
    monitor.clone().start(db.clone(), shutdown_rx.clone());
    let pool = FailoverPool::new(
        db.clone(),
        monitor.clone(),
        bus.clone(),
        settings.events.db_failover_topic.clone(),
    );

    // per-user snapshots, ABAC cache-aside, policy hot cache
    let sessions = Arc::new(SessionPermissionCache::new(
        kv.clone(),
        bus.clone(),
        settings.events.user_permission_topic.clone(),
    ));
    let abac_cache = Arc::new(AbacCache::new(
        kv.clone(),
        Duration::from_secs(settings.cache.abac_ttl_secs),
    ));
    let hot = Arc::new(PolicyHotCache::new(kv.clone()));

    // change-event consumers
    events::consumers::spawn_user_permission_consumer(
        bus.clone(),
        settings.events.user_permission_topic.clone(),
        kv.clone(),
        shutdown_rx.clone(),
    );
    events::consumers::spawn_policy_hotkey_consumer(
        bus.clone(),
        settings.events.policy_hotkey_topic.clone(),
        db.clone(),
        hot.clone(),
        shutdown_rx.clone(),
    );
    failover::replay::spawn_sql_replay_consumer(
        bus.clone(),
        settings.events.db_failover_topic.clone(),
        db.clone(),
        monitor.clone(),
        shutdown_rx.clone(),
    );

    // policy hot-key publisher
    let _sched = jobs::init_scheduler(
        db.clone(),
        bus.clone(),
        settings.events.policy_hotkey_topic.clone(),
    )
    .await?;

    // start web server
    let state = web::AppState {
        settings: Arc::new(settings),
        pool,
        sessions,
        abac_cache,
        hot,
        bus,
    };
    web::serve(state).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
