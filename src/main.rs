//! hashlease server
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│    Store     │◀───│  Driver  │ (tick every N secs)
//! │  (YAML)  │    │ (mem / pg)   │    └──────────┘
//! └──────────┘    └──────────────┘          │
//!                        ▲                  ▼
//!                  ┌──────────┐      ┌─────────────┐
//!                  │ Gateway  │─────▶│  WebSocket  │
//!                  │ (axum)   │      │  sessions   │
//!                  └──────────┘      └─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use hashlease::admin::AdminService;
use hashlease::auth::{Actor, TokenVerifier};
use hashlease::clock::{Clock, SystemClock};
use hashlease::config::{AppConfig, StorageBackend};
use hashlease::db::{Database, schema};
use hashlease::engine::{AccrualDriver, CatchUpCalculator, ContractEngine};
use hashlease::gateway::{self, state::AppState};
use hashlease::models::Role;
use hashlease::notify::{HttpRelayNotifier, LogNotifier, Notifier, SupportBridge};
use hashlease::settlement::SettlementService;
use hashlease::store::{MemoryStore, PgStore, Store, postgres::seed_machines};
use hashlease::websocket::ConnectionManager;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn build_store(
    config: &AppConfig,
    clock: &dyn Clock,
) -> anyhow::Result<(Arc<dyn Store>, Option<Arc<Database>>)> {
    let machines: Vec<_> = config.catalog.iter().map(|m| m.to_machine()).collect();

    match config.storage.backend {
        StorageBackend::Memory => {
            let store = MemoryStore::new();
            for machine in machines {
                store.insert_machine(machine);
            }
            let now = clock.now();
            for seed in &config.users {
                store.insert_user(seed.to_user(now));
            }
            tracing::info!(
                machines = config.catalog.len(),
                users = config.users.len(),
                "In-memory store seeded"
            );
            Ok((Arc::new(store), None))
        }
        StorageBackend::Postgres => {
            let url = config
                .storage
                .postgres_url
                .as_deref()
                .context("postgres backend requires postgres_url")?;
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            schema::init_schema(db.pool()).await?;
            seed_machines(db.pool(), &machines).await?;
            let store = PgStore::new(db.pool().clone());
            Ok((Arc::new(store), Some(Arc::new(db))))
        }
    }
}

fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.notifier.relay_url {
        Some(url) => {
            let timeout = Duration::from_millis(config.notifier.relay_timeout_ms);
            tracing::info!(%url, "Mail relay notifier enabled");
            Ok(Arc::new(HttpRelayNotifier::new(url.clone(), timeout)?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
    tracing::info!("Shutdown requested");
    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = hashlease::logging::init_logging(&config);

    tracing::info!("Starting hashlease in {} mode", env);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (store, pg_db) = build_store(&config, clock.as_ref()).await?;

    let ws_manager = Arc::new(ConnectionManager::new());
    let support = Arc::new(SupportBridge::new(build_notifier(&config)?, ws_manager.clone()));

    let engine = Arc::new(ContractEngine::new(
        store.clone(),
        ws_manager.clone(),
        support.clone(),
        clock.clone(),
    ));
    let catch_up = Arc::new(CatchUpCalculator::new(
        store.clone(),
        ws_manager.clone(),
        clock.clone(),
        config.engine.catch_up_min_hours,
    ));
    let settlement = Arc::new(SettlementService::new(
        store.clone(),
        support.clone(),
        clock.clone(),
        config.settlement.require_kyc_for_withdrawal,
    ));
    let admin = Arc::new(AdminService::new(
        store.clone(),
        ws_manager.clone(),
        support.clone(),
    ));

    let tokens = TokenVerifier::new(&config.gateway.jwt_secret);
    if config.storage.backend == StorageBackend::Memory {
        // Seeded accounts have no login flow; print tokens to reach them
        for seed in &config.users {
            let actor = match seed.role {
                Role::Admin => Actor::admin(seed.id),
                Role::User => Actor::user(seed.id),
            };
            let token = tokens.issue(actor, clock.now())?;
            tracing::info!(
                user_id = seed.id,
                role = seed.role.as_str(),
                %token,
                "Dev session token"
            );
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = AccrualDriver::new(engine.clone(), config.engine.tick_interval());
    let driver_handle = driver.spawn(shutdown_rx);

    let state = Arc::new(AppState {
        engine,
        catch_up,
        settlement,
        admin,
        ws_manager,
        tokens,
        pg_db,
    });

    let port = get_port_override().unwrap_or(config.gateway.port);
    let served = gateway::run_server(
        &config.gateway.host,
        port,
        state,
        shutdown_signal(shutdown_tx),
    )
    .await;

    // The driver finishes its current contract before exiting
    if let Err(e) = driver_handle.await {
        tracing::error!(error = %e, "Accrual driver task failed");
    }
    tracing::info!("hashlease stopped");
    served
}
