use dotenvy::dotenv;
use status_desk::{
    config::{database, settings},
    core::{
        clock::{Clock, SystemClock},
        service::StatusService,
        system,
    },
    errors::Result,
};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {e}"))?;
    info!(
        systems = app_config.systems.len(),
        poll_interval_secs = app_config.poll_interval_secs,
        "Configuration loaded"
    );

    // 4. Initialize database
    let database_url = database::get_database_url(app_config.database_url.as_deref());
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))?;

    // 5. Seed configured systems
    let seeded = system::seed_systems(&db, &app_config.systems, SystemClock.now()).await?;
    if seeded > 0 {
        info!("Seeded {seeded} system(s) from configuration");
    }

    // 6. Reconcile on every tick until interrupted
    let service = StatusService::from_config(db, &app_config)?;
    let mut ticker =
        tokio::time::interval(Duration::from_secs(app_config.poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = service.run_full_reconciliation().await {
                    error!("Reconciliation pass failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested, stopping scheduler");
                break;
            }
        }
    }

    Ok(())
}
