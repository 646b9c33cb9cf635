//! Symbol store sweep - opens a symbol store, runs its eviction passes and exits
//!
//! Opening the store applies pending migrations and the age sweep. With
//! `SWEEP_COUNT=true` the count sweep runs as well, which is useful after
//! lowering `SYMBOL_STORE_MAX_COUNT`.

use symbol_store_db::{SymbolStoreConfig, SymbolStoreDb};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("symbol_store_sweep=info".parse()?)
        .add_directive("symbol_store_db=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let config = SymbolStoreConfig::from_env();
    let sweep_count = std::env::var("SWEEP_COUNT")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    info!("Store: {:?}", config.database_path());
    info!("Max count: {}", config.max_count);
    match config.max_age {
        Some(age) => info!("Max age: {} seconds", age.as_secs()),
        None => info!("Max age: unbounded"),
    }

    let db = SymbolStoreDb::new(config)?;

    // The first operation opens the store, which runs the age sweep
    let before = db.stats().await?;
    info!(entries = before.entries, "Store opened");

    if sweep_count {
        let evicted = db.evict_over_capacity().await?;
        info!(evicted, "Count sweep completed");
    }

    let after = db.stats().await?;
    info!(
        entries = after.entries,
        last_age_sweep_at = ?after.last_age_sweep_at,
        last_count_sweep_at = ?after.last_count_sweep_at,
        "Sweep finished"
    );

    db.close().await;
    Ok(())
}
