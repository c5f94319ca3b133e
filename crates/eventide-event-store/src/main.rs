//! Creates the Eventide event and projection tables.

use std::error::Error;

use eventide_event_store::config::StoreConfig;
use eventide_event_store::schema::create_tables;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = StoreConfig::from_env()?;
    tracing::info!(
        events = %config.events.qualified_name(),
        projections = %config.projections.qualified_name(),
        "Migrating Eventide schema"
    );

    let pool = config.connect().await?;
    create_tables(&pool, &config.events, &config.projections).await?;
    pool.close().await;

    Ok(())
}
