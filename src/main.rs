use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use librarian::config::Config;
use librarian::db::{Database, bootstrap};
use librarian::provider::MemoryProvider;
use librarian::service::Service;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;

    let database = Database::new().await?;
    database.migrate().await?;
    let db = database.get_connection();
    bootstrap(&db).await?;

    // Stand-in provider until a host transport is wired in; the service loop,
    // store, and sync stack are fully functional against it.
    let provider = Arc::new(MemoryProvider::new());

    let shutdown = CancellationToken::new();
    let service = Service::new(db, config, provider, shutdown.clone())?;

    let handle = tokio::spawn(async move { service.run().await });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();
    handle.await??;

    Ok(())
}
