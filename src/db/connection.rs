use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database as SeaOrmDatabase, DatabaseConnection as SeaOrmConnection};
use sea_orm::{ConnectionTrait, Statement};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type DatabaseConnection = Arc<SeaOrmConnection>;

pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    /// Open (or create) the database at the default data-directory location.
    pub async fn new() -> Result<Self> {
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        let db_path = data_dir.join("librarian").join("library.db");
        Self::connect(&db_path).await
    }

    /// Connect to a specific database path.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", path.display());
        info!("Connecting to database at: {}", db_url);

        Self::connect_url(&db_url).await
    }

    /// In-memory database, used by tests.
    ///
    /// The pool is pinned to a single connection: every pooled connection to
    /// `sqlite::memory:` would otherwise see its own empty database.
    pub async fn connect_memory() -> Result<Self> {
        Self::connect_url("sqlite::memory:").await
    }

    async fn connect_url(db_url: &str) -> Result<Self> {
        let max_connections = if db_url.contains(":memory:") { 1 } else { 10 };
        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let connection = SeaOrmDatabase::connect(opt)
            .await
            .context("Failed to connect to database")?;

        // Single-writer WAL store: readers never block the writer, and busy
        // writers wait instead of failing immediately.
        for pragma in [
            "PRAGMA foreign_keys = ON",
            "PRAGMA journal_mode = WAL",
            "PRAGMA synchronous = NORMAL",
            "PRAGMA busy_timeout = 3000",
        ] {
            connection
                .execute(Statement::from_string(
                    sea_orm::DatabaseBackend::Sqlite,
                    pragma,
                ))
                .await
                .with_context(|| format!("Failed to apply {pragma}"))?;
        }

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    pub fn get_connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// Run forward-only migrations, idempotently.
    pub async fn migrate(&self) -> Result<()> {
        use crate::db::migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        let pending = Migrator::get_pending_migrations(&*self.connection)
            .await
            .context("Failed to get pending migrations")?
            .len();

        if pending > 0 {
            info!("Applying {} pending migration(s)", pending);
            Migrator::up(&*self.connection, None)
                .await
                .context("Failed to run migrations")?;
        }

        Ok(())
    }
}
