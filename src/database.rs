#[cfg(feature = "database")]
use anyhow::Result;
#[cfg(feature = "database")]
use sqlx::sqlite::SqlitePoolOptions;
#[cfg(feature = "database")]
use sqlx::{migrate::MigrateDatabase, SqlitePool};
#[cfg(feature = "database")]
use tracing::info;

#[cfg(feature = "database")]
use crate::config::DatabaseConfig;

#[cfg(feature = "database")]
/// Database manager owning the SQLite pool shared by both store adapters
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
impl DatabaseManager {
    /// Open (creating if needed) the configured database and run migrations
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if !sqlx::Sqlite::database_exists(&config.url).await? {
            info!("Creating database at {}", config.url);
            sqlx::Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.url)
            .await?;

        let manager = Self { pool };
        if config.auto_migrate {
            manager.migrate().await?;
        }

        Ok(manager)
    }

    /// Private in-memory database, migrated and ready to use.
    ///
    /// A single connection that never expires, since every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}
