use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::config::DatabaseConfig;
use crate::data::migration::MigrationManager;
use crate::data::repositories::SqliteCategoryStore;

pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Opened catalog database: the pool plus the stores built on it
#[derive(Clone)]
pub struct Database {
    pool: Arc<ConnectionPool>,
}

impl Database {
    /// Opens (creating if needed) the database, applies the schema and runs migrations
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = init_database(Path::new(&config.path), config)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.clone()
    }

    pub fn category_store(&self) -> Arc<SqliteCategoryStore> {
        Arc::new(SqliteCategoryStore::new(self.pool.clone()))
    }
}

pub fn init_database(db_path: &Path, config: &DatabaseConfig) -> Result<Arc<ConnectionPool>> {
    let busy_timeout = config.busy_timeout();
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)
        .with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        });

    let pool = Pool::builder()
        .max_size(config.max_connections.max(1))
        .build(manager)
        .with_context(|| format!("Failed to open database pool at {}", db_path.display()))?;

    // Initialize database schema
    let conn = pool.get()?;
    conn.execute_batch(include_str!("../../data/schema.sql"))
        .context("Failed to apply database schema")?;
    MigrationManager::new(&conn).run_migrations()?;
    drop(conn);

    info!("Database ready at {}", db_path.display());
    Ok(Arc::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("catalog.db").display().to_string(),
            ..DatabaseConfig::default()
        };

        let database = Database::new(&config).unwrap();
        let conn = database.pool().get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'categories'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("catalog.db").display().to_string(),
            ..DatabaseConfig::default()
        };

        Database::new(&config).unwrap();
        Database::new(&config).unwrap();
    }
}
