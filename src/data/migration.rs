use std::collections::HashMap;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rusqlite::{params, Connection, Error as SqliteError, OptionalExtension};

/// Database migration manager that handles schema updates
pub struct MigrationManager<'a> {
    connection: &'a Connection,
}

impl<'a> MigrationManager<'a> {
    /// Creates a new migration manager
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    /// Run all necessary migrations to update the database schema
    pub fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        self.create_migrations_table()?;

        self.migrate_add_ancestors_to_categories()?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Creates the migrations table to track which migrations have been applied
    fn create_migrations_table(&self) -> Result<()> {
        debug!("Creating migrations table if it doesn't exist");

        self.connection
            .execute(
                "CREATE TABLE IF NOT EXISTS migrations (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    applied_at TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create migrations table")?;

        Ok(())
    }

    /// Checks if a migration has been applied
    pub fn is_migration_applied(&self, name: &str) -> Result<bool> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM migrations WHERE name = ?", [name], |row| row.get(0))
            .context("Failed to check if migration has been applied")?;

        Ok(count > 0)
    }

    /// Records that a migration has been applied
    fn record_migration(&self, name: &str) -> Result<()> {
        debug!("Recording migration '{}' as applied", name);

        self.connection
            .execute(
                "INSERT INTO migrations (name, applied_at) VALUES (?, datetime('now'))",
                [name],
            )
            .context("Failed to record migration")?;

        Ok(())
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let found = self
            .connection
            .query_row(
                "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
                params![table, column],
                |_| Ok(true),
            )
            .optional()
            .with_context(|| format!("Failed to check if {}.{} exists", table, column))?;
        Ok(found.unwrap_or(false))
    }

    /// Migration: add the `ancestors` id chain to categories created before it
    /// existed, and backfill it from the `parent_id` links.
    fn migrate_add_ancestors_to_categories(&self) -> Result<()> {
        const MIGRATION_NAME: &str = "add_ancestors_to_categories";

        if self.is_migration_applied(MIGRATION_NAME)? {
            debug!("Migration '{}' already recorded as applied, skipping", MIGRATION_NAME);
            return Ok(());
        }

        info!("Running migration: {}", MIGRATION_NAME);

        if self.column_exists("categories", "ancestors")? {
            info!("Column 'ancestors' already exists in categories table");
            self.record_migration(MIGRATION_NAME)?;
            return Ok(());
        }

        match self.connection.execute(
            "ALTER TABLE categories ADD COLUMN ancestors TEXT NOT NULL DEFAULT '[]'",
            [],
        ) {
            Ok(_) => info!("Added ancestors column to categories table"),
            Err(SqliteError::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column name") => {
                info!("Column 'ancestors' already exists (concurrent addition detected)");
            }
            Err(e) => return Err(e).context("Failed to add ancestors column to categories table"),
        }

        self.backfill_ancestors()?;
        self.record_migration(MIGRATION_NAME)?;

        Ok(())
    }

    fn backfill_ancestors(&self) -> Result<()> {
        let tx = self.connection.unchecked_transaction()?;

        let parents: HashMap<i64, Option<i64>> = {
            let mut stmt = tx.prepare("SELECT id, parent_id FROM categories")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?))
            })?;
            rows.collect::<Result<HashMap<_, _>, _>>()?
        };

        for &id in parents.keys() {
            let mut chain = Vec::new();
            let mut cursor = parents.get(&id).copied().flatten();
            while let Some(parent) = cursor {
                if chain.contains(&parent) || parent == id {
                    warn!("Category {} has a cyclic parent chain; truncating ancestors", id);
                    break;
                }
                chain.push(parent);
                cursor = parents.get(&parent).copied().flatten();
            }
            chain.reverse();

            tx.execute(
                "UPDATE categories SET ancestors = ?1 WHERE id = ?2",
                params![serde_json::to_string(&chain)?, id],
            )
            .with_context(|| format!("Failed to backfill ancestors for category {}", id))?;
        }

        tx.commit()?;
        info!("Backfilled ancestors for {} categories", parents.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                path TEXT NOT NULL DEFAULT '[]',
                parent_id INTEGER,
                children TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            INSERT INTO categories (id, name, slug, path, parent_id, children, created_at, updated_at)
            VALUES
                (1, 'Electronics', 'electronics', '[\"Electronics\"]', NULL, '[2]', 'now', 'now'),
                (2, 'Phones', 'phones', '[\"Electronics\",\"Phones\"]', 1, '[3]', 'now', 'now'),
                (3, 'Android', 'android', '[\"Electronics\",\"Phones\",\"Android\"]', 2, '[]', 'now', 'now');",
        )
        .unwrap();
        conn
    }

    fn ancestors_of(conn: &Connection, id: i64) -> Vec<i64> {
        let raw: String = conn
            .query_row("SELECT ancestors FROM categories WHERE id = ?", [id], |row| row.get(0))
            .unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_backfills_ancestors_from_parent_chain() {
        let conn = legacy_connection();
        MigrationManager::new(&conn).run_migrations().unwrap();

        assert_eq!(ancestors_of(&conn, 1), Vec::<i64>::new());
        assert_eq!(ancestors_of(&conn, 2), vec![1]);
        assert_eq!(ancestors_of(&conn, 3), vec![1, 2]);
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = legacy_connection();
        let manager = MigrationManager::new(&conn);
        manager.run_migrations().unwrap();
        manager.run_migrations().unwrap();

        assert!(manager.is_migration_applied("add_ancestors_to_categories").unwrap());
        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(recorded, 1);
    }
}
