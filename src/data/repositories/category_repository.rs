use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension, Params, Row};
use serde::de::DeserializeOwned;

use crate::base::repository_traits::{CategorySession, CategoryStore};
use crate::data::database::ConnectionPool;
use crate::data::types::CategoryQuery;
use crate::error::DuplicateKey;
use crate::models::category::{Category, CategoryDraft, CategoryId};
use crate::models::query::SortField;

pub(crate) const CATEGORY_COLUMNS: &str =
    "id, name, slug, path, ancestors, parent_id, children, description, created_at, updated_at";

/// SQLite implementation of the category document store
pub struct SqliteCategoryStore {
    connection_pool: Arc<ConnectionPool>,
}

impl SqliteCategoryStore {
    pub fn new(connection_pool: Arc<ConnectionPool>) -> Self {
        Self { connection_pool }
    }
}

#[async_trait]
impl CategoryStore for SqliteCategoryStore {
    async fn start_session(&self) -> Result<Box<dyn CategorySession>> {
        let conn = self
            .connection_pool
            .get()
            .context("Failed to acquire a database connection")?;
        Ok(Box::new(SqliteSession::new(conn)))
    }
}

/// One pooled connection, returned to the pool when the session drops
pub struct SqliteSession {
    conn: PooledConnection<SqliteConnectionManager>,
    in_transaction: bool,
}

impl SqliteSession {
    pub fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self { conn, in_transaction: false }
    }

    pub(crate) fn map_row(row: &Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: CategoryId(row.get(0)?),
            name: row.get(1)?,
            slug: row.get(2)?,
            path: json_column(row, 3)?,
            ancestors: json_column(row, 4)?,
            parent_id: row.get::<_, Option<i64>>(5)?.map(CategoryId),
            children: json_column(row, 6)?,
            description: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn query_one<P: Params>(&self, clause: &str, params: P) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE {}", CATEGORY_COLUMNS, clause);
        let category = self
            .conn
            .query_row(&sql, params, Self::map_row)
            .optional()
            .with_context(|| format!("Failed to load category where {}", clause))?;
        Ok(category)
    }

    fn query_many<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::map_row)?;
        let categories = rows
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read category documents")?;
        Ok(categories)
    }
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ids_json(ids: &[CategoryId]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

fn to_sql_integer(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Turns unique index violations into `DuplicateKey`
fn map_write_error(err: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if let Some(columns) = message.strip_prefix("UNIQUE constraint failed: ") {
                let field = columns.rsplit('.').next().unwrap_or(columns).to_string();
                return anyhow::Error::new(DuplicateKey { field });
            }
        }
    }
    anyhow::Error::new(err)
}

#[async_trait]
impl CategorySession for SqliteSession {
    async fn start_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            bail!("a transaction is already open on this session");
        }
        // IMMEDIATE takes the write lock up front so concurrent writers queue
        // behind busy_timeout instead of failing at commit.
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin transaction")?;
        self.in_transaction = true;
        debug!("Transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            bail!("no open transaction to commit");
        }
        self.conn.execute_batch("COMMIT").context("Failed to commit transaction")?;
        self.in_transaction = false;
        debug!("Transaction committed");
        Ok(())
    }

    async fn abort_transaction(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        if self.conn.is_autocommit() {
            debug!("Transaction was already rolled back by the database");
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK").context("Failed to roll back transaction")?;
        debug!("Transaction aborted");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn insert(&mut self, draft: &CategoryDraft) -> Result<Category> {
        self.conn
            .execute(
                "INSERT INTO categories (
                    name, slug, path, ancestors, parent_id, children, description, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, '[]', ?6, ?7, ?7)",
                params![
                    draft.name,
                    draft.slug,
                    serde_json::to_string(&draft.path)?,
                    ids_json(&draft.ancestors)?,
                    draft.parent_id.map(|id| id.0),
                    draft.description,
                    draft.created_at,
                ],
            )
            .map_err(map_write_error)
            .with_context(|| format!("Failed to insert category '{}'", draft.name))?;

        let id = CategoryId(self.conn.last_insert_rowid());
        debug!("Inserted category {} ({})", id, draft.name);
        self.query_one("id = ?1", [id.0])?
            .ok_or_else(|| anyhow!("category {} vanished right after insert", id))
    }

    async fn find_by_id(&mut self, id: CategoryId) -> Result<Option<Category>> {
        self.query_one("id = ?1", [id.0])
    }

    async fn find_by_name(&mut self, name: &str) -> Result<Option<Category>> {
        self.query_one("name = ?1", [name])
    }

    async fn find_by_slug(&mut self, slug: &str) -> Result<Option<Category>> {
        self.query_one("slug = ?1", [slug])
    }

    async fn find(&mut self, query: &CategoryQuery) -> Result<Vec<Category>> {
        let mut sql = format!("SELECT {} FROM categories", CATEGORY_COLUMNS);
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(after) = query.id_after {
            clauses.push("id > ?");
            values.push(Value::Integer(after.0));
        }
        if let Some(slug) = &query.slug {
            clauses.push("slug = ?");
            values.push(Value::Text(slug.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(&format!(
            " ORDER BY {} {}",
            query.sort.field.column(),
            query.sort.direction.keyword()
        ));
        if query.sort.field != SortField::Id {
            sql.push_str(", id ASC");
        }

        // LIMIT -1 means no limit in SQLite; a zero limit is unbounded too
        sql.push_str(" LIMIT ? OFFSET ?");
        let limit = query.limit.filter(|limit| *limit > 0);
        values.push(Value::Integer(limit.map(to_sql_integer).unwrap_or(-1)));
        values.push(Value::Integer(to_sql_integer(query.skip)));

        self.query_many(&sql, params_from_iter(values))
    }

    async fn find_by_ids(&mut self, ids: &[CategoryId]) -> Result<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM categories WHERE id IN (SELECT value FROM json_each(?1))",
            CATEGORY_COLUMNS
        );
        let found: HashMap<CategoryId, Category> = self
            .query_many(&sql, [ids_json(ids)?])?
            .into_iter()
            .map(|category| (category.id, category))
            .collect();

        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            match found.get(id) {
                Some(category) => ordered.push(category.clone()),
                None => warn!("Category {} is referenced but does not exist", id),
            }
        }
        Ok(ordered)
    }

    async fn find_descendants(&mut self, id: CategoryId) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories
             WHERE EXISTS (SELECT 1 FROM json_each(categories.ancestors) WHERE json_each.value = ?1)
             ORDER BY id",
            CATEGORY_COLUMNS
        );
        self.query_many(&sql, [id.0])
    }

    async fn find_referencing_children(&mut self, ids: &[CategoryId]) -> Result<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM categories
             WHERE EXISTS (
                SELECT 1 FROM json_each(categories.children) AS child
                WHERE child.value IN (SELECT value FROM json_each(?1))
             )
             ORDER BY id",
            CATEGORY_COLUMNS
        );
        self.query_many(&sql, [ids_json(ids)?])
    }

    async fn save(&mut self, category: &Category) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE categories SET
                    name = ?1,
                    slug = ?2,
                    path = ?3,
                    ancestors = ?4,
                    parent_id = ?5,
                    children = ?6,
                    description = ?7,
                    updated_at = ?8
                WHERE id = ?9",
                params![
                    category.name,
                    category.slug,
                    serde_json::to_string(&category.path)?,
                    ids_json(&category.ancestors)?,
                    category.parent_id.map(|id| id.0),
                    ids_json(&category.children)?,
                    category.description,
                    category.updated_at,
                    category.id.0,
                ],
            )
            .map_err(map_write_error)
            .with_context(|| format!("Failed to save category {}", category.id))?;

        if changed == 0 {
            bail!("category {} does not exist", category.id);
        }
        Ok(())
    }

    async fn save_details(&mut self, category: &Category) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE categories SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![category.description, category.updated_at, category.id.0],
            )
            .with_context(|| format!("Failed to save details of category {}", category.id))?;

        if changed == 0 {
            bail!("category {} does not exist", category.id);
        }
        Ok(())
    }

    async fn delete_many(&mut self, ids: &[CategoryId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self
            .conn
            .execute(
                "DELETE FROM categories WHERE id IN (SELECT value FROM json_each(?1))",
                [ids_json(ids)?],
            )
            .context("Failed to delete categories")?;
        debug!("Deleted {} categories", removed);
        Ok(removed as u64)
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if !self.in_transaction || self.conn.is_autocommit() {
            return;
        }
        warn!("Session released with an open transaction; rolling back");
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("Failed to roll back abandoned transaction: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::data::database::Database;
    use crate::models::query::Sort;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("store.db").display().to_string(),
            ..DatabaseConfig::default()
        };
        let database = Database::new(&config).unwrap();
        (dir, database)
    }

    fn draft(name: &str) -> CategoryDraft {
        CategoryDraft::root(name.to_string(), name.to_lowercase(), None)
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        let first = session.insert(&draft("Books")).await.unwrap();
        let second = session.insert(&draft("Music")).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.path, vec!["Books"]);
        assert!(first.children.is_empty());
        assert_eq!(session.find_by_name("Music").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_unique_violation_becomes_duplicate_key() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        session.insert(&draft("Books")).await.unwrap();
        let same_name = CategoryDraft::root("Books".to_string(), "books-2".to_string(), None);
        let err = session.insert(&same_name).await.unwrap_err();

        let duplicate = err.downcast_ref::<DuplicateKey>().expect("duplicate key error");
        assert_eq!(duplicate.field, "name");
    }

    #[tokio::test]
    async fn test_slug_violation_becomes_duplicate_key() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        session.insert(&draft("Books")).await.unwrap();
        let same_slug = CategoryDraft::root("BOOKS".to_string(), "books".to_string(), None);
        let err = session.insert(&same_slug).await.unwrap_err();

        let duplicate = err.downcast_ref::<DuplicateKey>().expect("duplicate key error");
        assert_eq!(duplicate.field, "slug");
        assert_eq!(session.find(&CategoryQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_is_unbounded() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        session.insert(&draft("Books")).await.unwrap();
        session.insert(&draft("Music")).await.unwrap();

        let query = CategoryQuery {
            limit: Some(0),
            ..CategoryQuery::default()
        };
        assert_eq!(session.find(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_ids_keeps_requested_order() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        let a = session.insert(&draft("A")).await.unwrap();
        let b = session.insert(&draft("B")).await.unwrap();

        let found = session
            .find_by_ids(&[b.id, CategoryId(999), a.id])
            .await
            .unwrap();
        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_find_applies_cursor_sort_and_paging() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        let mut ids = Vec::new();
        for name in ["D", "B", "C", "A"] {
            ids.push(session.insert(&draft(name)).await.unwrap().id);
        }

        let query = CategoryQuery {
            id_after: Some(ids[0]),
            sort: Sort::ascending(SortField::Name),
            skip: 1,
            limit: Some(1),
            ..CategoryQuery::default()
        };
        let page = session.find(&query).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "B");
    }

    #[tokio::test]
    async fn test_dropping_session_rolls_back_open_transaction() {
        let (_dir, database) = open();
        let store = database.category_store();

        {
            let mut session = store.start_session().await.unwrap();
            session.start_transaction().await.unwrap();
            session.insert(&draft("Ghost")).await.unwrap();
        }

        let mut session = store.start_session().await.unwrap();
        assert!(session.find_by_name("Ghost").await.unwrap().is_none());
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn test_save_of_missing_document_fails() {
        let (_dir, database) = open();
        let store = database.category_store();
        let mut session = store.start_session().await.unwrap();

        let mut category = session.insert(&draft("Books")).await.unwrap();
        session.delete_many(&[category.id]).await.unwrap();
        category.description = Some("gone".into());

        assert!(session.save(&category).await.is_err());
    }
}
