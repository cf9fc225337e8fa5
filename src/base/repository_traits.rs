use anyhow::Result;
use async_trait::async_trait;

use crate::data::types::CategoryQuery;
use crate::models::category::{Category, CategoryDraft, CategoryId};

// ==================== CategoryStore ====================

/// Document store holding category documents
#[async_trait]
pub trait CategoryStore: Send + Sync {
    /// Acquires a session. The session owns its connection until dropped.
    async fn start_session(&self) -> Result<Box<dyn CategorySession>>;
}

// ==================== CategorySession ====================

/// A connection scoped to one operation
///
/// Without an open transaction every write commits on its own. Dropping a
/// session with a transaction still open rolls that transaction back.
#[async_trait]
pub trait CategorySession: Send {
    async fn start_transaction(&mut self) -> Result<()>;

    async fn commit_transaction(&mut self) -> Result<()>;

    async fn abort_transaction(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Inserts a new document and returns it with its assigned id
    async fn insert(&mut self, draft: &CategoryDraft) -> Result<Category>;

    async fn find_by_id(&mut self, id: CategoryId) -> Result<Option<Category>>;

    async fn find_by_name(&mut self, name: &str) -> Result<Option<Category>>;

    async fn find_by_slug(&mut self, slug: &str) -> Result<Option<Category>>;

    async fn find(&mut self, query: &CategoryQuery) -> Result<Vec<Category>>;

    /// Resolves ids to documents, in the order given; unknown ids are skipped
    async fn find_by_ids(&mut self, ids: &[CategoryId]) -> Result<Vec<Category>>;

    /// Every category whose ancestor chain contains `id`, ordered by id
    async fn find_descendants(&mut self, id: CategoryId) -> Result<Vec<Category>>;

    /// Every category whose `children` list references one of `ids`
    async fn find_referencing_children(&mut self, ids: &[CategoryId]) -> Result<Vec<Category>>;

    /// Overwrites the stored document with the same id
    async fn save(&mut self, category: &Category) -> Result<()>;

    /// Writes only the fields outside the tree structure (description and
    /// timestamps), leaving name, path and links as stored
    async fn save_details(&mut self, category: &Category) -> Result<()>;

    /// Deletes the given documents and returns how many were removed
    async fn delete_many(&mut self, ids: &[CategoryId]) -> Result<u64>;
}
