use thiserror::Error;

use crate::models::category::CategoryId;

/// Errors surfaced by the category tree manager
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("category {0} not found")]
    NotFound(CategoryId),
    #[error("parent category {0} does not exist")]
    ParentNotFound(CategoryId),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid category name `{0}`")]
    InvalidName(String),
    #[error("unsupported sort `{0}`")]
    InvalidSort(String),
    #[error("cannot move category {category} under {target}: target is inside its subtree")]
    InvalidMove { category: CategoryId, target: CategoryId },
    /// Store failure, passed through unchanged
    #[error(transparent)]
    Store(anyhow::Error),
}

impl CategoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CategoryError::NotFound(_) | CategoryError::ParentNotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CategoryError::Conflict(_))
    }
}

impl From<anyhow::Error> for CategoryError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<DuplicateKey>() {
            Some(duplicate) => CategoryError::Conflict(duplicate.to_string()),
            None => CategoryError::Store(err),
        }
    }
}

/// Raised by a store when a write hits one of its unique indexes
#[derive(Debug, Error)]
#[error("category {field} is already taken")]
pub struct DuplicateKey {
    pub field: String,
}
