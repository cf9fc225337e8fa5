pub mod base;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

// Re-export the store boundary
pub use base::repository_traits::{CategorySession, CategoryStore};

// Re-export models
pub use models::{
    category::{Category, CategoryId, CategoryUpdate, CategoryView, NewCategory},
    query::{FindAllCategories, FindOneCategory, Sort, SortDirection, SortField},
};

pub use config::CatalogConfig;
pub use data::{Database, SqliteCategoryStore};
pub use error::CategoryError;
pub use services::category::CategoryTreeManager;
