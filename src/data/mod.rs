pub mod database;
pub mod migration;
pub mod repositories;
pub mod types;

pub use crate::base::{CategorySession, CategoryStore};

pub use database::{init_database, ConnectionPool, Database};
pub use repositories::{SqliteCategoryStore, SqliteSession};
pub use types::CategoryQuery;
