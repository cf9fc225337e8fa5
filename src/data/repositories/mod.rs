mod category_repository;

pub use category_repository::{SqliteCategoryStore, SqliteSession};
pub(crate) use category_repository::CATEGORY_COLUMNS;
