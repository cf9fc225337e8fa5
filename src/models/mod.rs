pub mod category;
pub mod query;

pub use category::{Category, CategoryDraft, CategoryId, CategoryUpdate, CategoryView, NewCategory};
pub use query::{FindAllCategories, FindOneCategory, Sort, SortDirection, SortField};
