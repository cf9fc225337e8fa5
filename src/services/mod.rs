pub mod category;

pub use category::CategoryTreeManager;
