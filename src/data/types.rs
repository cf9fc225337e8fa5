use crate::models::category::CategoryId;
use crate::models::query::{FindAllCategories, Sort};

/// Store-level listing query built from caller options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryQuery {
    /// Exclusive lower bound on the id
    pub id_after: Option<CategoryId>,
    pub slug: Option<String>,
    pub sort: Sort,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl From<&FindAllCategories> for CategoryQuery {
    fn from(options: &FindAllCategories) -> Self {
        Self {
            id_after: options.start_id,
            slug: options.slug.clone(),
            sort: options.sort.unwrap_or_default(),
            skip: options.skip.unwrap_or(0),
            limit: options.limit,
        }
    }
}
