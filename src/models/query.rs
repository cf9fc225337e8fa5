use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CategoryError;
use crate::models::category::CategoryId;

/// Options for a single category lookup
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOneCategory {
    #[serde(default)]
    pub include_children: bool,
}

impl FindOneCategory {
    pub fn with_children() -> Self {
        Self { include_children: true }
    }
}

/// Filter and paging options for listing categories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindAllCategories {
    /// Only categories with an id strictly greater than this one
    pub start_id: Option<CategoryId>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Option<Sort>,
    /// Exact slug match
    pub slug: Option<String>,
    #[serde(default)]
    pub include_children: bool,
}

impl FindAllCategories {
    pub fn after(start_id: CategoryId) -> Self {
        Self {
            start_id: Some(start_id),
            ..Self::default()
        }
    }

    pub fn by_slug(slug: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    Id,
    Name,
    Slug,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Slug => "slug",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }

    fn key(self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Slug => "slug",
            SortField::CreatedAt => "createdAt",
            SortField::UpdatedAt => "updatedAt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Sort order for listings, written as `"name"` or `"-name"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: SortField) -> Self {
        Self { field, direction: SortDirection::Ascending }
    }

    pub fn descending(field: SortField) -> Self {
        Self { field, direction: SortDirection::Descending }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::ascending(SortField::Id)
    }
}

impl FromStr for Sort {
    type Err = CategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (direction, key) = match trimmed.strip_prefix('-') {
            Some(rest) => (SortDirection::Descending, rest),
            None => (SortDirection::Ascending, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let field = match key {
            "id" | "_id" => SortField::Id,
            "name" => SortField::Name,
            "slug" => SortField::Slug,
            "createdAt" | "created_at" => SortField::CreatedAt,
            "updatedAt" | "updated_at" => SortField::UpdatedAt,
            _ => return Err(CategoryError::InvalidSort(s.to_string())),
        };
        Ok(Self { field, direction })
    }
}

impl TryFrom<String> for Sort {
    type Error = CategoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Sort> for String {
    fn from(sort: Sort) -> Self {
        sort.to_string()
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{}", self.field.key()),
            SortDirection::Descending => write!(f, "-{}", self.field.key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort() {
        assert_eq!("name".parse::<Sort>().unwrap(), Sort::ascending(SortField::Name));
        assert_eq!("-createdAt".parse::<Sort>().unwrap(), Sort::descending(SortField::CreatedAt));
        assert_eq!("_id".parse::<Sort>().unwrap(), Sort::default());
    }

    #[test]
    fn test_parse_unknown_sort_field() {
        let err = "-price".parse::<Sort>().unwrap_err();
        assert!(matches!(err, CategoryError::InvalidSort(ref s) if s == "-price"));
    }

    #[test]
    fn test_find_all_deserializes_sort_string() {
        let query: FindAllCategories =
            serde_json::from_str(r#"{"startId": 4, "sort": "-slug", "limit": 10}"#).unwrap();
        assert_eq!(query.start_id, Some(CategoryId(4)));
        assert_eq!(query.sort, Some(Sort::descending(SortField::Slug)));
        assert_eq!(query.limit, Some(10));
        assert!(!query.include_children);
    }
}
