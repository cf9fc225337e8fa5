use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use rusqlite::{Connection, OpenFlags};

use crate::data::repositories::{SqliteSession, CATEGORY_COLUMNS};
use crate::models::category::{Category, CategoryId};
use crate::utils::slug::slugify;

/// A broken tree invariant found by [`audit_tree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeViolation {
    /// `parent.children` references an id that does not exist
    DanglingChild { parent: CategoryId, child: CategoryId },
    /// `parent.children` lists a category whose `parent_id` points elsewhere
    ForeignChild { parent: CategoryId, child: CategoryId },
    /// A category's parent does not list it among its children
    UnreferencedChild { parent: CategoryId, child: CategoryId },
    /// A category's `parent_id` does not exist
    MissingParent { child: CategoryId, parent: CategoryId },
    PathMismatch { id: CategoryId, expected: Vec<String>, actual: Vec<String> },
    AncestorsMismatch { id: CategoryId, expected: Vec<CategoryId>, actual: Vec<CategoryId> },
    SlugMismatch { id: CategoryId, expected: String, actual: String },
}

impl fmt::Display for TreeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeViolation::DanglingChild { parent, child } => {
                write!(f, "category {} lists missing child {}", parent, child)
            }
            TreeViolation::ForeignChild { parent, child } => {
                write!(f, "category {} lists child {} that belongs to another parent", parent, child)
            }
            TreeViolation::UnreferencedChild { parent, child } => {
                write!(f, "category {} is not listed by its parent {}", child, parent)
            }
            TreeViolation::MissingParent { child, parent } => {
                write!(f, "category {} points at missing parent {}", child, parent)
            }
            TreeViolation::PathMismatch { id, expected, actual } => {
                write!(f, "category {} has path {:?}, expected {:?}", id, actual, expected)
            }
            TreeViolation::AncestorsMismatch { id, expected, actual } => {
                write!(f, "category {} has ancestors {:?}, expected {:?}", id, actual, expected)
            }
            TreeViolation::SlugMismatch { id, expected, actual } => {
                write!(f, "category {} has slug '{}', expected '{}'", id, actual, expected)
            }
        }
    }
}

/// Checks every category against its parent and children.
pub fn audit_tree(categories: &[Category]) -> Vec<TreeViolation> {
    let by_id: HashMap<CategoryId, &Category> = categories.iter().map(|c| (c.id, c)).collect();
    let mut violations = Vec::new();

    for category in categories {
        for child_id in &category.children {
            match by_id.get(child_id) {
                None => violations.push(TreeViolation::DanglingChild {
                    parent: category.id,
                    child: *child_id,
                }),
                Some(child) if child.parent_id != Some(category.id) => {
                    violations.push(TreeViolation::ForeignChild {
                        parent: category.id,
                        child: *child_id,
                    })
                }
                Some(_) => {}
            }
        }

        let expected_slug = slugify(&category.name);
        if category.slug != expected_slug {
            violations.push(TreeViolation::SlugMismatch {
                id: category.id,
                expected: expected_slug,
                actual: category.slug.clone(),
            });
        }

        let (expected_path, expected_ancestors) = match category.parent_id {
            None => (vec![category.name.clone()], Vec::new()),
            Some(parent_id) => match by_id.get(&parent_id) {
                None => {
                    violations.push(TreeViolation::MissingParent {
                        child: category.id,
                        parent: parent_id,
                    });
                    continue;
                }
                Some(parent) => {
                    if !parent.children.contains(&category.id) {
                        violations.push(TreeViolation::UnreferencedChild {
                            parent: parent_id,
                            child: category.id,
                        });
                    }
                    parent.lineage_for_child(&category.name)
                }
            },
        };

        if category.path != expected_path {
            violations.push(TreeViolation::PathMismatch {
                id: category.id,
                expected: expected_path,
                actual: category.path.clone(),
            });
        }
        if category.ancestors != expected_ancestors {
            violations.push(TreeViolation::AncestorsMismatch {
                id: category.id,
                expected: expected_ancestors,
                actual: category.ancestors.clone(),
            });
        }
    }

    violations
}

/// Read-only view of a catalog database for consistency checks
pub struct DbInspector {
    connection: Connection,
}

impl DbInspector {
    /// Create a new database inspector for the specified database file
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = Path::new(db_path);

        if !db_path.exists() {
            return Err(anyhow::anyhow!("Database file does not exist: {}", db_path.display()));
        }

        let connection = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .context("Failed to open database connection")?;

        Ok(Self { connection })
    }

    /// Loads every category document, ordered by id
    pub fn load_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {} FROM categories ORDER BY id", CATEGORY_COLUMNS))
            .context("Failed to prepare category listing")?;

        let categories = stmt
            .query_map([], SqliteSession::map_row)
            .context("Failed to query categories")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to collect categories")?;

        Ok(categories)
    }

    /// Runs [`audit_tree`] over the whole database
    pub fn audit(&self) -> Result<Vec<TreeViolation>> {
        let categories = self.load_categories()?;
        let violations = audit_tree(&categories);
        for violation in &violations {
            warn!("Tree violation: {}", violation);
        }
        info!(
            "Audited {} categories, {} violations",
            categories.len(),
            violations.len()
        );
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(id: i64, parent: Option<i64>, path: &[&str], ancestors: &[i64], children: &[i64]) -> Category {
        let now = Utc::now();
        let name = path.last().unwrap().to_string();
        Category {
            id: CategoryId(id),
            slug: slugify(&name),
            name,
            path: path.iter().map(|s| s.to_string()).collect(),
            ancestors: ancestors.iter().copied().map(CategoryId).collect(),
            parent_id: parent.map(CategoryId),
            children: children.iter().copied().map(CategoryId).collect(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_consistent_tree_has_no_violations() {
        let tree = vec![
            node(1, None, &["Electronics"], &[], &[2]),
            node(2, Some(1), &["Electronics", "Phones"], &[1], &[3]),
            node(3, Some(2), &["Electronics", "Phones", "Android"], &[1, 2], &[]),
        ];
        assert!(audit_tree(&tree).is_empty());
    }

    #[test]
    fn test_detects_stale_path_and_missing_reference() {
        let tree = vec![
            node(1, None, &["Tech"], &[], &[]),
            node(2, Some(1), &["Electronics", "Phones"], &[1], &[]),
        ];
        let violations = audit_tree(&tree);
        assert!(violations.contains(&TreeViolation::UnreferencedChild {
            parent: CategoryId(1),
            child: CategoryId(2)
        }));
        assert!(violations
            .iter()
            .any(|v| matches!(v, TreeViolation::PathMismatch { id, .. } if *id == CategoryId(2))));
    }

    #[test]
    fn test_detects_dangling_child() {
        let tree = vec![node(1, None, &["Books"], &[], &[9])];
        assert_eq!(
            audit_tree(&tree),
            vec![TreeViolation::DanglingChild { parent: CategoryId(1), child: CategoryId(9) }]
        );
    }
}
