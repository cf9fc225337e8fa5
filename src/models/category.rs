use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a category
///
/// Identifiers are assigned by the store in increasing order, which is what
/// makes them usable as a pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CategoryId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A category document as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    /// Unique human readable label
    pub name: String,
    /// URL-safe form of `name`
    pub slug: String,
    /// Names from the root down to this category, inclusive
    pub path: Vec<String>,
    /// Ids from the root down to the parent, exclusive of this category
    pub ancestors: Vec<CategoryId>,
    pub parent_id: Option<CategoryId>,
    /// Direct children in insertion order
    pub children: Vec<CategoryId>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Position of this category's own name inside `path`
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// Materialized path joined for display, e.g. `Electronics > Phones`
    pub fn breadcrumb(&self) -> String {
        self.path.join(" > ")
    }

    /// Returns the chain a child of this category inherits: `(path, ancestors)`
    pub fn lineage_for_child(&self, child_name: &str) -> (Vec<String>, Vec<CategoryId>) {
        let mut path = self.path.clone();
        path.push(child_name.to_string());
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.id);
        (path, ancestors)
    }

    /// Appends a child reference unless it is already present
    pub fn attach_child(&mut self, child: CategoryId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Removes every reference to `child`; returns whether anything changed
    pub fn detach_child(&mut self, child: CategoryId) -> bool {
        let before = self.children.len();
        self.children.retain(|id| *id != child);
        before != self.children.len()
    }

    /// Renames this category in place, keeping `path` in step with `name`
    pub fn rename(&mut self, name: String, slug: String) {
        if let Some(last) = self.path.last_mut() {
            *last = name.clone();
        }
        self.name = name;
        self.slug = slug;
        self.updated_at = Utc::now();
    }

    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A category that has not been written yet; the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub slug: String,
    pub path: Vec<String>,
    pub ancestors: Vec<CategoryId>,
    pub parent_id: Option<CategoryId>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CategoryDraft {
    /// Draft for a root category
    pub fn root(name: String, slug: String, description: Option<String>) -> Self {
        Self {
            path: vec![name.clone()],
            name,
            slug,
            ancestors: Vec::new(),
            parent_id: None,
            description,
            created_at: Utc::now(),
        }
    }

    /// Draft for a category placed under `parent`
    pub fn child_of(parent: &Category, name: String, slug: String, description: Option<String>) -> Self {
        let (path, ancestors) = parent.lineage_for_child(&name);
        Self {
            name,
            slug,
            path,
            ancestors,
            parent_id: Some(parent.id),
            description,
            created_at: Utc::now(),
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub description: Option<String>,
}

impl NewCategory {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn child(name: impl Into<String>, parent_id: CategoryId) -> Self {
        Self {
            name: name.into(),
            parent_id: Some(parent_id),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Partial update of a category; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
}

impl CategoryUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn describe(description: Option<String>) -> Self {
        Self {
            name: None,
            description: Some(description),
        }
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Lookup result: a category whose children are either expanded or absent
///
/// When `children` is `None` the field is left out of the serialized form
/// entirely instead of carrying bare ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub path: Vec<String>,
    pub ancestors: Vec<CategoryId>,
    pub parent_id: Option<CategoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Category>>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryView {
    pub fn without_children(category: Category) -> Self {
        Self::build(category, None)
    }

    pub fn with_children(category: Category, children: Vec<Category>) -> Self {
        Self::build(category, Some(children))
    }

    fn build(category: Category, children: Option<Vec<Category>>) -> Self {
        Self {
            id: category.id,
            name: category.name,
            slug: category.slug,
            path: category.path,
            ancestors: category.ancestors,
            parent_id: category.parent_id,
            children,
            description: category.description,
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: i64, path: &[&str]) -> Category {
        let now = Utc::now();
        Category {
            id: CategoryId(id),
            name: path.last().map(|s| s.to_string()).unwrap_or_default(),
            slug: String::new(),
            path: path.iter().map(|s| s.to_string()).collect(),
            ancestors: Vec::new(),
            parent_id: None,
            children: Vec::new(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_child_draft_extends_lineage() {
        let mut parent = sample(7, &["Electronics", "Phones"]);
        parent.ancestors = vec![CategoryId(3)];

        let draft = CategoryDraft::child_of(&parent, "Android".into(), "android".into(), None);

        assert_eq!(draft.path, vec!["Electronics", "Phones", "Android"]);
        assert_eq!(draft.ancestors, vec![CategoryId(3), CategoryId(7)]);
        assert_eq!(draft.parent_id, Some(CategoryId(7)));
    }

    #[test]
    fn test_root_draft() {
        let draft = CategoryDraft::root("Books".into(), "books".into(), None);
        assert_eq!(draft.path, vec!["Books"]);
        assert!(draft.ancestors.is_empty());
        assert!(draft.parent_id.is_none());
    }

    #[test]
    fn test_attach_and_detach_child() {
        let mut category = sample(1, &["Books"]);
        category.attach_child(CategoryId(2));
        category.attach_child(CategoryId(2));
        category.attach_child(CategoryId(3));
        assert_eq!(category.children, vec![CategoryId(2), CategoryId(3)]);

        assert!(category.detach_child(CategoryId(2)));
        assert!(!category.detach_child(CategoryId(2)));
        assert_eq!(category.children, vec![CategoryId(3)]);
    }

    #[test]
    fn test_rename_rewrites_last_path_element() {
        let mut category = sample(4, &["Electronics", "Phones"]);
        category.rename("Mobile".into(), "mobile".into());
        assert_eq!(category.path, vec!["Electronics", "Mobile"]);
        assert_eq!(category.name, "Mobile");
        assert_eq!(category.slug, "mobile");
    }

    #[test]
    fn test_view_without_children_omits_field() {
        let view = CategoryView::without_children(sample(1, &["Books"]));
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("children").is_none());
        assert_eq!(json["path"], serde_json::json!(["Books"]));
    }

    #[test]
    fn test_view_with_children_serializes_documents() {
        let child = sample(2, &["Books", "Poetry"]);
        let view = CategoryView::with_children(sample(1, &["Books"]), vec![child]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["children"][0]["name"], "Poetry");
    }

    #[test]
    fn test_update_distinguishes_clearing_description() {
        let cleared: CategoryUpdate = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let untouched: CategoryUpdate = serde_json::from_str(r#"{"name": "Tech"}"#).unwrap();
        assert_eq!(untouched.description, None);
        assert_eq!(untouched.name.as_deref(), Some("Tech"));
    }
}
