use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::base::repository_traits::{CategorySession, CategoryStore};
use crate::data::types::CategoryQuery;
use crate::error::CategoryError;
use crate::models::category::{
    Category, CategoryDraft, CategoryId, CategoryUpdate, CategoryView, NewCategory,
};
use crate::models::query::{FindAllCategories, FindOneCategory};
use crate::utils::slug::slugify;

pub type Result<T, E = CategoryError> = std::result::Result<T, E>;

/// Owns every read and write of category documents and keeps child lists,
/// materialized paths and name/slug uniqueness consistent across them.
///
/// Each call works on its own store session; writes touching more than one
/// document run inside a single store transaction.
#[derive(Clone)]
pub struct CategoryTreeManager {
    store: Arc<dyn CategoryStore>,
}

impl CategoryTreeManager {
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self { store }
    }

    async fn session(&self) -> Result<Box<dyn CategorySession>> {
        Ok(self.store.start_session().await?)
    }

    // ==================== Lookup ====================

    /// Fetches one category, expanding or omitting its children
    pub async fn find_one(&self, id: CategoryId, options: FindOneCategory) -> Result<CategoryView> {
        let mut session = self.session().await?;
        let category = session
            .find_by_id(id)
            .await?
            .ok_or(CategoryError::NotFound(id))?;

        if !options.include_children {
            return Ok(CategoryView::without_children(category));
        }
        let children = session.find_by_ids(&category.children).await?;
        Ok(CategoryView::with_children(category, children))
    }

    /// Lists categories page by page
    pub async fn find_all(&self, options: FindAllCategories) -> Result<Vec<CategoryView>> {
        let mut session = self.session().await?;
        let query = CategoryQuery::from(&options);
        let categories = session.find(&query).await?;
        debug!("Listed {} categories for {:?}", categories.len(), query);

        if !options.include_children {
            return Ok(categories.into_iter().map(CategoryView::without_children).collect());
        }

        let child_ids: Vec<CategoryId> = categories
            .iter()
            .flat_map(|category| category.children.iter().copied())
            .collect();
        let children: HashMap<CategoryId, Category> = session
            .find_by_ids(&child_ids)
            .await?
            .into_iter()
            .map(|child| (child.id, child))
            .collect();

        Ok(categories
            .into_iter()
            .map(|category| {
                let expanded = category
                    .children
                    .iter()
                    .filter_map(|id| children.get(id).cloned())
                    .collect();
                CategoryView::with_children(category, expanded)
            })
            .collect())
    }

    /// Every category below `id`, ordered by id
    pub async fn find_descendants(&self, id: CategoryId) -> Result<Vec<Category>> {
        let mut session = self.session().await?;
        if session.find_by_id(id).await?.is_none() {
            return Err(CategoryError::NotFound(id));
        }
        Ok(session.find_descendants(id).await?)
    }

    // ==================== Create ====================

    /// Creates a root category, or a child appended to its parent's children
    pub async fn create(&self, new: NewCategory) -> Result<Category> {
        let NewCategory { name, parent_id, description } = new;
        let slug = derive_slug(&name)?;

        let mut session = self.session().await?;
        ensure_unique(session.as_mut(), &name, &slug, None).await?;

        let Some(parent_id) = parent_id else {
            let created = session
                .insert(&CategoryDraft::root(name, slug, description))
                .await?;
            info!("Created root category {} ({})", created.id, created.name);
            return Ok(created);
        };

        if session.find_by_id(parent_id).await?.is_none() {
            return Err(CategoryError::ParentNotFound(parent_id));
        }

        session.start_transaction().await?;
        let outcome = insert_child(session.as_mut(), parent_id, name, slug, description).await;
        let created = finish_transaction(session.as_mut(), outcome).await?;
        info!("Created category {} under {}", created.breadcrumb(), parent_id);
        Ok(created)
    }

    // ==================== Update ====================

    /// Applies the supplied fields. A new name is cascaded into the paths of
    /// every descendant within one transaction.
    pub async fn update(&self, id: CategoryId, update: CategoryUpdate) -> Result<Category> {
        let mut session = self.session().await?;
        let mut category = session
            .find_by_id(id)
            .await?
            .ok_or(CategoryError::NotFound(id))?;

        match update.name {
            Some(ref new_name) if *new_name != category.name => {
                let slug = derive_slug(new_name)?;
                ensure_unique(session.as_mut(), new_name, &slug, Some(id)).await?;

                session.start_transaction().await?;
                let outcome = rename_cascade(session.as_mut(), id, &update, slug).await;
                let (old_name, rewritten) = finish_transaction(session.as_mut(), outcome).await?;
                info!(
                    "Renamed category {} from '{}' to '{}' ({} descendants rewritten)",
                    id, old_name, new_name, rewritten
                );
            }
            _ => {
                if let Some(description) = update.description {
                    category.description = description;
                }
                category.update_timestamp();
                session.save_details(&category).await?;
            }
        }

        session
            .find_by_id(id)
            .await?
            .ok_or(CategoryError::NotFound(id))
    }

    /// Re-parents a category (or promotes it to a root with `None`), carrying
    /// its whole subtree along.
    pub async fn move_category(
        &self,
        id: CategoryId,
        new_parent_id: Option<CategoryId>,
    ) -> Result<Category> {
        let mut session = self.session().await?;
        session.start_transaction().await?;
        let outcome = relocate(session.as_mut(), id, new_parent_id).await;
        let moved = finish_transaction(session.as_mut(), outcome).await?;
        info!("Moved category {} to {}", id, moved.breadcrumb());
        Ok(moved)
    }

    // ==================== Delete ====================

    /// Deletes a category together with its whole subtree and drops every
    /// reference to the removed ids. Returns once the deletion is committed.
    pub async fn delete_one(&self, id: CategoryId) -> Result<bool> {
        let mut session = self.session().await?;
        if session.find_by_id(id).await?.is_none() {
            return Err(CategoryError::NotFound(id));
        }

        session.start_transaction().await?;
        let outcome = delete_subtree(session.as_mut(), id).await;
        let removed = finish_transaction(session.as_mut(), outcome).await?;
        info!("Deleted category {} and {} descendants", id, removed.saturating_sub(1));
        Ok(true)
    }
}

/// Commits on success; on failure aborts and hands back the original error.
async fn finish_transaction<T>(
    session: &mut dyn CategorySession,
    outcome: Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            if let Err(e) = session.commit_transaction().await {
                abort_quietly(session).await;
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            abort_quietly(session).await;
            Err(e)
        }
    }
}

async fn abort_quietly(session: &mut dyn CategorySession) {
    if let Err(abort_err) = session.abort_transaction().await {
        warn!("Failed to abort transaction: {:#}", abort_err);
    }
}

fn derive_slug(name: &str) -> Result<String> {
    let slug = slugify(name);
    if name.trim().is_empty() || slug.is_empty() {
        return Err(CategoryError::InvalidName(name.to_string()));
    }
    Ok(slug)
}

/// Rejects a name or slug already held by a category other than `except`
async fn ensure_unique(
    session: &mut dyn CategorySession,
    name: &str,
    slug: &str,
    except: Option<CategoryId>,
) -> Result<()> {
    if let Some(existing) = session.find_by_name(name).await? {
        if Some(existing.id) != except {
            return Err(CategoryError::Conflict(format!(
                "category name '{}' already exists",
                name
            )));
        }
    }
    if let Some(existing) = session.find_by_slug(slug).await? {
        if Some(existing.id) != except {
            return Err(CategoryError::Conflict(format!(
                "category slug '{}' is already used by '{}'",
                slug, existing.name
            )));
        }
    }
    Ok(())
}

/// Inserts the child and links it from a freshly read parent
async fn insert_child(
    session: &mut dyn CategorySession,
    parent_id: CategoryId,
    name: String,
    slug: String,
    description: Option<String>,
) -> Result<Category> {
    let mut parent = session
        .find_by_id(parent_id)
        .await?
        .ok_or(CategoryError::ParentNotFound(parent_id))?;
    let draft = CategoryDraft::child_of(&parent, name, slug, description);

    let created = session.insert(&draft).await?;
    parent.attach_child(created.id);
    parent.update_timestamp();
    session.save(&parent).await?;
    Ok(created)
}

/// Renames the category and rewrites its name inside every descendant path.
/// Returns the previous name and how many descendants were rewritten.
async fn rename_cascade(
    session: &mut dyn CategorySession,
    id: CategoryId,
    update: &CategoryUpdate,
    slug: String,
) -> Result<(String, usize)> {
    let mut renamed = session
        .find_by_id(id)
        .await?
        .ok_or(CategoryError::NotFound(id))?;
    let old_name = renamed.name.clone();
    let new_name = update.name.clone().unwrap_or_else(|| old_name.clone());

    if let Some(description) = &update.description {
        renamed.description = description.clone();
    }
    renamed.rename(new_name, slug);
    session.save(&renamed).await?;

    let depth = renamed.depth();
    let descendants = session.find_descendants(renamed.id).await?;
    let mut rewritten = 0;
    for mut descendant in descendants {
        match descendant.path.get_mut(depth) {
            Some(segment) => *segment = renamed.name.clone(),
            None => {
                warn!(
                    "Descendant {} of {} has a path shorter than its ancestry",
                    descendant.id, renamed.id
                );
                continue;
            }
        }
        descendant.update_timestamp();
        session.save(&descendant).await?;
        rewritten += 1;
    }
    Ok((old_name, rewritten))
}

async fn relocate(
    session: &mut dyn CategorySession,
    id: CategoryId,
    new_parent_id: Option<CategoryId>,
) -> Result<Category> {
    let mut category = session
        .find_by_id(id)
        .await?
        .ok_or(CategoryError::NotFound(id))?;
    if category.parent_id == new_parent_id {
        return Ok(category);
    }

    let new_parent = match new_parent_id {
        Some(target) => {
            let parent = session
                .find_by_id(target)
                .await?
                .ok_or(CategoryError::ParentNotFound(target))?;
            if parent.id == id || parent.ancestors.contains(&id) {
                return Err(CategoryError::InvalidMove { category: id, target });
            }
            Some(parent)
        }
        None => None,
    };

    if let Some(old_parent_id) = category.parent_id {
        match session.find_by_id(old_parent_id).await? {
            Some(mut old_parent) => {
                old_parent.detach_child(id);
                old_parent.update_timestamp();
                session.save(&old_parent).await?;
            }
            None => warn!("Category {} had a missing parent {}", id, old_parent_id),
        }
    }

    let old_depth = category.depth();
    let (path, ancestors) = match new_parent {
        Some(mut parent) => {
            let lineage = parent.lineage_for_child(&category.name);
            parent.attach_child(id);
            parent.update_timestamp();
            session.save(&parent).await?;
            lineage
        }
        None => (vec![category.name.clone()], Vec::new()),
    };
    category.path = path;
    category.ancestors = ancestors;
    category.parent_id = new_parent_id;
    category.update_timestamp();
    session.save(&category).await?;

    // Descendants keep everything below the moved node and take its new prefix.
    for mut descendant in session.find_descendants(id).await? {
        let tail_path = descendant.path.split_off((old_depth + 1).min(descendant.path.len()));
        let tail_ancestors = descendant
            .ancestors
            .split_off((old_depth + 1).min(descendant.ancestors.len()));

        descendant.path = category.path.iter().cloned().chain(tail_path).collect();
        descendant.ancestors = category
            .ancestors
            .iter()
            .copied()
            .chain(std::iter::once(id))
            .chain(tail_ancestors)
            .collect();
        descendant.update_timestamp();
        session.save(&descendant).await?;
    }

    Ok(category)
}

/// Removes the category, its descendants and all references to them.
/// Returns how many documents were deleted.
async fn delete_subtree(session: &mut dyn CategorySession, id: CategoryId) -> Result<u64> {
    let category = session
        .find_by_id(id)
        .await?
        .ok_or(CategoryError::NotFound(id))?;
    let mut doomed = vec![category.id];
    doomed.extend(
        session
            .find_descendants(category.id)
            .await?
            .into_iter()
            .map(|descendant| descendant.id),
    );

    for mut referrer in session.find_referencing_children(&doomed).await? {
        if doomed.contains(&referrer.id) {
            continue;
        }
        referrer.children.retain(|child| !doomed.contains(child));
        referrer.update_timestamp();
        session.save(&referrer).await?;
    }

    match session.delete_many(&doomed).await? {
        0 => Err(CategoryError::NotFound(id)),
        removed => Ok(removed),
    }
}
