pub mod db_inspector;
pub mod slug;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub use db_inspector::{audit_tree, DbInspector, TreeViolation};
pub use slug::slugify;

/// Ensures that the directory for the given file path exists
///
/// This function extracts the directory part of a given file path
/// and creates it if it doesn't exist.
pub fn ensure_directory_exists(file_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}
