use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use catalog::utils::{self, DbInspector};
use catalog::{CatalogConfig, CategoryTreeManager, Database, FindAllCategories};

const PAGE_SIZE: u64 = 100;

/// Lists the category tree, or audits it with `--check`
#[derive(Debug, Parser)]
#[command(name = "catalog", version)]
struct Args {
    /// Check tree consistency instead of listing categories
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    env_logger::init();
    info!("Starting catalog category service...");

    let config = CatalogConfig::load().context("Failed to load configuration")?;
    let database_path = config.database.path.clone();

    info!("Ensuring database directory exists...");
    utils::ensure_directory_exists(&database_path)?;

    info!("Initializing database...");
    let database = Database::new(&config.database)?;
    let manager = CategoryTreeManager::new(database.category_store());

    if args.check {
        let violations = DbInspector::new(&database_path)?.audit()?;
        for violation in &violations {
            println!("{}", violation);
        }
        if !violations.is_empty() {
            bail!("category tree has {} inconsistencies", violations.len());
        }
        println!("category tree is consistent");
        return Ok(());
    }

    // Walk every category with the id cursor, one page at a time
    let mut cursor = None;
    let mut total = 0;
    loop {
        let page = manager
            .find_all(FindAllCategories {
                start_id: cursor,
                limit: Some(PAGE_SIZE),
                ..FindAllCategories::default()
            })
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.id);
        total += page.len();

        for category in &page {
            println!("{:>6}  {}  ({})", category.id.0, category.path.join(" > "), category.slug);
        }
    }

    if total == 0 {
        warn!("No categories found in {}", database_path);
    } else {
        info!("Listed {} categories", total);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_flag() {
        assert!(Args::try_parse_from(["catalog", "--check"]).unwrap().check);
        assert!(!Args::try_parse_from(["catalog"]).unwrap().check);
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        assert!(Args::try_parse_from(["catalog", "--chek"]).is_err());
    }
}
