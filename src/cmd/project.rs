//! Project setup — `signworks init`.

use std::path::Path;

use anyhow::{Context, Result};

use signworks::config::SiteConfig;
use signworks::content::ContentStore;

/// Create the config file and database. Safe to run twice.
pub fn cmd_init(config_path: &Path) -> Result<()> {
    let already_initialized = config_path.exists();
    if already_initialized {
        println!(
            "signworks already initialized ({} exists)",
            config_path.display()
        );
    } else {
        std::fs::write(config_path, SiteConfig::starter_toml())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    let config = SiteConfig::load(config_path)?;
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    ContentStore::new(db_path).context("Failed to initialize content database")?;
    println!("Database ready at {}", db_path.display());

    if !already_initialized {
        println!("Initialized signworks project");
    }
    Ok(())
}
