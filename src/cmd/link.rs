//! Internal-linking commands — `signworks link extract` / `signworks link apply`.

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;

use signworks::config::SiteConfig;
use signworks::content::{ContentStore, DbHandle};
use signworks::linking::{KeywordExtractor, apply_links};
use signworks::providers::{active_provider, build_models};

fn open_db(config: &SiteConfig) -> Result<DbHandle> {
    let store =
        ContentStore::new(&config.database.path).context("Failed to open content database")?;
    Ok(DbHandle::new(store))
}

/// Ask the text model for linkable keywords per content item and store
/// them as rules.
pub async fn cmd_link_extract(config: SiteConfig) -> Result<()> {
    let db = open_db(&config)?;
    let provider = active_provider(&db, &config.ai).await;
    let (text, _image) = build_models(provider, &config.ai)
        .context("AI provider not available — check API keys")?;

    let extractor = KeywordExtractor::new(db, text, config.pipeline.keywords_per_item);
    let report = extractor.run().await?;

    println!(
        "Processed {} items: {} rules stored, {} items skipped",
        report.items_processed, report.rules_created, report.items_failed
    );
    Ok(())
}

/// Inject anchors for all stored rules into post bodies.
pub async fn cmd_link_apply(config: SiteConfig, yes: bool) -> Result<()> {
    if !yes {
        let proceed = Confirm::new()
            .with_prompt("Rewrite stored article bodies with internal links?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let db = open_db(&config)?;
    let report = apply_links(&db).await?;

    if report.posts_updated == 0 {
        println!("Nothing to do ({} posts scanned).", report.posts_scanned);
        return Ok(());
    }
    println!(
        "{} Injected {} links across {} of {} posts",
        style("✓").green().bold(),
        report.links_injected,
        report.posts_updated,
        report.posts_scanned
    );
    for entry in &report.per_post {
        println!("  {} — {} links", entry.slug, entry.injected);
    }
    Ok(())
}
