//! Pipeline commands — `signworks pipeline` and `signworks runs`.

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;

use signworks::config::SiteConfig;
use signworks::content::models::RunStatus;
use signworks::content::{ContentStore, DbHandle};
use signworks::pipeline::{PipelineGate, PipelineRunner, PipelineTuning};
use signworks::providers::{active_provider, build_models};
use signworks::ui::PipelineUi;

fn open_db(config: &SiteConfig) -> Result<DbHandle> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = ContentStore::new(db_path).context("Failed to open content database")?;
    Ok(DbHandle::new(store))
}

/// Run the four-stage pipeline headless with live progress bars.
pub async fn cmd_pipeline(config: SiteConfig, yes: bool, verbose: bool) -> Result<()> {
    let db = open_db(&config)?;
    let provider = active_provider(&db, &config.ai).await;

    if !yes {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Start a pipeline run ({} provider, up to {} articles)?",
                provider.as_str(),
                config.pipeline.max_articles
            ))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let (text, image) = build_models(provider, &config.ai)
        .context("AI provider not available — check API keys")?;
    let tuning = PipelineTuning::from(&config);
    let max_articles = tuning.max_articles as u64;
    let runner = PipelineRunner::new(db, text, image, tuning, PipelineGate::new());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { runner.run(tx).await });

    let ui = PipelineUi::new(max_articles, verbose);
    while let Some(event) = rx.recv().await {
        ui.on_event(&event);
    }
    ui.finish();

    let run = handle.await.context("Pipeline task panicked")??;

    let status = match run.status {
        RunStatus::Completed => style(run.status.as_str()).green().bold(),
        RunStatus::Partial => style(run.status.as_str()).yellow().bold(),
        _ => style(run.status.as_str()).red().bold(),
    };
    println!();
    println!("Run {} finished: {}", run.id, status);
    println!(
        "  topics: {} found, {} approved",
        run.topics_found, run.topics_approved
    );
    println!(
        "  output: {} draft articles, {} images",
        run.articles_created, run.images_generated
    );
    if let Some(error_log) = &run.error_log {
        println!("  error: {}", style(error_log).red());
    }
    Ok(())
}

/// Print recent pipeline runs — `signworks runs`.
pub async fn cmd_runs(config: SiteConfig, limit: i64) -> Result<()> {
    if !config.database.path.exists() {
        println!("No pipeline runs yet.");
        return Ok(());
    }
    let db = open_db(&config)?;
    let runs = db.call(move |store| store.list_runs(limit)).await?;
    if runs.is_empty() {
        println!("No pipeline runs yet.");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<21} {:>6} {:>9} {:>9} {:>7}",
        "id", "status", "started", "topics", "approved", "articles", "images"
    );
    for run in runs {
        let status = match run.status {
            RunStatus::Completed => style(run.status.as_str()).green(),
            RunStatus::Partial => style(run.status.as_str()).yellow(),
            RunStatus::Running => style(run.status.as_str()).cyan(),
            RunStatus::Failed => style(run.status.as_str()).red(),
        };
        println!(
            "{:<6} {:<10} {:<21} {:>6} {:>9} {:>9} {:>7}",
            run.id,
            status,
            run.started_at,
            run.topics_found,
            run.topics_approved,
            run.articles_created,
            run.images_generated
        );
    }
    Ok(())
}
