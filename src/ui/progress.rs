use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::pipeline::{EventStatus, PipelineEvent, Stage};

/// Terminal UI for a headless pipeline run, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Stage bar — spinner showing the active stage and its latest message
/// - Article bar — articles saved against the per-run cap
pub struct PipelineUi {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    article_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUi {
    pub fn new(max_articles: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let stage_bar = multi.add(ProgressBar::new_spinner());
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("   Stage");
        stage_bar.enable_steady_tick(std::time::Duration::from_millis(120));

        let article_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let article_bar = multi.add(ProgressBar::new(max_articles));
        article_bar.set_style(article_style);
        article_bar.set_prefix("Articles");

        Self {
            multi,
            stage_bar,
            article_bar,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to `eprintln!` if the
    /// rich UI fails.
    fn println(&self, line: String) {
        if self.multi.println(&line).is_err() {
            eprintln!("{}", line);
        }
    }

    pub fn on_event(&self, event: &PipelineEvent) {
        let label = event.stage.label();
        match event.status {
            EventStatus::Started => {
                self.stage_bar.set_message(format!("{}: {}", label, event.message));
            }
            EventStatus::Success => {
                if event.stage == Stage::VisualInspector {
                    self.article_bar.inc(1);
                }
                self.println(format!(
                    "{} {} — {}",
                    style("✓").green().bold(),
                    label,
                    event.message
                ));
            }
            EventStatus::Failed => {
                self.println(format!(
                    "{} {} — {}",
                    style("✗").red().bold(),
                    label,
                    event.message
                ));
            }
            EventStatus::Info => {
                if self.verbose {
                    self.println(format!("  {} — {}", label, event.message));
                }
            }
        }
    }

    pub fn finish(&self) {
        self.stage_bar.finish_and_clear();
        self.article_bar.finish();
    }
}
