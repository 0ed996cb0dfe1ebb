//! The four-stage content pipeline: Research -> Evaluate -> Write -> Visualize.
//!
//! Stages run strictly sequentially. The run row is created first, mutated
//! by each stage, and finalized exactly once. A failure before the
//! per-topic loop aborts the run; a failure inside the loop skips that
//! topic and continues. There is no retry and no cancellation path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedSender;

use crate::content::models::{PipelineRun, PostStatus, RunStatus};
use crate::content::store::NewPost;
use crate::content::{DbHandle, slugify};
use crate::errors::PipelineError;
use crate::providers::{ImageModel, TextModel};

use super::events::{EventStatus, PipelineEvent, Stage};
use super::placeholder;
use super::prompts::{
    self, EVALUATOR_SYSTEM_PROMPT, RESEARCHER_SYSTEM_PROMPT, ScoredTopic, TopicIdea,
    WRITER_SYSTEM_PROMPT,
};

/// Tunables for one pipeline run, resolved from config at construction.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub site_name: String,
    pub topic_count: u32,
    pub min_score: i64,
    pub max_articles: usize,
}

impl From<&crate::config::SiteConfig> for PipelineTuning {
    fn from(config: &crate::config::SiteConfig) -> Self {
        Self {
            site_name: config.site.name.clone(),
            topic_count: config.pipeline.topic_count,
            min_score: config.pipeline.min_score as i64,
            max_articles: config.pipeline.max_articles as usize,
        }
    }
}

/// Single-flight guard: only one pipeline run may be active per process.
pub struct PipelineGate {
    active: AtomicBool,
}

impl PipelineGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(false),
        })
    }

    /// Try to claim the gate. The returned permit releases it on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(GatePermit(Arc::clone(self)))
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct GatePermit(Arc<PipelineGate>);

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.0.active.store(false, Ordering::SeqCst);
    }
}

/// Sends each event to the subscriber channel and persists it as an agent
/// log row. Log-write failures are reported but never fail the run.
struct Emitter {
    tx: UnboundedSender<PipelineEvent>,
    db: DbHandle,
    run_id: i64,
}

impl Emitter {
    async fn emit(
        &self,
        stage: Stage,
        status: EventStatus,
        action: &'static str,
        message: impl Into<String>,
        topic_index: Option<usize>,
    ) {
        let message = message.into();
        let event = PipelineEvent::new(self.run_id, stage, status, message.clone(), topic_index);
        let _ = self.tx.send(event);

        let run_id = self.run_id;
        let result = self
            .db
            .call(move |db| {
                db.log_agent(run_id, stage.as_str(), action, status.as_str(), &message)
            })
            .await;
        if let Err(e) = result {
            eprintln!(
                "[pipeline] run_id={}: failed to write agent log: {:#}",
                self.run_id, e
            );
        }
    }
}

/// Outcome of the stage sequence, before finalization.
struct RunSummary {
    status: RunStatus,
    error_log: Option<String>,
}

pub struct PipelineRunner {
    db: DbHandle,
    text: Arc<dyn TextModel>,
    image: Arc<dyn ImageModel>,
    tuning: PipelineTuning,
    gate: Arc<PipelineGate>,
}

impl PipelineRunner {
    pub fn new(
        db: DbHandle,
        text: Arc<dyn TextModel>,
        image: Arc<dyn ImageModel>,
        tuning: PipelineTuning,
        gate: Arc<PipelineGate>,
    ) -> Self {
        Self {
            db,
            text,
            image,
            tuning,
            gate,
        }
    }

    /// Execute one full pipeline run, emitting progress on `tx`.
    ///
    /// Creates the run row, walks the four stages, and finalizes the row
    /// exactly once — including when a stage fails, in which case the error
    /// is written to `error_log` and the run is marked failed.
    pub async fn run(
        &self,
        tx: UnboundedSender<PipelineEvent>,
    ) -> Result<PipelineRun, PipelineError> {
        let _permit = self.gate.try_acquire().ok_or(PipelineError::AlreadyRunning)?;

        let run = self
            .db
            .call(|db| db.create_run())
            .await
            .map_err(PipelineError::Database)?;
        let emitter = Emitter {
            tx,
            db: self.db.clone(),
            run_id: run.id,
        };
        emitter
            .emit(
                Stage::System,
                EventStatus::Started,
                "run",
                format!("Pipeline run {} started", run.id),
                None,
            )
            .await;

        // One catch for the whole stage sequence: stage errors become the
        // run's error_log, they never bubble past this point.
        let summary = match self.run_stages(run.id, &emitter).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(run_id = run.id, error = %e, "pipeline run failed");
                RunSummary {
                    status: RunStatus::Failed,
                    error_log: Some(e.to_string()),
                }
            }
        };

        let run_id = run.id;
        let status = summary.status.clone();
        let error_log = summary.error_log.clone();
        let finalized = self
            .db
            .call(move |db| db.finalize_run(run_id, &status, error_log.as_deref()))
            .await
            .map_err(PipelineError::Database)?;
        if !finalized {
            eprintln!("[pipeline] run_id={}: run was already finalized", run.id);
        }

        let (terminal_status, terminal_message) = match summary.status {
            RunStatus::Completed => (EventStatus::Success, "Pipeline run completed".to_string()),
            RunStatus::Partial => (
                EventStatus::Success,
                "Pipeline run finished with partial results".to_string(),
            ),
            _ => (
                EventStatus::Failed,
                format!(
                    "Pipeline run failed: {}",
                    summary.error_log.as_deref().unwrap_or("unknown error")
                ),
            ),
        };
        emitter
            .emit(Stage::System, terminal_status, "run", terminal_message, None)
            .await;

        self.db
            .call(move |db| db.get_run(run_id))
            .await
            .map_err(PipelineError::Database)?
            .ok_or(PipelineError::RunNotFound { id: run.id })
    }

    async fn run_stages(&self, run_id: i64, emitter: &Emitter) -> Result<RunSummary, PipelineError> {
        // ── Stage 1: Research ─────────────────────────────────────────
        emitter
            .emit(
                Stage::Researcher,
                EventStatus::Started,
                "research",
                format!("Researching {} candidate topics", self.tuning.topic_count),
                None,
            )
            .await;
        let raw = self
            .text
            .complete(
                RESEARCHER_SYSTEM_PROMPT,
                &prompts::researcher_prompt(&self.tuning.site_name, self.tuning.topic_count),
            )
            .await
            .map_err(|e| PipelineError::Stage {
                stage: "Researcher",
                source: e,
            })?;
        let topics = prompts::parse_topics(&raw).map_err(|e| PipelineError::Stage {
            stage: "Researcher",
            source: e,
        })?;

        let found = topics.len() as i64;
        self.db
            .call(move |db| db.update_run_counters(run_id, Some(found), None, None, None))
            .await
            .map_err(PipelineError::Database)?;

        if topics.is_empty() {
            emitter
                .emit(
                    Stage::Researcher,
                    EventStatus::Failed,
                    "research",
                    "Research produced no topics",
                    None,
                )
                .await;
            return Ok(RunSummary {
                status: RunStatus::Failed,
                error_log: Some("Research produced no topics".to_string()),
            });
        }
        emitter
            .emit(
                Stage::Researcher,
                EventStatus::Success,
                "research",
                format!("Found {} candidate topics", topics.len()),
                None,
            )
            .await;

        // ── Stage 2: Evaluate ─────────────────────────────────────────
        emitter
            .emit(
                Stage::Evaluator,
                EventStatus::Started,
                "evaluate",
                "Scoring topics against existing content",
                None,
            )
            .await;
        let existing_titles: Vec<String> = self
            .db
            .call(|db| {
                Ok(db
                    .list_posts(Some(&PostStatus::Published))?
                    .into_iter()
                    .map(|p| p.title)
                    .collect())
            })
            .await
            .map_err(PipelineError::Database)?;
        let raw = self
            .text
            .complete(
                EVALUATOR_SYSTEM_PROMPT,
                &prompts::evaluator_prompt(&topics, &existing_titles),
            )
            .await
            .map_err(|e| PipelineError::Stage {
                stage: "Evaluator",
                source: e,
            })?;
        let scores = prompts::parse_scores(&raw).map_err(|e| PipelineError::Stage {
            stage: "Evaluator",
            source: e,
        })?;

        let min_score = self.tuning.min_score;
        let approved: Vec<ScoredTopic> = scores
            .iter()
            .filter(|s| s.score >= min_score)
            .cloned()
            .collect();

        let approved_count = approved.len() as i64;
        self.db
            .call(move |db| db.update_run_counters(run_id, None, Some(approved_count), None, None))
            .await
            .map_err(PipelineError::Database)?;
        let details = serde_json::json!({ "scores": &scores });
        self.db
            .call(move |db| db.set_run_details(run_id, &details))
            .await
            .map_err(PipelineError::Database)?;

        if approved.is_empty() {
            emitter
                .emit(
                    Stage::Evaluator,
                    EventStatus::Failed,
                    "evaluate",
                    format!("No topics scored at or above {}", min_score),
                    None,
                )
                .await;
            return Ok(RunSummary {
                status: RunStatus::Partial,
                error_log: None,
            });
        }
        emitter
            .emit(
                Stage::Evaluator,
                EventStatus::Success,
                "evaluate",
                format!("Approved {} of {} topics", approved.len(), scores.len()),
                None,
            )
            .await;

        // ── Stages 3+4: Write and Visualize, per approved topic ───────
        let angles: HashMap<String, String> = topics
            .into_iter()
            .map(|t| (t.keyword.to_lowercase(), t.angle))
            .collect();

        let mut articles_created: i64 = 0;
        let mut images_generated: i64 = 0;
        let mut skipped_topics: i64 = 0;

        for (idx, scored) in approved.iter().take(self.tuning.max_articles).enumerate() {
            let topic = TopicIdea {
                keyword: scored.keyword.clone(),
                angle: angles
                    .get(&scored.keyword.to_lowercase())
                    .cloned()
                    .unwrap_or_default(),
            };

            emitter
                .emit(
                    Stage::Writer,
                    EventStatus::Started,
                    "write",
                    format!("Writing article for '{}'", topic.keyword),
                    Some(idx),
                )
                .await;
            let draft = match self.write_article(&topic).await {
                Ok(draft) => draft,
                Err(e) => {
                    emitter
                        .emit(
                            Stage::Writer,
                            EventStatus::Failed,
                            "write",
                            format!("Skipping '{}': {}", topic.keyword, e),
                            Some(idx),
                        )
                        .await;
                    skipped_topics += 1;
                    continue;
                }
            };
            emitter
                .emit(
                    Stage::Writer,
                    EventStatus::Success,
                    "write",
                    format!("Drafted '{}'", draft.title),
                    Some(idx),
                )
                .await;

            emitter
                .emit(
                    Stage::VisualInspector,
                    EventStatus::Started,
                    "visualize",
                    "Resolving image placeholders",
                    Some(idx),
                )
                .await;
            let (body_html, article_images, first_image) =
                self.resolve_placeholders(&draft.body_html, idx, emitter).await;

            let title = draft.title.clone();
            let new_post = NewPost {
                title: draft.title,
                slug: None,
                body_html,
                excerpt: draft.excerpt,
                status: Some(PostStatus::Draft),
                featured_image: first_image,
                meta_description: draft.meta_description,
            };
            let saved = self
                .db
                .call(move |db| {
                    // Re-slug on collision so a rerun of the same topic
                    // still produces a draft instead of skipping it.
                    let mut post = new_post;
                    let base_slug = slugify(&post.title, 80);
                    if db.get_post_by_slug(&base_slug)?.is_some() {
                        post.slug = Some(format!("{}-{}", base_slug, run_id));
                    }
                    db.create_post(&post)
                })
                .await;
            match saved {
                Ok(post) => {
                    articles_created += 1;
                    images_generated += article_images;
                    emitter
                        .emit(
                            Stage::VisualInspector,
                            EventStatus::Success,
                            "visualize",
                            format!("Saved draft '{}' ({} images)", post.slug, article_images),
                            Some(idx),
                        )
                        .await;
                }
                Err(e) => {
                    emitter
                        .emit(
                            Stage::VisualInspector,
                            EventStatus::Failed,
                            "visualize",
                            format!("Failed to save draft for '{}': {:#}", title, e),
                            Some(idx),
                        )
                        .await;
                    skipped_topics += 1;
                    continue;
                }
            }

            self.db
                .call(move |db| {
                    db.update_run_counters(
                        run_id,
                        None,
                        None,
                        Some(articles_created),
                        Some(images_generated),
                    )
                })
                .await
                .map_err(PipelineError::Database)?;
        }

        let details = serde_json::json!({
            "scores": &scores,
            "skipped_topics": skipped_topics,
        });
        self.db
            .call(move |db| db.set_run_details(run_id, &details))
            .await
            .map_err(PipelineError::Database)?;

        let status = if articles_created > 0 {
            RunStatus::Completed
        } else {
            RunStatus::Partial
        };
        Ok(RunSummary {
            status,
            error_log: None,
        })
    }

    async fn write_article(
        &self,
        topic: &TopicIdea,
    ) -> Result<prompts::ArticleDraft, crate::providers::ProviderError> {
        let raw = self
            .text
            .complete(
                WRITER_SYSTEM_PROMPT,
                &prompts::writer_prompt(&self.tuning.site_name, topic),
            )
            .await?;
        prompts::parse_draft(&raw)
    }

    /// Resolve every `[IMAGE: …]` marker in the body. Generation failures
    /// are swallowed: the marker is removed and the article survives.
    /// Returns the final body, the number of images embedded, and the
    /// first image URL (used as the draft's featured image).
    async fn resolve_placeholders(
        &self,
        body: &str,
        topic_index: usize,
        emitter: &Emitter,
    ) -> (String, i64, Option<String>) {
        let mut html = body.to_string();
        let mut generated: i64 = 0;
        let mut first_image: Option<String> = None;

        for ph in placeholder::extract(body) {
            match self.image.generate(&ph.prompt).await {
                Ok(url) => {
                    html = placeholder::substitute(&html, &ph.marker, &url, &ph.prompt);
                    if first_image.is_none() {
                        first_image = Some(url);
                    }
                    generated += 1;
                }
                Err(e) => {
                    emitter
                        .emit(
                            Stage::VisualInspector,
                            EventStatus::Info,
                            "visualize",
                            format!("Image generation failed, dropping placeholder: {}", e),
                            Some(topic_index),
                        )
                        .await;
                    html = placeholder::remove(&html, &ph.marker);
                }
            }
        }

        (html, generated, first_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentStore;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Text model that replays a scripted sequence of replies.
    struct ScriptedText {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    }

    impl ScriptedText {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl TextModel for ScriptedText {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::EmptyResponse))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Image model that always succeeds or always fails.
    struct FixedImage {
        result: Result<String, ProviderError>,
    }

    impl FixedImage {
        fn ok(url: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(url.to_string()),
            })
        }

        fn err() -> Arc<Self> {
            Arc::new(Self {
                result: Err(ProviderError::Timeout),
            })
        }
    }

    #[async_trait]
    impl ImageModel for FixedImage {
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.result.clone()
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn tuning() -> PipelineTuning {
        PipelineTuning {
            site_name: "Test Signs".to_string(),
            topic_count: 5,
            min_score: 70,
            max_articles: 3,
        }
    }

    fn runner(
        text: Arc<dyn TextModel>,
        image: Arc<dyn ImageModel>,
    ) -> (PipelineRunner, DbHandle) {
        let db = DbHandle::new(ContentStore::new_in_memory().unwrap());
        let runner = PipelineRunner::new(
            db.clone(),
            text,
            image,
            tuning(),
            PipelineGate::new(),
        );
        (runner, db)
    }

    fn topics_reply(keywords: &[&str]) -> String {
        let topics: Vec<serde_json::Value> = keywords
            .iter()
            .map(|k| serde_json::json!({"keyword": k, "angle": format!("angle for {}", k)}))
            .collect();
        serde_json::json!({ "topics": topics }).to_string()
    }

    fn scores_reply(scored: &[(&str, i64)]) -> String {
        let scores: Vec<serde_json::Value> = scored
            .iter()
            .map(|(k, s)| serde_json::json!({"keyword": k, "score": s, "reason": "r"}))
            .collect();
        serde_json::json!({ "scores": scores }).to_string()
    }

    fn draft_reply(title: &str, body: &str) -> String {
        serde_json::json!({
            "title": title,
            "meta_description": "meta",
            "excerpt": "excerpt",
            "body_html": body,
        })
        .to_string()
    }

    async fn collect_events(
        mut rx: tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
    ) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_empty_research_fails_run_with_zero_articles() {
        let text = ScriptedText::new(vec![Ok(r#"{"topics": []}"#.to_string())]);
        let (runner, _db) = runner(text, FixedImage::ok("https://img/1.png"));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.articles_created, 0);
        assert_eq!(run.topics_found, 0);
        assert!(run.error_log.unwrap().contains("no topics"));
        assert!(run.completed_at.is_some());

        let events = collect_events(rx).await;
        assert!(events
            .iter()
            .any(|e| e.stage == Stage::Researcher && e.status == EventStatus::Failed));
    }

    #[tokio::test]
    async fn test_zero_approved_topics_ends_partial() {
        let text = ScriptedText::new(vec![
            Ok(topics_reply(&["vinyl banners", "led retrofits"])),
            Ok(scores_reply(&[("vinyl banners", 40), ("led retrofits", 12)])),
        ]);
        let (runner, _db) = runner(text, FixedImage::ok("https://img/1.png"));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.topics_found, 2);
        assert_eq!(run.topics_approved, 0);
        assert_eq!(run.articles_created, 0);
    }

    #[tokio::test]
    async fn test_full_run_creates_draft_posts_with_images() {
        let body = "<p>Intro</p>\n[IMAGE: a lit channel letter sign]\n<p>End</p>";
        let text = ScriptedText::new(vec![
            Ok(topics_reply(&["channel letters cost", "monument permits"])),
            Ok(scores_reply(&[("channel letters cost", 90), ("monument permits", 85)])),
            Ok(draft_reply("Channel Letters Cost Guide", body)),
            Ok(draft_reply("Monument Sign Permits", body)),
        ]);
        let (runner, db) = runner(text, FixedImage::ok("https://img.example/a.png"));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.topics_found, 2);
        assert_eq!(run.topics_approved, 2);
        assert_eq!(run.articles_created, 2);
        assert_eq!(run.images_generated, 2);

        let posts = db.call(|db| db.list_posts(None)).await.unwrap();
        assert_eq!(posts.len(), 2);
        for post in &posts {
            assert_eq!(post.status, PostStatus::Draft);
            assert!(post.body_html.contains("<figure>"));
            assert!(!post.body_html.contains("[IMAGE:"));
            assert_eq!(post.featured_image.as_deref(), Some("https://img.example/a.png"));
        }

        // Every event belongs to a named stage or System, and per-topic
        // stage transitions are monotonic: one start, terminal afterwards.
        let events = collect_events(rx).await;
        for window in [Stage::Writer, Stage::VisualInspector] {
            for idx in 0..2usize {
                let series: Vec<EventStatus> = events
                    .iter()
                    .filter(|e| e.stage == window && e.topic_index == Some(idx))
                    .map(|e| e.status)
                    .collect();
                assert_eq!(
                    series.iter().filter(|s| **s == EventStatus::Started).count(),
                    1,
                    "{:?} topic {} should start exactly once",
                    window,
                    idx
                );
                let start_pos = series.iter().position(|s| *s == EventStatus::Started).unwrap();
                let terminal_pos = series
                    .iter()
                    .position(|s| matches!(s, EventStatus::Success | EventStatus::Failed))
                    .unwrap();
                assert!(start_pos < terminal_pos);
            }
        }
    }

    #[tokio::test]
    async fn test_writer_failure_skips_topic_and_continues() {
        let body = "<p>No images</p>";
        let text = ScriptedText::new(vec![
            Ok(topics_reply(&["topic a", "topic b"])),
            Ok(scores_reply(&[("topic a", 80), ("topic b", 80)])),
            Err(ProviderError::RateLimited),
            Ok(draft_reply("Topic B Article", body)),
        ]);
        let (runner, db) = runner(text, FixedImage::ok("https://img/1.png"));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.topics_approved, 2);
        assert_eq!(run.articles_created, 1);
        // articles_created + skipped_topics == topics_approved (within cap)
        let skipped = run.details.unwrap()["skipped_topics"].as_i64().unwrap();
        assert_eq!(run.articles_created + skipped, run.topics_approved);

        let posts = db.call(|db| db.list_posts(None)).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Topic B Article");

        let events = collect_events(rx).await;
        assert!(events
            .iter()
            .any(|e| e.stage == Stage::Writer
                && e.status == EventStatus::Failed
                && e.topic_index == Some(0)));
    }

    #[tokio::test]
    async fn test_image_failure_removes_placeholder_but_saves_article() {
        let body = "<p>Start</p>[IMAGE: one][IMAGE: two]<p>End</p>";
        let text = ScriptedText::new(vec![
            Ok(topics_reply(&["topic a"])),
            Ok(scores_reply(&[("topic a", 95)])),
            Ok(draft_reply("Illustrated Article", body)),
        ]);
        let (runner, db) = runner(text, FixedImage::err());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.articles_created, 1);
        assert_eq!(run.images_generated, 0);

        let posts = db.call(|db| db.list_posts(None)).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert!(!posts[0].body_html.contains("[IMAGE:"));
        assert!(!posts[0].body_html.contains("<figure>"));
        assert!(posts[0].featured_image.is_none());
    }

    #[tokio::test]
    async fn test_article_cap_bounds_the_loop() {
        let body = "<p>x</p>";
        let text = ScriptedText::new(vec![
            Ok(topics_reply(&["a", "b", "c", "d", "e"])),
            Ok(scores_reply(&[("a", 90), ("b", 90), ("c", 90), ("d", 90), ("e", 90)])),
            Ok(draft_reply("Article A", body)),
            Ok(draft_reply("Article B", body)),
            Ok(draft_reply("Article C", body)),
        ]);
        let (runner, db) = runner(text, FixedImage::ok("https://img/1.png"));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.topics_approved, 5);
        // max_articles = 3 in the test tuning
        assert_eq!(run.articles_created, 3);
        assert_eq!(db.call(|db| db.list_posts(None)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_in_research_marks_run_failed() {
        let text = ScriptedText::new(vec![Err(ProviderError::Transport("boom".to_string()))]);
        let (runner, _db) = runner(text, FixedImage::ok("https://img/1.png"));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let run = runner.run(tx).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_log.unwrap().contains("Researcher"));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_gate_rejects_concurrent_run() {
        let text = ScriptedText::new(vec![]);
        let (runner, _db) = runner(text, FixedImage::ok("https://img/1.png"));
        let _held = runner.gate.try_acquire().unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = runner.run(tx).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_every_event_has_a_known_stage() {
        let body = "<p>x</p>[IMAGE: y]";
        let text = ScriptedText::new(vec![
            Ok(topics_reply(&["a"])),
            Ok(scores_reply(&[("a", 90)])),
            Ok(draft_reply("Article A", body)),
        ]);
        let (runner, _db) = runner(text, FixedImage::err());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        runner.run(tx).await.unwrap();

        let events = collect_events(rx).await;
        assert!(!events.is_empty());
        for event in &events {
            assert!(matches!(
                event.stage,
                Stage::Researcher
                    | Stage::Evaluator
                    | Stage::Writer
                    | Stage::VisualInspector
                    | Stage::System
            ));
        }
    }
}
