//! Progress events emitted by the pipeline.
//!
//! Every event belongs to exactly one of the four named stages or to
//! `System` (run bookkeeping). The admin endpoint frames each event as one
//! JSON object per `data:` line; the CLI renders them into progress bars.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Researcher,
    Evaluator,
    Writer,
    VisualInspector,
    System,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Evaluator => "evaluator",
            Self::Writer => "writer",
            Self::VisualInspector => "visual_inspector",
            Self::System => "system",
        }
    }

    /// Human-readable stage label for console output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Researcher => "Researcher",
            Self::Evaluator => "Evaluator",
            Self::Writer => "Writer",
            Self::VisualInspector => "Visual Inspector",
            Self::System => "System",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Started,
    Success,
    Failed,
    Info,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub run_id: i64,
    pub stage: Stage,
    pub status: EventStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_index: Option<usize>,
    pub ts: String,
}

impl PipelineEvent {
    pub fn new(
        run_id: i64,
        stage: Stage,
        status: EventStatus,
        message: impl Into<String>,
        topic_index: Option<usize>,
    ) -> Self {
        Self {
            run_id,
            stage,
            status,
            message: message.into(),
            topic_index,
            ts: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Render the event as one SSE frame: a single `data:` line carrying
    /// the JSON-encoded event, terminated by a blank line.
    pub fn sse_line(&self) -> String {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| "{\"stage\":\"system\",\"status\":\"failed\"}".to_string());
        format!("data: {}\n\n", json)
    }
}
