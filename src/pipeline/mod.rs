//! AI content pipeline — the sequential four-stage workflow that turns
//! keyword research into draft blog posts.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐  POST /api/pipeline/run   ┌────────────────────────────────────┐
//! │  Client  │ ────────────────────────> │  admin::api  (streams events back) │
//! └──────────┘  data: {json}\n\n lines   │        │                           │
//!                                        │        │ PipelineRunner::run()     │
//!                                        │        v                           │
//!                                        │  runner.rs  (stages, run rows,     │
//!                                        │              single-flight gate)   │
//!                                        │        │                           │
//!                                        │        │ TextModel / ImageModel    │
//!                                        │        v                           │
//!                                        │  providers::{openai, gemini}       │
//!                                        └────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module        | Responsibility                                     |
//! |---------------|-----------------------------------------------------|
//! | `events`      | `PipelineEvent`, stage/status enums, SSE framing    |
//! | `prompts`     | Stage prompt templates + typed reply parsing        |
//! | `placeholder` | `[IMAGE: …]` marker extraction and substitution     |

pub mod events;
pub mod placeholder;
pub mod prompts;
pub mod runner;

pub use events::{EventStatus, PipelineEvent, Stage};
pub use runner::{PipelineGate, PipelineRunner, PipelineTuning};
