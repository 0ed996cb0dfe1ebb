//! Terminal UI helpers for the CLI commands.

pub mod progress;

pub use progress::PipelineUi;
