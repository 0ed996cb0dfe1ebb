//! Internal linking: extract linkable keywords per content item with the
//! text model, store keyword -> URL rules, then inject anchors into post
//! bodies with a regex pass.

pub mod apply;
pub mod extract;
pub mod inject;

pub use apply::{ApplyReport, apply_links};
pub use extract::{ExtractReport, KeywordExtractor};
pub use inject::{InjectionOutcome, inject_links};
