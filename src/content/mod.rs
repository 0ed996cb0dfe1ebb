//! Content domain: entities for the marketing site plus the SQLite store
//! behind the admin API and the pipeline.

pub mod models;
pub mod store;

pub use models::*;
pub use store::{ContentStore, DbHandle, NewPost, PostPatch};
