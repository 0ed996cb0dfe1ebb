//! Admin panel back-end: the JSON API the content team works against.
//!
//! ## Overview
//!
//! One axum router serves entity CRUD (posts, products, portfolio
//! projects, industries, materials, pages), the settings key/value
//! surface, the internal-linking endpoints, and the pipeline trigger.
//! `POST /api/pipeline/run` answers with an SSE-style streamed body: one
//! JSON event per `data:` line until the run reaches a terminal status.
//!
//! ## Module Map
//!
//! | Module   | Responsibility                                        |
//! |----------|-------------------------------------------------------|
//! | `server` | `ServerConfig`, router assembly, bind + shutdown      |
//! | `api`    | Route handlers, `AppState`, `ApiError`                |

pub mod api;
pub mod server;

pub use api::{ApiError, AppState, SharedState};
pub use server::{ServerConfig, build_router, start_server};
