//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled            |
//! |------------|-----------------------------|
//! | `project`  | `Init`                      |
//! | `serve`    | `Serve`                     |
//! | `pipeline` | `Pipeline`, `Runs`          |
//! | `link`     | `Link` (`extract`, `apply`) |

pub mod link;
pub mod pipeline;
pub mod project;
pub mod serve;

pub use link::{cmd_link_apply, cmd_link_extract};
pub use pipeline::{cmd_pipeline, cmd_runs};
pub use project::cmd_init;
pub use serve::cmd_serve;
