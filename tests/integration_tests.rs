//! Integration tests for the signworks CLI.
//!
//! These drive the compiled binary end to end against temporary project
//! directories. Anything that needs a live model provider is covered by
//! unit tests with scripted models instead.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a signworks Command
fn signworks() -> Command {
    cargo_bin_cmd!("signworks")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to initialize a signworks project in a temp directory
fn init_project(dir: &TempDir) {
    signworks()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        signworks().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        signworks().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        signworks()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized signworks project"));

        assert!(dir.path().join("signworks.toml").exists());
        assert!(dir.path().join(".signworks/site.db").exists());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        init_project(&dir);

        signworks()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_runs_before_init() {
        let dir = create_temp_project();

        signworks()
            .current_dir(dir.path())
            .arg("runs")
            .assert()
            .success()
            .stdout(predicate::str::contains("No pipeline runs yet"));
    }

    #[test]
    fn test_runs_after_init_is_empty() {
        let dir = create_temp_project();
        init_project(&dir);

        signworks()
            .current_dir(dir.path())
            .arg("runs")
            .assert()
            .success()
            .stdout(predicate::str::contains("No pipeline runs yet"));
    }
}

// =============================================================================
// Pipeline / Linking CLI Tests
// =============================================================================

mod pipeline_cli {
    use super::*;

    #[test]
    fn test_pipeline_without_api_key_fails_cleanly() {
        let dir = create_temp_project();
        init_project(&dir);

        signworks()
            .current_dir(dir.path())
            .env_remove("OPENAI_API_KEY")
            .env_remove("GEMINI_API_KEY")
            .args(["pipeline", "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("AI provider not available"));
    }

    #[test]
    fn test_link_extract_without_api_key_fails_cleanly() {
        let dir = create_temp_project();
        init_project(&dir);

        signworks()
            .current_dir(dir.path())
            .env_remove("OPENAI_API_KEY")
            .env_remove("GEMINI_API_KEY")
            .args(["link", "extract"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("AI provider not available"));
    }

    #[test]
    fn test_link_apply_with_no_rules_is_a_noop() {
        let dir = create_temp_project();
        init_project(&dir);

        signworks()
            .current_dir(dir.path())
            .args(["link", "apply", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to do"));
    }

    #[test]
    fn test_config_flag_points_at_alternate_file() {
        let dir = create_temp_project();
        let config_path = dir.path().join("alt.toml");

        signworks()
            .current_dir(dir.path())
            .args(["--config", "alt.toml", "init"])
            .assert()
            .success();
        assert!(config_path.exists());
    }
}
