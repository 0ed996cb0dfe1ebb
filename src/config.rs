//! Configuration for the signworks backend.
//!
//! Settings are read from `signworks.toml` in the working directory (or a
//! path given with `--config`), then layered with environment variables and
//! CLI flags: file -> environment -> CLI, last writer wins.
//!
//! # Configuration File Format
//!
//! ```toml
//! [site]
//! name = "Summit Signs & Fabrication"
//! base_url = "https://example.com"
//!
//! [database]
//! path = ".signworks/site.db"
//!
//! [pipeline]
//! topic_count = 10
//! min_score = 70
//! max_articles = 3
//! keywords_per_item = 5
//!
//! [ai]
//! provider = "openai"
//! openai_model = "gpt-4o"
//! gemini_model = "gemini-2.0-flash"
//! image_model = "dall-e-3"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `[ai].provider`.
const ENV_PROVIDER: &str = "SIGNWORKS_PROVIDER";
/// Environment variable overriding `[database].path`.
const ENV_DB_PATH: &str = "SIGNWORKS_DB_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub ai: AiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSection {
    /// Display name used in generated prompts ("write for <name>...").
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Canonical site origin; link rules store paths relative to this.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Number of candidate topics requested from the Researcher.
    #[serde(default = "default_topic_count")]
    pub topic_count: u32,
    /// Minimum Evaluator score (0-100) for a topic to be approved.
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    /// Per-run cap on articles written.
    #[serde(default = "default_max_articles")]
    pub max_articles: u32,
    /// Keywords requested per content item during link extraction.
    #[serde(default = "default_keywords_per_item")]
    pub keywords_per_item: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSection {
    /// Text/image provider: "openai" or "gemini". The `ai_provider` settings
    /// row in the database takes precedence over this value.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
}

fn default_site_name() -> String {
    "Summit Signs & Fabrication".to_string()
}

fn default_base_url() -> String {
    "https://example.com".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".signworks/site.db")
}

fn default_topic_count() -> u32 {
    10
}

fn default_min_score() -> u32 {
    70
}

fn default_max_articles() -> u32 {
    3
}

fn default_keywords_per_item() -> u32 {
    5
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            base_url: default_base_url(),
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            topic_count: default_topic_count(),
            min_score: default_min_score(),
            max_articles: default_max_articles(),
            keywords_per_item: default_keywords_per_item(),
        }
    }
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            openai_model: default_openai_model(),
            gemini_model: default_gemini_model(),
            image_model: default_image_model(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from the given file, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from `signworks.toml` in the current directory.
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new("signworks.toml"))
    }

    fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var(ENV_PROVIDER)
            && !provider.is_empty()
        {
            self.ai.provider = provider;
        }
        if let Ok(db_path) = std::env::var(ENV_DB_PATH)
            && !db_path.is_empty()
        {
            self.database.path = PathBuf::from(db_path);
        }
    }

    /// Serialize the default configuration as a commented starter file.
    pub fn starter_toml() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let config = SiteConfig::load(&dir.path().join("signworks.toml")).unwrap();
        assert_eq!(config.pipeline.topic_count, 10);
        assert_eq!(config.pipeline.min_score, 70);
        assert_eq!(config.pipeline.max_articles, 3);
        assert_eq!(config.ai.provider, "openai");
        assert_eq!(config.database.path, PathBuf::from(".signworks/site.db"));
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signworks.toml");
        fs::write(
            &path,
            "[pipeline]\nmin_score = 55\n\n[ai]\nprovider = \"gemini\"\n",
        )
        .unwrap();
        let config = SiteConfig::load(&path).unwrap();
        assert_eq!(config.pipeline.min_score, 55);
        assert_eq!(config.pipeline.topic_count, 10);
        assert_eq!(config.ai.provider, "gemini");
        assert_eq!(config.ai.openai_model, "gpt-4o");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signworks.toml");
        fs::write(&path, "not [valid toml").unwrap();
        assert!(SiteConfig::load(&path).is_err());
    }

    #[test]
    fn test_starter_toml_round_trips() {
        let raw = SiteConfig::starter_toml();
        let parsed: SiteConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.pipeline.max_articles, 3);
        assert_eq!(parsed.site.base_url, "https://example.com");
    }
}
