//! Stage prompts and typed model responses.
//!
//! Each stage sends one system + user prompt pair and expects JSON back.
//! Replies wrapped in markdown fences are unwrapped before parsing.

use serde::{Deserialize, Serialize};

use crate::providers::{ProviderError, parse_model_json};

// ── Researcher ────────────────────────────────────────────────────────

pub const RESEARCHER_SYSTEM_PROMPT: &str = r#"You are an SEO researcher for a custom-signage fabrication company. Propose blog topics that a sign buyer would search for.

You MUST respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "topics": [
    {
      "keyword": "search phrase the article targets",
      "angle": "one sentence on what the article covers"
    }
  ]
}

Rules:
- Topics must be specific to signage, fabrication, materials, installation, or permitting.
- No duplicate or near-duplicate keywords.
- Prefer question-style and comparison keywords over generic ones.
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicIdea {
    pub keyword: String,
    #[serde(default)]
    pub angle: String,
}

#[derive(Debug, Deserialize)]
struct TopicReply {
    #[serde(default)]
    topics: Vec<TopicIdea>,
}

pub fn researcher_prompt(site_name: &str, topic_count: u32) -> String {
    format!(
        "Propose {} candidate blog topics for {}.\n\nRespond with JSON only.",
        topic_count, site_name
    )
}

pub fn parse_topics(raw: &str) -> Result<Vec<TopicIdea>, ProviderError> {
    let reply: TopicReply = parse_model_json(raw)?;
    Ok(reply
        .topics
        .into_iter()
        .filter(|t| !t.keyword.trim().is_empty())
        .collect())
}

// ── Evaluator ─────────────────────────────────────────────────────────

pub const EVALUATOR_SYSTEM_PROMPT: &str = r#"You score proposed blog topics for a custom-signage fabrication company.

You MUST respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "scores": [
    {
      "keyword": "the topic keyword, unchanged",
      "score": 0,
      "reason": "one sentence"
    }
  ]
}

Rules:
- score is an integer 0-100: search intent fit, buyer relevance, and novelty against the existing articles listed.
- Score near-duplicates of existing articles below 30.
- Return every topic you were given, each exactly once.
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredTopic {
    pub keyword: String,
    pub score: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    #[serde(default)]
    scores: Vec<ScoredTopic>,
}

pub fn evaluator_prompt(topics: &[TopicIdea], existing_titles: &[String]) -> String {
    let topic_lines = topics
        .iter()
        .map(|t| format!("- {} ({})", t.keyword, t.angle))
        .collect::<Vec<_>>()
        .join("\n");
    let existing = if existing_titles.is_empty() {
        "(none yet)".to_string()
    } else {
        existing_titles
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "## Proposed topics\n{}\n\n## Existing published articles\n{}\n\nScore every proposed topic. Respond with JSON only.",
        topic_lines, existing
    )
}

pub fn parse_scores(raw: &str) -> Result<Vec<ScoredTopic>, ProviderError> {
    let reply: ScoreReply = parse_model_json(raw)?;
    Ok(reply.scores)
}

// ── Writer ────────────────────────────────────────────────────────────

pub const WRITER_SYSTEM_PROMPT: &str = r#"You write blog articles for a custom-signage fabrication company. Practical, concrete, no filler.

You MUST respond with valid JSON only (no markdown fences around the JSON, no explanation) matching this schema:
{
  "title": "article title",
  "meta_description": "under 160 characters",
  "excerpt": "two sentence summary",
  "body_html": "<p>…</p>"
}

Rules:
- body_html is clean HTML: p, h2, h3, ul, ol, li, strong, em only.
- Where an illustration would help, insert an inline marker on its own line:
  [IMAGE: detailed prompt for the illustration]
- Use at most 2 image markers per article.
- 800-1200 words.
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub excerpt: String,
    pub body_html: String,
}

pub fn writer_prompt(site_name: &str, topic: &TopicIdea) -> String {
    format!(
        "Write an article for {}.\n\nTarget keyword: {}\nAngle: {}\n\nRespond with JSON only.",
        site_name, topic.keyword, topic.angle
    )
}

pub fn parse_draft(raw: &str) -> Result<ArticleDraft, ProviderError> {
    let draft: ArticleDraft = parse_model_json(raw)?;
    if draft.title.trim().is_empty() || draft.body_html.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(draft)
}

// ── Keyword extraction (internal linking) ─────────────────────────────

pub const KEYWORD_SYSTEM_PROMPT: &str = r#"You extract linkable keywords from web content for a custom-signage fabrication company.

You MUST respond with valid JSON only (no markdown, no explanation) matching this schema:
{
  "keywords": ["two to four word phrase", "..."]
}

Rules:
- Keywords must appear verbatim in the content (case-insensitive).
- Prefer product and material phrases a reader would click ("channel letters", "ada signage").
- No single generic words ("sign", "business").
"#;

#[derive(Debug, Deserialize)]
struct KeywordReply {
    #[serde(default)]
    keywords: Vec<String>,
}

pub fn keyword_prompt(title: &str, body: &str, max_keywords: u32) -> String {
    format!(
        "Extract up to {} linkable keywords.\n\n## Title\n{}\n\n## Content\n{}\n\nRespond with JSON only.",
        max_keywords,
        title,
        body.chars().take(6000).collect::<String>()
    )
}

pub fn parse_keywords(raw: &str) -> Result<Vec<String>, ProviderError> {
    let reply: KeywordReply = parse_model_json(raw)?;
    Ok(reply
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topics_from_fenced_reply() {
        let raw = "Sure, here are the topics:\n```json\n{\"topics\": [\n  {\"keyword\": \"channel letters cost\", \"angle\": \"price factors\"},\n  {\"keyword\": \"monument sign permits\", \"angle\": \"permitting walkthrough\"}\n]}\n```";
        let topics = parse_topics(raw).unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].keyword, "channel letters cost");
    }

    #[test]
    fn test_parse_topics_drops_blank_keywords() {
        let raw = r#"{"topics": [{"keyword": "  ", "angle": "x"}, {"keyword": "real one", "angle": ""}]}"#;
        let topics = parse_topics(raw).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].keyword, "real one");
    }

    #[test]
    fn test_parse_topics_empty_object_is_empty_list() {
        assert!(parse_topics("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_scores() {
        let raw = r#"{"scores": [{"keyword": "a", "score": 82, "reason": "strong intent"}, {"keyword": "b", "score": 12, "reason": "duplicate"}]}"#;
        let scores = parse_scores(raw).unwrap();
        assert_eq!(scores[0].score, 82);
        assert_eq!(scores[1].keyword, "b");
    }

    #[test]
    fn test_parse_draft_requires_title_and_body() {
        let raw = r#"{"title": "", "body_html": "<p>x</p>"}"#;
        assert!(parse_draft(raw).is_err());

        let raw = r#"{"title": "Good", "meta_description": "m", "excerpt": "e", "body_html": "<p>x</p>"}"#;
        let draft = parse_draft(raw).unwrap();
        assert_eq!(draft.title, "Good");
    }

    #[test]
    fn test_parse_draft_invalid_json() {
        assert!(parse_draft("no json here").is_err());
    }

    #[test]
    fn test_parse_keywords_trims_and_filters() {
        let raw = r#"{"keywords": [" channel letters ", "", "ada signage"]}"#;
        let keywords = parse_keywords(raw).unwrap();
        assert_eq!(keywords, vec!["channel letters", "ada signage"]);
    }

    #[test]
    fn test_evaluator_prompt_lists_existing_titles() {
        let topics = vec![TopicIdea {
            keyword: "vinyl banners".to_string(),
            angle: "durability".to_string(),
        }];
        let prompt = evaluator_prompt(&topics, &["Old article".to_string()]);
        assert!(prompt.contains("vinyl banners"));
        assert!(prompt.contains("Old article"));

        let prompt_empty = evaluator_prompt(&topics, &[]);
        assert!(prompt_empty.contains("(none yet)"));
    }
}
