//! Keyword extraction: asks the text model for linkable phrases per
//! content item and stores them as link rules targeting that item's URL.

use std::sync::Arc;

use crate::content::models::{PostStatus, RuleSource};
use crate::content::DbHandle;
use crate::errors::LinkingError;
use crate::pipeline::prompts::{KEYWORD_SYSTEM_PROMPT, keyword_prompt, parse_keywords};
use crate::providers::TextModel;

/// One linkable content item (post, product, or page).
#[derive(Debug, Clone)]
struct LinkTarget {
    title: String,
    body: String,
    url: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExtractReport {
    pub items_processed: usize,
    pub rules_created: usize,
    pub items_failed: usize,
}

pub struct KeywordExtractor {
    db: DbHandle,
    text: Arc<dyn TextModel>,
    keywords_per_item: u32,
}

impl KeywordExtractor {
    pub fn new(db: DbHandle, text: Arc<dyn TextModel>, keywords_per_item: u32) -> Self {
        Self {
            db,
            text,
            keywords_per_item,
        }
    }

    /// Walk every published post, product, and page; extraction failures
    /// for one item are logged and skipped, the batch continues.
    pub async fn run(&self) -> Result<ExtractReport, LinkingError> {
        let targets = self
            .db
            .call(|db| {
                let mut targets = Vec::new();
                for post in db.list_posts(Some(&PostStatus::Published))? {
                    targets.push(LinkTarget {
                        title: post.title,
                        body: post.body_html,
                        url: format!("/blog/{}", post.slug),
                    });
                }
                for product in db.list_products()? {
                    targets.push(LinkTarget {
                        title: product.name,
                        body: product.description,
                        url: format!("/products/{}", product.slug),
                    });
                }
                for page in db.list_pages()? {
                    targets.push(LinkTarget {
                        title: page.title,
                        body: page.body_html,
                        url: format!("/{}", page.slug),
                    });
                }
                Ok(targets)
            })
            .await
            .map_err(LinkingError::Database)?;

        let mut report = ExtractReport::default();
        for target in targets {
            report.items_processed += 1;
            let prompt = keyword_prompt(&target.title, &target.body, self.keywords_per_item);
            let keywords = match self.text.complete(KEYWORD_SYSTEM_PROMPT, &prompt).await {
                Ok(raw) => match parse_keywords(&raw) {
                    Ok(keywords) => keywords,
                    Err(e) => {
                        tracing::warn!(item = %target.title, error = %e, "keyword parse failed, skipping item");
                        report.items_failed += 1;
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!(item = %target.title, error = %e, "keyword extraction failed, skipping item");
                    report.items_failed += 1;
                    continue;
                }
            };

            let url = target.url.clone();
            let limit = self.keywords_per_item as usize;
            let created = self
                .db
                .call(move |db| {
                    let mut created = 0usize;
                    for keyword in keywords.into_iter().take(limit) {
                        db.upsert_link_rule(&keyword, &url, &RuleSource::Extracted)?;
                        created += 1;
                    }
                    Ok(created)
                })
                .await
                .map_err(LinkingError::Database)?;
            report.rules_created += created;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::store::NewPost;
    use crate::content::ContentStore;
    use crate::providers::ProviderError;
    use async_trait::async_trait;

    struct FixedText {
        reply: Result<String, ProviderError>,
    }

    #[async_trait]
    impl TextModel for FixedText {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            self.reply.clone()
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn seeded_db() -> DbHandle {
        let store = ContentStore::new_in_memory().unwrap();
        let post = store
            .create_post(&NewPost {
                title: "Channel Letters Guide".to_string(),
                body_html: "<p>All about channel letters</p>".to_string(),
                ..Default::default()
            })
            .unwrap();
        store.publish_post(post.id).unwrap();
        store
            .create_product("Monument Sign", "Stone base sign", None, "", None)
            .unwrap();
        DbHandle::new(store)
    }

    #[tokio::test]
    async fn test_extract_creates_rules_for_each_item() {
        let db = seeded_db();
        let text = Arc::new(FixedText {
            reply: Ok(r#"{"keywords": ["channel letters", "sign permits"]}"#.to_string()),
        });
        let extractor = KeywordExtractor::new(db.clone(), text, 5);

        let report = extractor.run().await.unwrap();
        assert_eq!(report.items_processed, 2);
        assert_eq!(report.items_failed, 0);
        assert_eq!(report.rules_created, 4);

        // Both items returned the same keywords, so the second upsert wins.
        let rules = db.call(|db| db.list_link_rules()).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.url == "/products/monument-sign"));
    }

    #[tokio::test]
    async fn test_extract_failure_skips_item_and_continues() {
        let db = seeded_db();
        let text = Arc::new(FixedText {
            reply: Err(ProviderError::RateLimited),
        });
        let extractor = KeywordExtractor::new(db.clone(), text, 5);

        let report = extractor.run().await.unwrap();
        assert_eq!(report.items_processed, 2);
        assert_eq!(report.items_failed, 2);
        assert_eq!(report.rules_created, 0);
        assert!(db.call(|db| db.list_link_rules()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draft_posts_are_not_link_targets() {
        let store = ContentStore::new_in_memory().unwrap();
        store
            .create_post(&NewPost {
                title: "Unpublished".to_string(),
                ..Default::default()
            })
            .unwrap();
        let db = DbHandle::new(store);
        let text = Arc::new(FixedText {
            reply: Ok(r#"{"keywords": ["anything"]}"#.to_string()),
        });
        let extractor = KeywordExtractor::new(db, text, 5);

        let report = extractor.run().await.unwrap();
        assert_eq!(report.items_processed, 0);
    }
}
