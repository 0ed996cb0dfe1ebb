//! The injection pass: rewrites stored post bodies with anchors for every
//! stored link rule.

use serde::Serialize;

use crate::content::store::PostPatch;
use crate::content::DbHandle;
use crate::errors::LinkingError;

use super::inject::inject_links;

#[derive(Debug, Clone, Serialize)]
pub struct PostLinkCount {
    pub post_id: i64,
    pub slug: String,
    pub injected: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub posts_scanned: usize,
    pub posts_updated: usize,
    pub links_injected: usize,
    pub per_post: Vec<PostLinkCount>,
}

/// Run the injection pass over every stored post (drafts included — a
/// draft published later should already carry its internal links).
pub async fn apply_links(db: &DbHandle) -> Result<ApplyReport, LinkingError> {
    let rules = db
        .call(|db| db.list_link_rules())
        .await
        .map_err(LinkingError::Database)?;
    if rules.is_empty() {
        return Ok(ApplyReport::default());
    }
    let posts = db
        .call(|db| db.list_posts(None))
        .await
        .map_err(LinkingError::Database)?;

    let mut report = ApplyReport::default();
    for post in posts {
        report.posts_scanned += 1;
        let self_url = format!("/blog/{}", post.slug);
        let outcome = inject_links(&post.body_html, &rules, Some(&self_url));
        if outcome.injected == 0 {
            continue;
        }

        let post_id = post.id;
        let html = outcome.html;
        db.call(move |db| {
            db.update_post(
                post_id,
                &PostPatch {
                    body_html: Some(html),
                    ..Default::default()
                },
            )
        })
        .await
        .map_err(LinkingError::Database)?;

        report.posts_updated += 1;
        report.links_injected += outcome.injected;
        report.per_post.push(PostLinkCount {
            post_id: post.id,
            slug: post.slug,
            injected: outcome.injected,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::models::RuleSource;
    use crate::content::store::NewPost;
    use crate::content::ContentStore;

    fn db_with_rule() -> DbHandle {
        let store = ContentStore::new_in_memory().unwrap();
        store
            .upsert_link_rule("channel letters", "/blog/channel-letters", &RuleSource::Manual)
            .unwrap();
        DbHandle::new(store)
    }

    #[tokio::test]
    async fn test_apply_rewrites_matching_posts() {
        let db = db_with_rule();
        let post = db
            .call(|db| {
                db.create_post(&NewPost {
                    title: "Storefront Basics".to_string(),
                    body_html: "<p>Start with channel letters.</p>".to_string(),
                    ..Default::default()
                })
            })
            .await
            .unwrap();

        let report = apply_links(&db).await.unwrap();
        assert_eq!(report.posts_scanned, 1);
        assert_eq!(report.posts_updated, 1);
        assert_eq!(report.links_injected, 1);
        assert_eq!(report.per_post[0].post_id, post.id);

        let updated = db.call(move |db| db.get_post(post.id)).await.unwrap().unwrap();
        assert!(updated.body_html.contains("<a href=\"/blog/channel-letters\">"));
    }

    #[tokio::test]
    async fn test_apply_skips_self_link() {
        let db = db_with_rule();
        db.call(|db| {
            db.create_post(&NewPost {
                title: "Channel Letters".to_string(),
                // Slug becomes channel-letters, the rule's own target.
                body_html: "<p>channel letters everywhere</p>".to_string(),
                ..Default::default()
            })
        })
        .await
        .unwrap();

        let report = apply_links(&db).await.unwrap();
        assert_eq!(report.posts_updated, 0);
        assert_eq!(report.links_injected, 0);
    }

    #[tokio::test]
    async fn test_apply_without_rules_is_a_noop() {
        let db = DbHandle::new(ContentStore::new_in_memory().unwrap());
        let report = apply_links(&db).await.unwrap();
        assert_eq!(report.posts_scanned, 0);
        assert_eq!(report.posts_updated, 0);
    }

    #[tokio::test]
    async fn test_apply_is_stable_on_second_pass() {
        let db = db_with_rule();
        db.call(|db| {
            db.create_post(&NewPost {
                title: "Guide".to_string(),
                body_html: "<p>Use channel letters.</p>".to_string(),
                ..Default::default()
            })
        })
        .await
        .unwrap();

        let first = apply_links(&db).await.unwrap();
        assert_eq!(first.links_injected, 1);
        // The keyword is now inside an anchor, so a rerun changes nothing.
        let second = apply_links(&db).await.unwrap();
        assert_eq!(second.links_injected, 0);
        assert_eq!(second.posts_updated, 0);
    }
}
