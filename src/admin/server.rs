use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use tower_http::cors::CorsLayer;

use crate::config::SiteConfig;
use crate::content::{ContentStore, DbHandle};
use crate::pipeline::PipelineGate;

use super::api::{self, AppState};

/// Configuration for the admin API server.
pub struct ServerConfig {
    pub port: u16,
    pub config: SiteConfig,
    pub dev_mode: bool,
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/", get(service_info))
        .with_state(state)
}

async fn service_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "signworks",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Start the admin API server.
pub async fn start_server(server_config: ServerConfig) -> Result<()> {
    let db_path = server_config.config.database.path.clone();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store = ContentStore::new(&db_path).context("Failed to initialize content database")?;

    let state = Arc::new(AppState {
        db: DbHandle::new(store),
        config: server_config.config,
        gate: PipelineGate::new(),
        models: None,
    });

    let mut app = build_router(state);
    if server_config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server_config.dev_mode {
        "0.0.0.0"
    } else {
        "127.0.0.1"
    };
    let addr = format!("{}:{}", host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    println!("signworks admin API running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    println!("\nShutting down...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ImageModel, ProviderError, TextModel};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Text model returning the same reply for every call.
    struct FixedText {
        reply: String,
    }

    #[async_trait]
    impl TextModel for FixedText {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.reply.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FixedImage;

    #[async_trait]
    impl ImageModel for FixedImage {
        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok("https://img.example/fixed.png".to_string())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn test_state(text_reply: &str) -> Arc<AppState> {
        let store = ContentStore::new_in_memory().unwrap();
        Arc::new(AppState {
            db: DbHandle::new(store),
            config: SiteConfig::default(),
            gate: PipelineGate::new(),
            models: Some((
                Arc::new(FixedText {
                    reply: text_reply.to_string(),
                }),
                Arc::new(FixedImage),
            )),
        })
    }

    fn test_router() -> Router {
        build_router(test_state(r#"{"topics": []}"#))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_service_info_at_root() {
        let app = test_router();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["service"], "signworks");
    }

    #[tokio::test]
    async fn test_post_crud_round_trip() {
        let app = test_router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/posts")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"title": "Wayfinding 101", "body_html": "<p>maps</p>"})
                    .to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        assert_eq!(created["slug"], "wayfinding-101");
        assert_eq!(created["status"], "draft");
        let id = created["id"].as_i64().unwrap();

        // Patch the title
        let req = Request::builder()
            .method("PATCH")
            .uri(format!("/api/posts/{}", id))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"title": "Wayfinding Basics"}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["title"], "Wayfinding Basics");

        // Publish
        let req = Request::builder()
            .method("POST")
            .uri(format!("/api/posts/{}/publish", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await["status"], "published");

        // Filtered list
        let req = Request::builder()
            .uri("/api/posts?status=published")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let list = body_json(resp).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        // Delete
        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/posts/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = Request::builder()
            .uri(format!("/api/posts/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_posts_rejects_bad_status_filter() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/posts?status=archived")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_product_and_page_endpoints_mounted() {
        let app = test_router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/products")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"name": "Blade Sign", "description": "projecting sign"})
                    .to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = Request::builder()
            .method("POST")
            .uri("/api/pages")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"title": "Contact", "body_html": "<p>call us</p>"}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = Request::builder()
            .uri("/api/products")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let app = test_router();

        let req = Request::builder()
            .uri("/api/settings/ai_provider")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = Request::builder()
            .method("PUT")
            .uri("/api/settings/ai_provider")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({"value": "gemini"}).to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/api/settings/ai_provider")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await["value"], "gemini");
    }

    #[tokio::test]
    async fn test_pipeline_run_streams_events_and_persists_run() {
        // Researcher returns no topics: the run fails fast, which makes the
        // stream finite and the terminal state deterministic.
        let app = build_router(test_state(r#"{"topics": []}"#));

        let req = Request::builder()
            .method("POST")
            .uri("/api/pipeline/run")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<serde_json::Value> = body
            .lines()
            .filter(|l| l.starts_with("data: "))
            .map(|l| serde_json::from_str(l.trim_start_matches("data: ")).unwrap())
            .collect();
        assert!(!events.is_empty());
        assert!(events
            .iter()
            .any(|e| e["stage"] == "researcher" && e["status"] == "failed"));
        assert!(events
            .iter()
            .all(|e| ["researcher", "evaluator", "writer", "visual_inspector", "system"]
                .contains(&e["stage"].as_str().unwrap())));

        // The run row is terminal with zero articles.
        let req = Request::builder()
            .uri("/api/pipeline/runs")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let runs = body_json(resp).await;
        assert_eq!(runs.as_array().unwrap().len(), 1);
        assert_eq!(runs[0]["status"], "failed");
        assert_eq!(runs[0]["articles_created"], 0);

        // Detail endpoint carries the agent logs.
        let run_id = runs[0]["id"].as_i64().unwrap();
        let req = Request::builder()
            .uri(format!("/api/pipeline/runs/{}", run_id))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let detail = body_json(resp).await;
        assert!(!detail["logs"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_run_conflicts_while_active() {
        let state = test_state(r#"{"topics": []}"#);
        let _held = state.gate.try_acquire().unwrap();
        let app = build_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/api/pipeline/run")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_link_rule_endpoints_and_apply() {
        let app = test_router();

        // Seed a post to inject into.
        let req = Request::builder()
            .method("POST")
            .uri("/api/posts")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"title": "Guide", "body_html": "<p>Get channel letters now.</p>"}).to_string(),
            ))
            .unwrap();
        app.clone().oneshot(req).await.unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/api/links/rules")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"keyword": "channel letters", "url": "/products/channel-letters"}).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = Request::builder()
            .method("POST")
            .uri("/api/links/apply")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["posts_updated"], 1);
        assert_eq!(report["links_injected"], 1);

        let req = Request::builder()
            .uri("/api/links/rules")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rule_requires_keyword_and_url() {
        let app = test_router();
        let req = Request::builder()
            .method("POST")
            .uri("/api/links/rules")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"keyword": " ", "url": "/x"}).to_string(),
            ))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
