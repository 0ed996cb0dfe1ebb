use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::config::SiteConfig;
use crate::content::models::PostStatus;
use crate::content::store::{NewPost, PostPatch};
use crate::content::DbHandle;
use crate::linking::{KeywordExtractor, apply_links};
use crate::pipeline::{PipelineGate, PipelineRunner, PipelineTuning};
use crate::providers::{ImageModel, TextModel, active_provider, build_models};

// ── Shared application state ──────────────────────────────────────────

pub type ModelPair = (Arc<dyn TextModel>, Arc<dyn ImageModel>);

pub struct AppState {
    pub db: DbHandle,
    pub config: SiteConfig,
    pub gate: Arc<PipelineGate>,
    /// Injected models (tests); `None` resolves the configured provider
    /// per request so a changed `ai_provider` setting takes effect on the
    /// next run without a restart.
    pub models: Option<ModelPair>,
}

pub type SharedState = Arc<AppState>;

async fn resolve_models(state: &AppState) -> Result<ModelPair, ApiError> {
    if let Some(pair) = &state.models {
        return Ok(pair.clone());
    }
    let provider = active_provider(&state.db, &state.config.ai).await;
    build_models(provider, &state.config.ai)
        .map_err(|e| ApiError::BadRequest(format!("AI provider not available: {}", e)))
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub material: Option<String>,
    #[serde(default)]
    pub price_note: String,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub material: Option<String>,
    pub price_note: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub summary: String,
    pub image_url: Option<String>,
    pub industry_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub client: Option<String>,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub industry_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateNamedRequest {
    pub name: String,
    #[serde(default)]
    pub blurb: String,
}

#[derive(Deserialize)]
pub struct UpdateNamedRequest {
    pub name: Option<String>,
    pub blurb: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePageRequest {
    pub title: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub body_html: String,
}

#[derive(Deserialize)]
pub struct UpdatePageRequest {
    pub title: Option<String>,
    pub body_html: Option<String>,
}

#[derive(Deserialize)]
pub struct SettingValue {
    pub value: String,
}

#[derive(Deserialize)]
pub struct CreateRuleRequest {
    pub keyword: String,
    pub url: String,
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::Internal(e.to_string())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/{id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/api/posts/{id}/publish", post(publish_post))
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/{id}",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/api/industries", get(list_industries).post(create_industry))
        .route(
            "/api/industries/{id}",
            get(get_industry).patch(update_industry).delete(delete_industry),
        )
        .route("/api/materials", get(list_materials).post(create_material))
        .route(
            "/api/materials/{id}",
            get(get_material).patch(update_material).delete(delete_material),
        )
        .route("/api/pages", get(list_pages).post(create_page))
        .route(
            "/api/pages/{id}",
            get(get_page).patch(update_page).delete(delete_page),
        )
        .route(
            "/api/settings/{key}",
            get(get_setting).put(put_setting).delete(delete_setting),
        )
        .route("/api/pipeline/run", post(run_pipeline))
        .route("/api/pipeline/runs", get(list_runs))
        .route("/api/pipeline/runs/{id}", get(get_run))
        .route("/api/links/rules", get(list_rules).post(create_rule))
        .route("/api/links/rules/{id}", axum::routing::delete(delete_rule))
        .route("/api/links/extract", post(extract_keywords))
        .route("/api/links/apply", post(apply_link_rules))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

// Posts

async fn list_posts(
    State(state): State<SharedState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            raw.parse::<PostStatus>()
                .map_err(ApiError::BadRequest)?,
        ),
        None => None,
    };
    let posts = state
        .db
        .call(move |db| db.list_posts(status.as_ref()))
        .await
        .map_err(internal)?;
    Ok(Json(posts))
}

async fn create_post(
    State(state): State<SharedState>,
    Json(req): Json<NewPost>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Post title must not be empty".into()));
    }
    let post = state
        .db
        .call(move |db| db.create_post(&req))
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .db
        .call(move |db| db.get_post(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Post {} not found", id)))?;
    Ok(Json(post))
}

async fn update_post(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(patch): Json<PostPatch>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_post_exists(&state, id).await?;
    let post = state
        .db
        .call(move |db| db.update_post(id, &patch))
        .await
        .map_err(internal)?;
    Ok(Json(post))
}

async fn publish_post(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_post_exists(&state, id).await?;
    let post = state
        .db
        .call(move |db| db.publish_post(id))
        .await
        .map_err(internal)?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_post(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Post {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_post_exists(state: &SharedState, id: i64) -> Result<(), ApiError> {
    state
        .db
        .call(move |db| db.get_post(id))
        .await
        .map_err(internal)?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound(format!("Post {} not found", id)))
}

// Products

async fn list_products(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .db
        .call(|db| db.list_products())
        .await
        .map_err(internal)?;
    Ok(Json(products))
}

async fn create_product(
    State(state): State<SharedState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .db
        .call(move |db| {
            db.create_product(
                &req.name,
                &req.description,
                req.material.as_deref(),
                &req.price_note,
                req.image_url.as_deref(),
            )
        })
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .db
        .call(move |db| db.get_product(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Product {} not found", id)))?;
    Ok(Json(product))
}

async fn update_product(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.get_product(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Product {} not found", id)))?;
    let product = state
        .db
        .call(move |db| {
            db.update_product(
                id,
                req.name.as_deref(),
                req.description.as_deref(),
                req.material.as_deref(),
                req.price_note.as_deref(),
                req.image_url.as_deref(),
            )
        })
        .await
        .map_err(internal)?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_product(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Product {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Projects (portfolio)

async fn list_projects(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let projects = state
        .db
        .call(|db| db.list_projects())
        .await
        .map_err(internal)?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| {
            db.create_project(
                &req.title,
                &req.client,
                &req.summary,
                req.image_url.as_deref(),
                req.industry_id,
            )
        })
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .db
        .call(move |db| db.get_project(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", id)))?;
    Ok(Json(project))
}

async fn update_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.get_project(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", id)))?;
    let project = state
        .db
        .call(move |db| {
            db.update_project(
                id,
                req.title.as_deref(),
                req.client.as_deref(),
                req.summary.as_deref(),
                req.image_url.as_deref(),
                req.industry_id,
            )
        })
        .await
        .map_err(internal)?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_project(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Project {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Industries

async fn list_industries(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let industries = state
        .db
        .call(|db| db.list_industries())
        .await
        .map_err(internal)?;
    Ok(Json(industries))
}

async fn create_industry(
    State(state): State<SharedState>,
    Json(req): Json<CreateNamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let industry = state
        .db
        .call(move |db| db.create_industry(&req.name, &req.blurb))
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(industry)))
}

async fn get_industry(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let industry = state
        .db
        .call(move |db| db.get_industry(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Industry {} not found", id)))?;
    Ok(Json(industry))
}

async fn update_industry(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateNamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.get_industry(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Industry {} not found", id)))?;
    let industry = state
        .db
        .call(move |db| db.update_industry(id, req.name.as_deref(), req.blurb.as_deref()))
        .await
        .map_err(internal)?;
    Ok(Json(industry))
}

async fn delete_industry(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_industry(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Industry {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Materials

async fn list_materials(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let materials = state
        .db
        .call(|db| db.list_materials())
        .await
        .map_err(internal)?;
    Ok(Json(materials))
}

async fn create_material(
    State(state): State<SharedState>,
    Json(req): Json<CreateNamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let material = state
        .db
        .call(move |db| db.create_material(&req.name, &req.blurb))
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(material)))
}

async fn get_material(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let material = state
        .db
        .call(move |db| db.get_material(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Material {} not found", id)))?;
    Ok(Json(material))
}

async fn update_material(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateNamedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.get_material(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Material {} not found", id)))?;
    let material = state
        .db
        .call(move |db| db.update_material(id, req.name.as_deref(), req.blurb.as_deref()))
        .await
        .map_err(internal)?;
    Ok(Json(material))
}

async fn delete_material(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_material(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Material {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Pages

async fn list_pages(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let pages = state.db.call(|db| db.list_pages()).await.map_err(internal)?;
    Ok(Json(pages))
}

async fn create_page(
    State(state): State<SharedState>,
    Json(req): Json<CreatePageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .db
        .call(move |db| db.create_page(&req.title, req.slug.as_deref(), &req.body_html))
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(page)))
}

async fn get_page(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .db
        .call(move |db| db.get_page(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Page {} not found", id)))?;
    Ok(Json(page))
}

async fn update_page(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.get_page(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Page {} not found", id)))?;
    let page = state
        .db
        .call(move |db| db.update_page(id, req.title.as_deref(), req.body_html.as_deref()))
        .await
        .map_err(internal)?;
    Ok(Json(page))
}

async fn delete_page(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_page(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Page {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Settings

async fn get_setting(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = key.clone();
    let value = state
        .db
        .call(move |db| db.get_setting(&lookup))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Setting '{}' not set", key)))?;
    Ok(Json(serde_json::json!({"key": key, "value": value})))
}

async fn put_setting(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(req): Json<SettingValue>,
) -> Result<impl IntoResponse, ApiError> {
    let stored_key = key.clone();
    let stored_value = req.value.clone();
    state
        .db
        .call(move |db| db.set_setting(&stored_key, &stored_value))
        .await
        .map_err(internal)?;
    Ok(Json(serde_json::json!({"key": key, "value": req.value})))
}

async fn delete_setting(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .call(move |db| db.delete_setting(&key))
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

// Pipeline

/// Kick off one pipeline run and stream its progress back to the caller
/// as SSE frames (one JSON object per `data:` line). The response stream
/// stays open until the run reaches a terminal status.
async fn run_pipeline(State(state): State<SharedState>) -> Result<Response, ApiError> {
    if state.gate.is_active() {
        return Err(ApiError::Conflict(
            "A pipeline run is already in progress".into(),
        ));
    }
    let (text, image) = resolve_models(&state).await?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = PipelineRunner::new(
        state.db.clone(),
        text,
        image,
        PipelineTuning::from(&state.config),
        Arc::clone(&state.gate),
    );
    tokio::spawn(async move {
        if let Err(e) = runner.run(tx).await {
            eprintln!("[pipeline] run aborted: {}", e);
        }
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| {
            (
                Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(event.sse_line())),
                rx,
            )
        })
    });

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

async fn list_runs(
    State(state): State<SharedState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let runs = state
        .db
        .call(move |db| db.list_runs(limit))
        .await
        .map_err(internal)?;
    Ok(Json(runs))
}

async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .db
        .call(move |db| db.get_run_detail(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline run {} not found", id)))?;
    Ok(Json(detail))
}

// Internal linking

async fn list_rules(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let rules = state
        .db
        .call(|db| db.list_link_rules())
        .await
        .map_err(internal)?;
    Ok(Json(rules))
}

async fn create_rule(
    State(state): State<SharedState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.keyword.trim().is_empty() || req.url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Both keyword and url are required".into(),
        ));
    }
    let rule = state
        .db
        .call(move |db| {
            db.upsert_link_rule(
                &req.keyword,
                &req.url,
                &crate::content::models::RuleSource::Manual,
            )
        })
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn delete_rule(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_link_rule(id))
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Link rule {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn extract_keywords(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let (text, _image) = resolve_models(&state).await?;
    let extractor = KeywordExtractor::new(
        state.db.clone(),
        text,
        state.config.pipeline.keywords_per_item,
    );
    let report = extractor
        .run()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(report))
}

async fn apply_link_rules(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let report = apply_links(&state.db)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(report))
}
