use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Deserialize;

use super::models::*;

/// Async-safe handle to the content database.
///
/// Wraps `ContentStore` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ContentStore>>,
}

impl DbHandle {
    pub fn new(store: ContentStore) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(store)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ContentStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup initialization
    /// and tests only; must not be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, ContentStore>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

/// Fields accepted when creating a post.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub body_html: String,
    #[serde(default)]
    pub excerpt: String,
    pub status: Option<PostStatus>,
    pub featured_image: Option<String>,
    #[serde(default)]
    pub meta_description: String,
}

/// Partial update for a post; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostPatch {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub body_html: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<PostStatus>,
    pub featured_image: Option<Option<String>>,
    pub meta_description: Option<String>,
}

pub struct ContentStore {
    conn: Connection,
}

impl ContentStore {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    body_html TEXT NOT NULL DEFAULT '',
                    excerpt TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'draft',
                    featured_image TEXT,
                    meta_description TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    material TEXT,
                    price_note TEXT NOT NULL DEFAULT '',
                    image_url TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS industries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    blurb TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS materials (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    blurb TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    client TEXT NOT NULL DEFAULT '',
                    summary TEXT NOT NULL DEFAULT '',
                    image_url TEXT,
                    industry_id INTEGER REFERENCES industries(id) ON DELETE SET NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS pages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    body_html TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS pipeline_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    status TEXT NOT NULL DEFAULT 'running',
                    topics_found INTEGER NOT NULL DEFAULT 0,
                    topics_approved INTEGER NOT NULL DEFAULT 0,
                    articles_created INTEGER NOT NULL DEFAULT 0,
                    images_generated INTEGER NOT NULL DEFAULT 0,
                    error_log TEXT,
                    details TEXT,
                    started_at TEXT NOT NULL DEFAULT (datetime('now')),
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS agent_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id INTEGER NOT NULL REFERENCES pipeline_runs(id) ON DELETE CASCADE,
                    agent_name TEXT NOT NULL,
                    action TEXT NOT NULL,
                    status TEXT NOT NULL,
                    details TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS link_rules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    keyword TEXT NOT NULL COLLATE NOCASE UNIQUE,
                    url TEXT NOT NULL,
                    source TEXT NOT NULL DEFAULT 'manual',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
                CREATE INDEX IF NOT EXISTS idx_projects_industry ON projects(industry_id);
                CREATE INDEX IF NOT EXISTS idx_agent_logs_run ON agent_logs(run_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Post CRUD ─────────────────────────────────────────────────────

    pub fn create_post(&self, new: &NewPost) -> Result<Post> {
        let slug = match &new.slug {
            Some(s) if !s.is_empty() => s.clone(),
            _ => slugify(&new.title, 80),
        };
        let status = new.status.clone().unwrap_or(PostStatus::Draft);
        self.conn
            .execute(
                "INSERT INTO posts (title, slug, body_html, excerpt, status, featured_image, meta_description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.title,
                    slug,
                    new.body_html,
                    new.excerpt,
                    status.as_str(),
                    new.featured_image,
                    new.meta_description
                ],
            )
            .context("Failed to insert post")?;
        let id = self.conn.last_insert_rowid();
        self.get_post(id)?.context("Post not found after insert")
    }

    pub fn list_posts(&self, status: Option<&PostStatus>) -> Result<Vec<Post>> {
        let sql = match status {
            Some(_) => {
                "SELECT id, title, slug, body_html, excerpt, status, featured_image, meta_description, created_at, updated_at
                 FROM posts WHERE status = ?1 ORDER BY id DESC"
            }
            None => {
                "SELECT id, title, slug, body_html, excerpt, status, featured_image, meta_description, created_at, updated_at
                 FROM posts ORDER BY id DESC"
            }
        };
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare list_posts")?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(PostRow {
                id: row.get(0)?,
                title: row.get(1)?,
                slug: row.get(2)?,
                body_html: row.get(3)?,
                excerpt: row.get(4)?,
                status: row.get(5)?,
                featured_image: row.get(6)?,
                meta_description: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
            })
        };
        let rows: Vec<Result<PostRow, rusqlite::Error>> = match status {
            Some(s) => stmt
                .query_map(params![s.as_str()], map_row)
                .context("Failed to query posts")?
                .collect(),
            None => stmt
                .query_map([], map_row)
                .context("Failed to query posts")?
                .collect(),
        };
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row.context("Failed to read post row")?.into_post()?);
        }
        Ok(posts)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, slug, body_html, excerpt, status, featured_image, meta_description, created_at, updated_at
                 FROM posts WHERE id = ?1",
            )
            .context("Failed to prepare get_post")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(PostRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    body_html: row.get(3)?,
                    excerpt: row.get(4)?,
                    status: row.get(5)?,
                    featured_image: row.get(6)?,
                    meta_description: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            })
            .context("Failed to query post")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read post row")?.into_post()?)),
            None => Ok(None),
        }
    }

    pub fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM posts WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("Failed to query post by slug")?;
        match id {
            Some(id) => self.get_post(id),
            None => Ok(None),
        }
    }

    pub fn update_post(&self, id: i64, patch: &PostPatch) -> Result<Post> {
        // Use unchecked_transaction so all updates are atomic.
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(title) = &patch.title {
            tx.execute(
                "UPDATE posts SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to update post title")?;
        }
        if let Some(slug) = &patch.slug {
            tx.execute(
                "UPDATE posts SET slug = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![slug, id],
            )
            .context("Failed to update post slug")?;
        }
        if let Some(body_html) = &patch.body_html {
            tx.execute(
                "UPDATE posts SET body_html = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![body_html, id],
            )
            .context("Failed to update post body")?;
        }
        if let Some(excerpt) = &patch.excerpt {
            tx.execute(
                "UPDATE posts SET excerpt = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![excerpt, id],
            )
            .context("Failed to update post excerpt")?;
        }
        if let Some(status) = &patch.status {
            tx.execute(
                "UPDATE posts SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update post status")?;
        }
        if let Some(featured_image) = &patch.featured_image {
            tx.execute(
                "UPDATE posts SET featured_image = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![featured_image, id],
            )
            .context("Failed to update post featured image")?;
        }
        if let Some(meta_description) = &patch.meta_description {
            tx.execute(
                "UPDATE posts SET meta_description = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![meta_description, id],
            )
            .context("Failed to update post meta description")?;
        }

        tx.commit().context("Failed to commit post update")?;
        self.get_post(id)?.context("Post not found after update")
    }

    pub fn publish_post(&self, id: i64) -> Result<Post> {
        self.conn
            .execute(
                "UPDATE posts SET status = 'published', updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .context("Failed to publish post")?;
        self.get_post(id)?.context("Post not found after publish")
    }

    pub fn delete_post(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id])
            .context("Failed to delete post")?;
        Ok(count > 0)
    }

    // ── Product CRUD ──────────────────────────────────────────────────

    pub fn create_product(
        &self,
        name: &str,
        description: &str,
        material: Option<&str>,
        price_note: &str,
        image_url: Option<&str>,
    ) -> Result<Product> {
        let slug = slugify(name, 80);
        self.conn
            .execute(
                "INSERT INTO products (name, slug, description, material, price_note, image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![name, slug, description, material, price_note, image_url],
            )
            .context("Failed to insert product")?;
        let id = self.conn.last_insert_rowid();
        self.get_product(id)?
            .context("Product not found after insert")
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, slug, description, material, price_note, image_url, created_at, updated_at
                 FROM products ORDER BY name",
            )
            .context("Failed to prepare list_products")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    description: row.get(3)?,
                    material: row.get(4)?,
                    price_note: row.get(5)?,
                    image_url: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .context("Failed to query products")?;
        let mut products = Vec::new();
        for row in rows {
            products.push(row.context("Failed to read product row")?);
        }
        Ok(products)
    }

    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, slug, description, material, price_note, image_url, created_at, updated_at
                 FROM products WHERE id = ?1",
            )
            .context("Failed to prepare get_product")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    description: row.get(3)?,
                    material: row.get(4)?,
                    price_note: row.get(5)?,
                    image_url: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .context("Failed to query product")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read product row")?)),
            None => Ok(None),
        }
    }

    pub fn update_product(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
        material: Option<&str>,
        price_note: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Product> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(v) = name {
            tx.execute(
                "UPDATE products SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update product name")?;
        }
        if let Some(v) = description {
            tx.execute(
                "UPDATE products SET description = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update product description")?;
        }
        if let Some(v) = material {
            tx.execute(
                "UPDATE products SET material = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update product material")?;
        }
        if let Some(v) = price_note {
            tx.execute(
                "UPDATE products SET price_note = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update product price note")?;
        }
        if let Some(v) = image_url {
            tx.execute(
                "UPDATE products SET image_url = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update product image")?;
        }
        tx.commit().context("Failed to commit product update")?;
        self.get_product(id)?
            .context("Product not found after update")
    }

    pub fn delete_product(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])
            .context("Failed to delete product")?;
        Ok(count > 0)
    }

    // ── Project (portfolio) CRUD ──────────────────────────────────────

    pub fn create_project(
        &self,
        title: &str,
        client: &str,
        summary: &str,
        image_url: Option<&str>,
        industry_id: Option<i64>,
    ) -> Result<Project> {
        let slug = slugify(title, 80);
        self.conn
            .execute(
                "INSERT INTO projects (title, slug, client, summary, image_url, industry_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![title, slug, client, summary, image_url, industry_id],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, slug, client, summary, image_url, industry_id, created_at, updated_at
                 FROM projects ORDER BY id DESC",
            )
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    client: row.get(3)?,
                    summary: row.get(4)?,
                    image_url: row.get(5)?,
                    industry_id: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, slug, client, summary, image_url, industry_id, created_at, updated_at
                 FROM projects WHERE id = ?1",
            )
            .context("Failed to prepare get_project")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    client: row.get(3)?,
                    summary: row.get(4)?,
                    image_url: row.get(5)?,
                    industry_id: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .context("Failed to query project")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read project row")?)),
            None => Ok(None),
        }
    }

    pub fn update_project(
        &self,
        id: i64,
        title: Option<&str>,
        client: Option<&str>,
        summary: Option<&str>,
        image_url: Option<&str>,
        industry_id: Option<i64>,
    ) -> Result<Project> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if let Some(v) = title {
            tx.execute(
                "UPDATE projects SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update project title")?;
        }
        if let Some(v) = client {
            tx.execute(
                "UPDATE projects SET client = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update project client")?;
        }
        if let Some(v) = summary {
            tx.execute(
                "UPDATE projects SET summary = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update project summary")?;
        }
        if let Some(v) = image_url {
            tx.execute(
                "UPDATE projects SET image_url = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update project image")?;
        }
        if let Some(v) = industry_id {
            tx.execute(
                "UPDATE projects SET industry_id = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![v, id],
            )
            .context("Failed to update project industry")?;
        }
        tx.commit().context("Failed to commit project update")?;
        self.get_project(id)?
            .context("Project not found after update")
    }

    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .context("Failed to delete project")?;
        Ok(count > 0)
    }

    // ── Industry / Material CRUD ──────────────────────────────────────

    pub fn create_industry(&self, name: &str, blurb: &str) -> Result<Industry> {
        let slug = slugify(name, 80);
        self.conn
            .execute(
                "INSERT INTO industries (name, slug, blurb) VALUES (?1, ?2, ?3)",
                params![name, slug, blurb],
            )
            .context("Failed to insert industry")?;
        let id = self.conn.last_insert_rowid();
        self.get_industry(id)?
            .context("Industry not found after insert")
    }

    pub fn list_industries(&self) -> Result<Vec<Industry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, blurb, created_at FROM industries ORDER BY name")
            .context("Failed to prepare list_industries")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Industry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    blurb: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query industries")?;
        let mut industries = Vec::new();
        for row in rows {
            industries.push(row.context("Failed to read industry row")?);
        }
        Ok(industries)
    }

    pub fn get_industry(&self, id: i64) -> Result<Option<Industry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, blurb, created_at FROM industries WHERE id = ?1")
            .context("Failed to prepare get_industry")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Industry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    blurb: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query industry")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read industry row")?)),
            None => Ok(None),
        }
    }

    pub fn update_industry(&self, id: i64, name: Option<&str>, blurb: Option<&str>) -> Result<Industry> {
        if let Some(v) = name {
            self.conn
                .execute(
                    "UPDATE industries SET name = ?1 WHERE id = ?2",
                    params![v, id],
                )
                .context("Failed to update industry name")?;
        }
        if let Some(v) = blurb {
            self.conn
                .execute(
                    "UPDATE industries SET blurb = ?1 WHERE id = ?2",
                    params![v, id],
                )
                .context("Failed to update industry blurb")?;
        }
        self.get_industry(id)?
            .context("Industry not found after update")
    }

    pub fn delete_industry(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM industries WHERE id = ?1", params![id])
            .context("Failed to delete industry")?;
        Ok(count > 0)
    }

    pub fn create_material(&self, name: &str, blurb: &str) -> Result<Material> {
        let slug = slugify(name, 80);
        self.conn
            .execute(
                "INSERT INTO materials (name, slug, blurb) VALUES (?1, ?2, ?3)",
                params![name, slug, blurb],
            )
            .context("Failed to insert material")?;
        let id = self.conn.last_insert_rowid();
        self.get_material(id)?
            .context("Material not found after insert")
    }

    pub fn list_materials(&self) -> Result<Vec<Material>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, blurb, created_at FROM materials ORDER BY name")
            .context("Failed to prepare list_materials")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Material {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    blurb: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query materials")?;
        let mut materials = Vec::new();
        for row in rows {
            materials.push(row.context("Failed to read material row")?);
        }
        Ok(materials)
    }

    pub fn get_material(&self, id: i64) -> Result<Option<Material>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, blurb, created_at FROM materials WHERE id = ?1")
            .context("Failed to prepare get_material")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Material {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    slug: row.get(2)?,
                    blurb: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query material")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read material row")?)),
            None => Ok(None),
        }
    }

    pub fn update_material(&self, id: i64, name: Option<&str>, blurb: Option<&str>) -> Result<Material> {
        if let Some(v) = name {
            self.conn
                .execute(
                    "UPDATE materials SET name = ?1 WHERE id = ?2",
                    params![v, id],
                )
                .context("Failed to update material name")?;
        }
        if let Some(v) = blurb {
            self.conn
                .execute(
                    "UPDATE materials SET blurb = ?1 WHERE id = ?2",
                    params![v, id],
                )
                .context("Failed to update material blurb")?;
        }
        self.get_material(id)?
            .context("Material not found after update")
    }

    pub fn delete_material(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM materials WHERE id = ?1", params![id])
            .context("Failed to delete material")?;
        Ok(count > 0)
    }

    // ── Page CRUD ─────────────────────────────────────────────────────

    pub fn create_page(&self, title: &str, slug: Option<&str>, body_html: &str) -> Result<Page> {
        let slug = match slug {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => slugify(title, 80),
        };
        self.conn
            .execute(
                "INSERT INTO pages (title, slug, body_html) VALUES (?1, ?2, ?3)",
                params![title, slug, body_html],
            )
            .context("Failed to insert page")?;
        let id = self.conn.last_insert_rowid();
        self.get_page(id)?.context("Page not found after insert")
    }

    pub fn list_pages(&self) -> Result<Vec<Page>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, slug, body_html, created_at, updated_at FROM pages ORDER BY title",
            )
            .context("Failed to prepare list_pages")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Page {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    body_html: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .context("Failed to query pages")?;
        let mut pages = Vec::new();
        for row in rows {
            pages.push(row.context("Failed to read page row")?);
        }
        Ok(pages)
    }

    pub fn get_page(&self, id: i64) -> Result<Option<Page>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, slug, body_html, created_at, updated_at FROM pages WHERE id = ?1",
            )
            .context("Failed to prepare get_page")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(Page {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    body_html: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })
            .context("Failed to query page")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read page row")?)),
            None => Ok(None),
        }
    }

    pub fn update_page(
        &self,
        id: i64,
        title: Option<&str>,
        body_html: Option<&str>,
    ) -> Result<Page> {
        if let Some(v) = title {
            self.conn
                .execute(
                    "UPDATE pages SET title = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![v, id],
                )
                .context("Failed to update page title")?;
        }
        if let Some(v) = body_html {
            self.conn
                .execute(
                    "UPDATE pages SET body_html = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![v, id],
                )
                .context("Failed to update page body")?;
        }
        self.get_page(id)?.context("Page not found after update")
    }

    pub fn delete_page(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM pages WHERE id = ?1", params![id])
            .context("Failed to delete page")?;
        Ok(count > 0)
    }

    // ── Pipeline runs ─────────────────────────────────────────────────

    pub fn create_run(&self) -> Result<PipelineRun> {
        self.conn
            .execute("INSERT INTO pipeline_runs (status) VALUES ('running')", [])
            .context("Failed to insert pipeline run")?;
        let id = self.conn.last_insert_rowid();
        self.get_run(id)?
            .context("Pipeline run not found after insert")
    }

    pub fn get_run(&self, id: i64) -> Result<Option<PipelineRun>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, status, topics_found, topics_approved, articles_created, images_generated, error_log, details, started_at, completed_at
                 FROM pipeline_runs WHERE id = ?1",
            )
            .context("Failed to prepare get_run")?;
        let mut rows = stmt
            .query_map(params![id], run_row_mapper)
            .context("Failed to query pipeline run")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read run row")?.into_run()?)),
            None => Ok(None),
        }
    }

    pub fn list_runs(&self, limit: i64) -> Result<Vec<PipelineRun>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, status, topics_found, topics_approved, articles_created, images_generated, error_log, details, started_at, completed_at
                 FROM pipeline_runs ORDER BY id DESC LIMIT ?1",
            )
            .context("Failed to prepare list_runs")?;
        let rows = stmt
            .query_map(params![limit], run_row_mapper)
            .context("Failed to query pipeline runs")?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.context("Failed to read run row")?.into_run()?);
        }
        Ok(runs)
    }

    /// Update the aggregate counters for a run; `None` leaves a counter unchanged.
    pub fn update_run_counters(
        &self,
        id: i64,
        topics_found: Option<i64>,
        topics_approved: Option<i64>,
        articles_created: Option<i64>,
        images_generated: Option<i64>,
    ) -> Result<PipelineRun> {
        self.conn
            .execute(
                "UPDATE pipeline_runs SET
                    topics_found = COALESCE(?1, topics_found),
                    topics_approved = COALESCE(?2, topics_approved),
                    articles_created = COALESCE(?3, articles_created),
                    images_generated = COALESCE(?4, images_generated)
                 WHERE id = ?5",
                params![topics_found, topics_approved, articles_created, images_generated, id],
            )
            .context("Failed to update run counters")?;
        self.get_run(id)?
            .context("Pipeline run not found after counter update")
    }

    pub fn set_run_details(&self, id: i64, details: &serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(details).context("Failed to serialize run details")?;
        self.conn
            .execute(
                "UPDATE pipeline_runs SET details = ?1 WHERE id = ?2",
                params![raw, id],
            )
            .context("Failed to update run details")?;
        Ok(())
    }

    /// Move a run to a terminal status. A run is finalized at most once:
    /// the update only applies while the stored status is still `running`,
    /// so later attempts (including a second finalize after a top-level
    /// error) are no-ops. Returns whether this call performed the finalize.
    pub fn finalize_run(
        &self,
        id: i64,
        status: &RunStatus,
        error_log: Option<&str>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            anyhow::bail!("finalize_run called with non-terminal status '{}'", status.as_str());
        }
        let count = self
            .conn
            .execute(
                "UPDATE pipeline_runs SET status = ?1, error_log = ?2, completed_at = datetime('now')
                 WHERE id = ?3 AND status = 'running'",
                params![status.as_str(), error_log, id],
            )
            .context("Failed to finalize pipeline run")?;
        Ok(count > 0)
    }

    // ── Agent logs ────────────────────────────────────────────────────

    pub fn log_agent(
        &self,
        run_id: i64,
        agent_name: &str,
        action: &str,
        status: &str,
        details: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO agent_logs (run_id, agent_name, action, status, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![run_id, agent_name, action, status, details],
            )
            .context("Failed to insert agent log")?;
        Ok(())
    }

    pub fn get_run_logs(&self, run_id: i64) -> Result<Vec<AgentLog>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, run_id, agent_name, action, status, details, created_at
                 FROM agent_logs WHERE run_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare get_run_logs")?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(AgentLog {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    agent_name: row.get(2)?,
                    action: row.get(3)?,
                    status: row.get(4)?,
                    details: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .context("Failed to query agent logs")?;
        let mut logs = Vec::new();
        for row in rows {
            logs.push(row.context("Failed to read agent log row")?);
        }
        Ok(logs)
    }

    pub fn get_run_detail(&self, id: i64) -> Result<Option<PipelineRunDetail>> {
        let run = match self.get_run(id)? {
            Some(r) => r,
            None => return Ok(None),
        };
        let logs = self.get_run_logs(id)?;
        Ok(Some(PipelineRunDetail { run, logs }))
    }

    // ── Link rules ────────────────────────────────────────────────────

    pub fn upsert_link_rule(&self, keyword: &str, url: &str, source: &RuleSource) -> Result<LinkRule> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            anyhow::bail!("Link rule keyword must not be empty");
        }
        self.conn
            .execute(
                "INSERT INTO link_rules (keyword, url, source) VALUES (?1, ?2, ?3)
                 ON CONFLICT(keyword) DO UPDATE SET url = excluded.url, source = excluded.source",
                params![keyword, url, source.as_str()],
            )
            .context("Failed to upsert link rule")?;
        let rule = self
            .get_link_rule_by_keyword(keyword)?
            .context("Link rule not found after upsert")?;
        Ok(rule)
    }

    pub fn list_link_rules(&self) -> Result<Vec<LinkRule>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, keyword, url, source, created_at FROM link_rules ORDER BY keyword")
            .context("Failed to prepare list_link_rules")?;
        let rows = stmt
            .query_map([], link_rule_mapper)
            .context("Failed to query link rules")?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row.context("Failed to read link rule row")?.into_rule()?);
        }
        Ok(rules)
    }

    pub fn get_link_rule_by_keyword(&self, keyword: &str) -> Result<Option<LinkRule>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, keyword, url, source, created_at FROM link_rules WHERE keyword = ?1")
            .context("Failed to prepare get_link_rule_by_keyword")?;
        let mut rows = stmt
            .query_map(params![keyword], link_rule_mapper)
            .context("Failed to query link rule")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read link rule row")?.into_rule()?)),
            None => Ok(None),
        }
    }

    pub fn delete_link_rule(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM link_rules WHERE id = ?1", params![id])
            .context("Failed to delete link rule")?;
        Ok(count > 0)
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?1")
            .context("Failed to prepare get_setting")?;
        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("Failed to query setting")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read setting")?)),
            None => Ok(None),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )
            .context("Failed to upsert setting")?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .context("Failed to delete setting")?;
        Ok(())
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for posts; status is parsed into `PostStatus`
/// when converting.
struct PostRow {
    id: i64,
    title: String,
    slug: String,
    body_html: String,
    excerpt: String,
    status: String,
    featured_image: Option<String>,
    meta_description: String,
    created_at: String,
    updated_at: String,
}

impl PostRow {
    fn into_post(self) -> Result<Post> {
        let status = PostStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse post status")?;
        Ok(Post {
            id: self.id,
            title: self.title,
            slug: self.slug,
            body_html: self.body_html,
            excerpt: self.excerpt,
            status,
            featured_image: self.featured_image,
            meta_description: self.meta_description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct RunRow {
    id: i64,
    status: String,
    topics_found: i64,
    topics_approved: i64,
    articles_created: i64,
    images_generated: i64,
    error_log: Option<String>,
    details: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

fn run_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        id: row.get(0)?,
        status: row.get(1)?,
        topics_found: row.get(2)?,
        topics_approved: row.get(3)?,
        articles_created: row.get(4)?,
        images_generated: row.get(5)?,
        error_log: row.get(6)?,
        details: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

impl RunRow {
    fn into_run(self) -> Result<PipelineRun> {
        let status = RunStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse run status")?;
        let details = match self.details {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("corrupt run details JSON '{}': {}", raw, e))?,
            ),
            None => None,
        };
        Ok(PipelineRun {
            id: self.id,
            status,
            topics_found: self.topics_found,
            topics_approved: self.topics_approved,
            articles_created: self.articles_created,
            images_generated: self.images_generated,
            error_log: self.error_log,
            details,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

struct LinkRuleRow {
    id: i64,
    keyword: String,
    url: String,
    source: String,
    created_at: String,
}

fn link_rule_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkRuleRow> {
    Ok(LinkRuleRow {
        id: row.get(0)?,
        keyword: row.get(1)?,
        url: row.get(2)?,
        source: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl LinkRuleRow {
    fn into_rule(self) -> Result<LinkRule> {
        let source = RuleSource::from_str(&self.source)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse rule source")?;
        Ok(LinkRule {
            id: self.id,
            keyword: self.keyword,
            url: self.url,
            source,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
