//! Product persistence, staged upload files and webhook delivery for the catalog importer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use catalog_core::{
    normalize_sku, NewProduct, Product, ProductEvent, ProductPage, ProductPatch, ProductQuery,
    ProductStats,
};
use chrono::Utc;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, Semaphore};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("product with SKU '{0}' already exists")]
    DuplicateSku(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of one atomic batch insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchWrite {
    pub attempted: usize,
    pub inserted: usize,
}

impl BatchWrite {
    /// Rows the uniqueness constraint refused at commit time.
    pub fn conflicts(&self) -> usize {
        self.attempted.saturating_sub(self.inserted)
    }
}

/// Access to the `products` table.
///
/// `insert_batch` must be all-or-nothing for non-conflict errors and must
/// silently skip rows whose SKU already exists (case-insensitively).
#[async_trait]
pub trait ProductStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn existing_skus(&self) -> StorageResult<HashSet<String>>;

    async fn insert_batch(&self, rows: &[NewProduct]) -> StorageResult<BatchWrite>;

    async fn create(&self, product: NewProduct) -> StorageResult<Product>;

    async fn get(&self, id: i64) -> StorageResult<Option<Product>>;

    async fn update(&self, id: i64, patch: ProductPatch) -> StorageResult<Option<Product>>;

    async fn delete(&self, id: i64) -> StorageResult<Option<Product>>;

    async fn delete_all(&self) -> StorageResult<u64>;

    async fn list(&self, query: &ProductQuery) -> StorageResult<ProductPage>;

    async fn stats(&self) -> StorageResult<ProductStats>;
}

const PRODUCT_COLUMNS: &str = "id, name, sku, description, active, created_at";

#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, sqlx::Error> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        description: row.try_get("description")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_unique_violation(err: sqlx::Error, sku: &str) -> StorageError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::DuplicateSku(sku.to_string())
        }
        _ => StorageError::Database(err),
    }
}

fn like_pattern(term: &str) -> String {
    format!("%{term}%")
}

#[async_trait]
impl ProductStore for PgProductStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn existing_skus(&self) -> StorageResult<HashSet<String>> {
        let rows = sqlx::query("SELECT LOWER(sku) AS sku FROM products")
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashSet::with_capacity(rows.len());
        for row in rows {
            out.insert(row.try_get::<String, _>("sku")?);
        }
        Ok(out)
    }

    async fn insert_batch(&self, rows: &[NewProduct]) -> StorageResult<BatchWrite> {
        if rows.is_empty() {
            return Ok(BatchWrite::default());
        }

        let names = rows.iter().map(|r| r.name.clone()).collect::<Vec<_>>();
        let skus = rows.iter().map(|r| r.sku.clone()).collect::<Vec<_>>();
        let descriptions = rows.iter().map(|r| r.description.clone()).collect::<Vec<_>>();
        let actives = rows.iter().map(|r| r.active).collect::<Vec<_>>();

        // Dropping `tx` on an early return rolls the batch back.
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO products (name, sku, description, active)
            SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::bool[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(names)
        .bind(skus)
        .bind(descriptions)
        .bind(actives)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(BatchWrite {
            attempted: rows.len(),
            inserted: result.rows_affected() as usize,
        })
    }

    async fn create(&self, product: NewProduct) -> StorageResult<Product> {
        let sql = format!(
            "INSERT INTO products (name, sku, description, active) VALUES ($1, $2, $3, $4) RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&product.name)
            .bind(&product.sku)
            .bind(&product.description)
            .bind(product.active)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_unique_violation(err, &product.sku))?;
        Ok(product_from_row(&row)?)
    }

    async fn get(&self, id: i64) -> StorageResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn update(&self, id: i64, patch: ProductPatch) -> StorageResult<Option<Product>> {
        let sku = patch.normalized_sku();
        let sql = format!(
            r#"
            UPDATE products
               SET name = COALESCE($2, name),
                   sku = COALESCE($3, sku),
                   description = COALESCE($4, description),
                   active = COALESCE($5, active)
             WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(&sku)
            .bind(&patch.description)
            .bind(patch.active)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_unique_violation(err, sku.as_deref().unwrap_or_default()))?;
        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn delete(&self, id: i64) -> StorageResult<Option<Product>> {
        let sql = format!("DELETE FROM products WHERE id = $1 RETURNING {PRODUCT_COLUMNS}");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(product_from_row).transpose()?)
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM products").execute(&self.pool).await?;
        info!(deleted = result.rows_affected(), "deleted all products");
        Ok(result.rows_affected())
    }

    async fn list(&self, query: &ProductQuery) -> StorageResult<ProductPage> {
        let pattern = query.search_term().map(like_pattern);
        let filter = r#"
            WHERE ($1::text IS NULL
                   OR name ILIKE $1
                   OR sku ILIKE $1
                   OR description ILIKE $1)
              AND ($2::bool IS NULL OR active = $2)
        "#;

        let count_sql = format!("SELECT COUNT(*) AS total FROM products {filter}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(&pattern)
            .bind(query.active)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let page_sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products {filter} ORDER BY id LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&page_sql)
            .bind(&pattern)
            .bind(query.active)
            .bind(i64::from(query.per_page))
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        let products = rows
            .iter()
            .map(product_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProductPage::new(products, total.max(0) as u64, query))
    }

    async fn stats(&self) -> StorageResult<ProductStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE active) AS active
              FROM products
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("total")?;
        let active: i64 = row.try_get("active")?;
        Ok(ProductStats {
            total_products: total.max(0) as u64,
            active_products: active.max(0) as u64,
            inactive_products: (total - active).max(0) as u64,
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: BTreeMap<i64, Product>,
    /// Normalized SKU -> id; mirrors `rows` like the `LOWER(sku)` unique index.
    by_sku: HashMap<String, i64>,
}

impl MemoryState {
    fn sku_owner(&self, sku: &str) -> Option<i64> {
        self.by_sku.get(sku).copied()
    }

    fn insert(&mut self, product: NewProduct) -> Product {
        self.next_id += 1;
        let row = Product {
            id: self.next_id,
            name: product.name,
            sku: product.sku,
            description: product.description,
            active: product.active,
            created_at: Utc::now(),
        };
        self.by_sku.insert(normalize_sku(&row.sku), row.id);
        self.rows.insert(row.id, row.clone());
        row
    }

    fn update(&mut self, id: i64, patch: &ProductPatch) -> StorageResult<Option<Product>> {
        let new_sku = patch.normalized_sku();
        if let Some(sku) = &new_sku {
            if matches!(self.sku_owner(sku), Some(owner) if owner != id) {
                return Err(StorageError::DuplicateSku(sku.clone()));
            }
        }
        let Some(product) = self.rows.get_mut(&id) else {
            return Ok(None);
        };
        let old_sku = normalize_sku(&product.sku);
        patch.apply_to(product);
        let updated = product.clone();
        if let Some(sku) = new_sku {
            self.by_sku.remove(&old_sku);
            self.by_sku.insert(sku, id);
        }
        Ok(Some(updated))
    }

    fn remove(&mut self, id: i64) -> Option<Product> {
        let product = self.rows.remove(&id)?;
        self.by_sku.remove(&normalize_sku(&product.sku));
        Some(product)
    }

    fn clear(&mut self) -> u64 {
        let deleted = self.rows.len() as u64;
        self.rows.clear();
        self.by_sku.clear();
        deleted
    }
}

/// Process-local product table used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    state: RwLock<MemoryState>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Product> {
        self.state.read().await.rows.values().cloned().collect()
    }

    pub async fn find_by_sku(&self, sku: &str) -> Option<Product> {
        let sku = normalize_sku(sku);
        let state = self.state.read().await;
        state
            .sku_owner(&sku)
            .and_then(|id| state.rows.get(&id).cloned())
    }
}

fn matches_search(product: &Product, term: &str) -> bool {
    let term = term.to_lowercase();
    product.name.to_lowercase().contains(&term)
        || product.sku.to_lowercase().contains(&term)
        || product
            .description
            .as_deref()
            .map(|d| d.to_lowercase().contains(&term))
            .unwrap_or(false)
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn existing_skus(&self) -> StorageResult<HashSet<String>> {
        let state = self.state.read().await;
        Ok(state.by_sku.keys().cloned().collect())
    }

    async fn insert_batch(&self, rows: &[NewProduct]) -> StorageResult<BatchWrite> {
        let mut state = self.state.write().await;
        let mut inserted = 0usize;
        for row in rows {
            if state.sku_owner(&row.sku).is_none() {
                state.insert(row.clone());
                inserted += 1;
            }
        }
        Ok(BatchWrite {
            attempted: rows.len(),
            inserted,
        })
    }

    async fn create(&self, product: NewProduct) -> StorageResult<Product> {
        let mut state = self.state.write().await;
        if state.sku_owner(&product.sku).is_some() {
            return Err(StorageError::DuplicateSku(product.sku));
        }
        Ok(state.insert(product))
    }

    async fn get(&self, id: i64) -> StorageResult<Option<Product>> {
        Ok(self.state.read().await.rows.get(&id).cloned())
    }

    async fn update(&self, id: i64, patch: ProductPatch) -> StorageResult<Option<Product>> {
        let mut state = self.state.write().await;
        if !state.rows.contains_key(&id) {
            return Ok(None);
        }
        state.update(id, &patch)
    }

    async fn delete(&self, id: i64) -> StorageResult<Option<Product>> {
        Ok(self.state.write().await.remove(id))
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let deleted = self.state.write().await.clear();
        info!(deleted, "deleted all products");
        Ok(deleted)
    }

    async fn list(&self, query: &ProductQuery) -> StorageResult<ProductPage> {
        let state = self.state.read().await;
        let filtered = state
            .rows
            .values()
            .filter(|p| query.search_term().map_or(true, |t| matches_search(p, t)))
            .filter(|p| query.active.map_or(true, |a| p.active == a))
            .collect::<Vec<_>>();
        let total = filtered.len() as u64;
        let products = filtered
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .cloned()
            .collect();
        Ok(ProductPage::new(products, total, query))
    }

    async fn stats(&self) -> StorageResult<ProductStats> {
        let state = self.state.read().await;
        let total = state.rows.len() as u64;
        let active = state.rows.values().filter(|p| p.active).count() as u64;
        Ok(ProductStats {
            total_products: total,
            active_products: active,
            inactive_products: total - active,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub content_hash: String,
    pub original_name: String,
    pub path: PathBuf,
    pub byte_size: usize,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload has no usable file name")]
    MissingName,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory where uploaded CSV files wait for their import job.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Keep only the final path component of a client-supplied file name.
    pub fn sanitize_name(name: &str) -> Option<String> {
        let last = name.rsplit(|c| c == '/' || c == '\\').next()?.trim();
        let cleaned = last
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        let cleaned = cleaned.trim_start_matches('.').to_string();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    /// Write the upload under a unique name using a temp file and atomic rename.
    pub async fn stage(&self, original_name: &str, bytes: &[u8]) -> Result<StagedUpload, UploadError> {
        let name = Self::sanitize_name(original_name).ok_or(UploadError::MissingName)?;
        let content_hash = Self::sha256_hex(bytes);

        fs::create_dir_all(&self.root).await?;

        let unique = Uuid::new_v4().simple().to_string();
        let final_path = self.root.join(format!("{}-{}-{name}", &content_hash[..12], unique));
        let temp_path = self.root.join(format!(".{unique}.{}.tmp", bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        Ok(StagedUpload {
            content_hash,
            original_name: name,
            path: final_path,
            byte_size: bytes.len(),
        })
    }
}

/// What to do after a delivery attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryVerdict {
    Retry,
    Abandon,
}

/// Receivers that time out, throttle or fail server-side get another attempt;
/// any other status means the endpoint refused the event.
pub fn verdict_for_status(status: StatusCode) -> DeliveryVerdict {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => DeliveryVerdict::Retry,
        s if s.is_server_error() => DeliveryVerdict::Retry,
        _ => DeliveryVerdict::Abandon,
    }
}

pub fn verdict_for_send_error(err: &reqwest::Error) -> DeliveryVerdict {
    if err.is_timeout() || err.is_connect() {
        DeliveryVerdict::Retry
    } else {
        DeliveryVerdict::Abandon
    }
}

/// Seconds form of `Retry-After`; HTTP dates are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookRetryPolicy {
    /// Total attempts per endpoint, including the first.
    pub attempts: usize,
    pub initial_delay: Duration,
    pub delay_ceiling: Duration,
}

impl Default for WebhookRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(500),
            delay_ceiling: Duration::from_secs(30),
        }
    }
}

impl WebhookRetryPolicy {
    /// Pause before retry number `retry` (0 for the first retry). A receiver's
    /// `Retry-After` hint replaces the doubling schedule but never exceeds the ceiling.
    pub fn pause_before(&self, retry: usize, hint: Option<Duration>) -> Duration {
        let doubled = 2u32
            .checked_pow(retry as u32)
            .map(|factor| self.initial_delay.saturating_mul(factor))
            .unwrap_or(self.delay_ceiling);
        hint.unwrap_or(doubled).min(self.delay_ceiling)
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub endpoints: Vec<String>,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub concurrency: usize,
    pub retry: WebhookRetryPolicy,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout: Duration::from_secs(10),
            user_agent: Some("catalog-importer/0.1".to_string()),
            concurrency: 8,
            retry: WebhookRetryPolicy::default(),
        }
    }
}

impl WebhookConfig {
    /// `CATALOG_WEBHOOK_URLS` is a comma separated endpoint list.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let endpoints = std::env::var("CATALOG_WEBHOOK_URLS")
            .map(|raw| parse_endpoints(&raw))
            .unwrap_or_default();
        let timeout = std::env::var("CATALOG_WEBHOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let attempts = std::env::var("CATALOG_WEBHOOK_ATTEMPTS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(|n| n.max(1))
            .unwrap_or(defaults.retry.attempts);
        Self {
            endpoints,
            timeout,
            retry: WebhookRetryPolicy {
                attempts,
                ..defaults.retry
            },
            ..defaults
        }
    }
}

fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("webhook notifier is shutting down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub url: String,
    pub status: u16,
    pub attempts: usize,
}

/// Best-effort fan-out of product lifecycle events to configured endpoints.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoints: Vec<String>,
    limit: Arc<Semaphore>,
    retry: WebhookRetryPolicy,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            endpoints: config.endpoints,
            limit: Arc::new(Semaphore::new(config.concurrency.max(1))),
            retry: config.retry,
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Deliver `event` to every endpoint; failures are logged and skipped.
    pub async fn notify(&self, event: &ProductEvent) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(self.endpoints.len());
        for url in &self.endpoints {
            let span = info_span!("webhook_delivery", event = event.event.as_str(), url = %url);
            match self.deliver(url, event).instrument(span).await {
                Ok(report) => reports.push(report),
                Err(err) => warn!(url = %url, error = %err, "webhook delivery failed"),
            }
        }
        reports
    }

    pub async fn deliver(&self, url: &str, event: &ProductEvent) -> Result<DeliveryReport, WebhookError> {
        let _permit = self.limit.acquire().await.map_err(|_| WebhookError::Closed)?;
        let attempts = self.retry.attempts.max(1);

        let mut attempt = 1;
        loop {
            let last = attempt >= attempts;
            let hint = match self.client.post(url).json(event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(DeliveryReport {
                        url: url.to_string(),
                        status: resp.status().as_u16(),
                        attempts: attempt,
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    if last || verdict_for_status(status) == DeliveryVerdict::Abandon {
                        return Err(WebhookError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    warn!(status = status.as_u16(), attempt, "webhook receiver asked for a retry");
                    retry_after(resp.headers())
                }
                Err(err) => {
                    if last || verdict_for_send_error(&err) == DeliveryVerdict::Abandon {
                        return Err(WebhookError::Request(err));
                    }
                    warn!(error = %err, attempt, "webhook request failed; retrying");
                    None
                }
            };
            tokio::time::sleep(self.retry.pause_before(attempt - 1, hint)).await;
            attempt += 1;
        }
    }
}
