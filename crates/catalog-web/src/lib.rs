//! Axum JSON API for the catalog importer: CSV upload, job polling and
//! streaming, cancellation, and product CRUD.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use catalog_core::{
    normalize_sku, JobState, NewProduct, Product, ProductEvent, ProductEventKind, ProductPage,
    ProductPatch, ProductQuery,
};
use catalog_import::{is_csv_path, schedule_eviction, ImportPool, JobRegistry, SubmitError};
use catalog_storage::{ProductStore, StorageError, UploadError, UploadStore, WebhookNotifier};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const ONLY_CSV: &str = "Only CSV files allowed";
pub const TASK_NOT_FOUND: &str = "Task not found";

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const STREAM_EVICT_DELAY: Duration = Duration::from_secs(1);
const MAX_PER_PAGE: u32 = 500;
const DEFAULT_UPLOAD_LIMIT: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            upload_dir: std::env::temp_dir().join("catalog-uploads"),
            max_upload_bytes: DEFAULT_UPLOAD_LIMIT,
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("CATALOG_BIND").unwrap_or(defaults.bind),
            upload_dir: std::env::var("CATALOG_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_bytes: std::env::var("CATALOG_UPLOAD_MAX_BYTES")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProductStore>,
    pub pool: Arc<ImportPool>,
    pub registry: Arc<dyn JobRegistry>,
    pub uploads: UploadStore,
    pub notifier: Arc<WebhookNotifier>,
    pub evict_grace: Duration,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ProductStore>,
        pool: Arc<ImportPool>,
        uploads: UploadStore,
        notifier: Arc<WebhookNotifier>,
        evict_grace: Duration,
    ) -> Self {
        Self {
            registry: pool.registry(),
            store,
            pool,
            uploads,
            notifier,
            evict_grace,
            max_upload_bytes: DEFAULT_UPLOAD_LIMIT,
        }
    }

    pub fn with_upload_limit(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    async fn job_view(&self, task_id: &str) -> Option<(JobView, bool)> {
        let job = self.pool.status(task_id).await?;
        let cancel_requested = self.registry.is_cancel_requested(task_id).await;
        Some((JobView::new(&job, cancel_requested), job.is_terminal()))
    }

    /// Fire-and-forget webhook fan-out for a product lifecycle change.
    fn announce(&self, kind: ProductEventKind, product: Product) {
        if self.notifier.endpoints().is_empty() {
            return;
        }
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let event = ProductEvent::new(kind, product);
            let reports = notifier.notify(&event).await;
            info!(
                event = event.event.as_str(),
                delivered = reports.len(),
                endpoints = notifier.endpoints().len(),
                "webhook fan-out finished"
            );
        });
    }
}

/// Flat JSON shape of a job returned by polling and streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub state: &'static str,
    pub progress: u8,
    pub status: String,
    pub processed: usize,
    pub total: usize,
    pub imported: usize,
    pub error: Option<String>,
    pub cancel_requested: bool,
}

impl JobView {
    pub fn new(job: &JobState, cancel_requested: bool) -> Self {
        let (state, processed, total, error) = match job {
            JobState::Queued { .. } => ("queued", 0, 0, None),
            JobState::Running {
                processed, total, ..
            } => ("running", *processed, *total, None),
            JobState::Succeeded { summary } => ("succeeded", summary.parsed, summary.parsed, None),
            JobState::Failed { error } => ("failed", 0, 0, Some(error.clone())),
            JobState::Cancelled {
                processed, total, ..
            } => ("cancelled", *processed, *total, None),
        };
        let status = if cancel_requested && !job.is_terminal() {
            "Cancelling...".to_string()
        } else {
            job.status_text()
        };
        Self {
            state,
            progress: job.progress(),
            status,
            processed,
            total,
            imported: job.imported(),
            error,
            cancel_requested,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateSku(_) => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::NotCsv(_) => ApiError::BadRequest(ONLY_CSV.to_string()),
            SubmitError::Saturated => {
                ApiError::Unavailable("Import workers are busy, try again later".to_string())
            }
            SubmitError::Registry(err) => ApiError::Internal(err.to_string()),
            SubmitError::WorkerLost => ApiError::Internal(SubmitError::WorkerLost.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MissingName => ApiError::BadRequest(err.to_string()),
            UploadError::Io(err) => ApiError::Internal(format!("Upload failed: {err}")),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn app(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/task/{id}", get(task_handler))
        .route("/progress/{id}", get(progress_handler))
        .route("/cancel/{id}", post(cancel_handler))
        .route(
            "/api/products",
            get(list_products_handler).post(create_product_handler),
        )
        .route(
            "/api/products/{id}",
            get(get_product_handler)
                .put(update_product_handler)
                .delete(delete_product_handler),
        )
        .route("/products-all", delete(delete_all_handler))
        .route("/status", get(status_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %listener.local_addr()?, "catalog web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if !is_csv_path(Path::new(&file_name)) {
            return Err(ApiError::BadRequest(ONLY_CSV.to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {e}")))?;

        let staged = state.uploads.stage(&file_name, &bytes).await?;
        let task_id = match state.pool.submit(staged.path.clone(), None).await {
            Ok(task_id) => task_id,
            Err(err) => {
                if let Err(rm) = tokio::fs::remove_file(&staged.path).await {
                    warn!(path = %staged.path.display(), error = %rm, "could not discard refused upload");
                }
                return Err(err.into());
            }
        };
        info!(
            task_id,
            file = %staged.original_name,
            bytes = staged.byte_size,
            content_hash = %staged.content_hash,
            "upload accepted"
        );
        return Ok(Json(json!({ "status": "processing", "task_id": task_id })));
    }
    Err(ApiError::BadRequest(
        "No file field found in multipart data".to_string(),
    ))
}

async fn task_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
) -> ApiResult<Json<JobView>> {
    let (view, terminal) = state
        .job_view(&task_id)
        .await
        .ok_or_else(|| ApiError::NotFound(TASK_NOT_FOUND.to_string()))?;
    if terminal {
        schedule_eviction(state.registry.clone(), task_id, state.evict_grace);
    }
    Ok(Json(view))
}

async fn progress_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = stream::unfold(Some((state, task_id, true)), |cursor| async move {
        let (state, task_id, first) = cursor?;
        if !first {
            tokio::time::sleep(PROGRESS_INTERVAL).await;
        }
        let Some((view, terminal)) = state.job_view(&task_id).await else {
            let event = Event::default().json_data(json!({ "detail": TASK_NOT_FOUND }));
            return Some((event, None));
        };
        let event = Event::default().json_data(&view);
        if terminal {
            schedule_eviction(state.registry.clone(), task_id, STREAM_EVICT_DELAY);
            return Some((event, None));
        }
        Some((event, Some((state, task_id, false))))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<String>,
) -> Json<Value> {
    state.pool.cancel(&task_id).await;
    info!(task_id, "cancellation requested");
    Json(json!({ "status": "cancelled" }))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    page: Option<u32>,
    per_page: Option<u32>,
    search: Option<String>,
    active: Option<String>,
}

impl ListParams {
    fn into_query(self) -> ApiResult<ProductQuery> {
        let active = match self.active.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(v) if v.eq_ignore_ascii_case("true") => Some(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Some(false),
            Some(other) => {
                return Err(ApiError::BadRequest(format!(
                    "invalid active filter '{other}'"
                )))
            }
        };
        let defaults = ProductQuery::default();
        Ok(ProductQuery {
            page: self.page.unwrap_or(defaults.page).max(1),
            per_page: self
                .per_page
                .unwrap_or(defaults.per_page)
                .clamp(1, MAX_PER_PAGE),
            search: self.search,
            active,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreateProductBody {
    name: String,
    sku: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    active: Option<bool>,
}

async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ProductPage>> {
    let query = params.into_query()?;
    Ok(Json(state.store.list(&query).await?))
}

async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProductBody>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be blank".to_string()));
    }
    if normalize_sku(&body.sku).is_empty() {
        return Err(ApiError::BadRequest("sku must not be blank".to_string()));
    }
    let product = state
        .store
        .create(
            NewProduct::new(body.name, &body.sku, body.description)
                .with_active(body.active.unwrap_or(true)),
        )
        .await?;
    info!(id = product.id, sku = %product.sku, "product created");
    state.announce(ProductEventKind::Created, product.clone());
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<Product>> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| product_not_found(id))
}

async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
    Json(patch): Json<ProductPatch>,
) -> ApiResult<Json<Product>> {
    if patch.normalized_sku().is_some_and(|sku| sku.is_empty()) {
        return Err(ApiError::BadRequest("sku must not be blank".to_string()));
    }
    let product = state
        .store
        .update(id, patch)
        .await?
        .ok_or_else(|| product_not_found(id))?;
    info!(id, "product updated");
    state.announce(ProductEventKind::Updated, product.clone());
    Ok(Json(product))
}

async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<i64>,
) -> ApiResult<Json<Product>> {
    let product = state
        .store
        .delete(id)
        .await?
        .ok_or_else(|| product_not_found(id))?;
    info!(id, "product deleted");
    state.announce(ProductEventKind::Deleted, product.clone());
    Ok(Json(product))
}

async fn delete_all_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let deleted = state
        .store
        .delete_all()
        .await
        .map_err(|e| ApiError::Internal(format!("Delete failed: {e}")))?;
    info!(deleted, "deleted all products");
    Ok(Json(json!({
        "status": "completed",
        "deleted": deleted,
        "message": format!("Deleted {deleted} products"),
    })))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let stats = state.store.stats().await?;
    info!(
        total = stats.total_products,
        active = stats.active_products,
        inactive = stats.inactive_products,
        "database status"
    );
    Ok(Json(json!({
        "total_products": stats.total_products,
        "active_products": stats.active_products,
        "inactive_products": stats.inactive_products,
        "database_status": "connected",
        "backend": state.store.backend_name(),
    })))
}

fn product_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Product {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use catalog_core::ImportSummary;
    use catalog_import::{ImportConfig, MemoryJobRegistry};
    use catalog_storage::{MemoryProductStore, WebhookConfig};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: AppState,
        store: Arc<MemoryProductStore>,
        _dir: TempDir,
    }

    fn harness(evict_grace: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProductStore::new());
        let registry: Arc<dyn JobRegistry> = Arc::new(MemoryJobRegistry::new());
        let config = ImportConfig {
            batch_size: 2,
            ..ImportConfig::default()
        };
        let pool = Arc::new(ImportPool::new(store.clone(), registry, &config));
        let notifier = Arc::new(WebhookNotifier::new(WebhookConfig::default()).unwrap());
        let state = AppState::new(
            store.clone(),
            pool,
            UploadStore::new(dir.path().join("uploads")),
            notifier,
            evict_grace,
        );
        Harness {
            app: app(state.clone()),
            state,
            store,
            _dir: dir,
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_req(file_name: &str, csv: &str) -> Request<Body> {
        let boundary = "catalog-test-boundary";
        let payload = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n--{boundary}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_rejects_non_csv_files() {
        let h = harness(Duration::from_secs(60));
        let resp = send(&h.app, upload_req("products.txt", "name,sku\nA,a\n")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["detail"], ONLY_CSV);
    }

    #[tokio::test]
    async fn upload_runs_import_to_completion() {
        let h = harness(Duration::from_secs(60));
        let csv = "name,sku,description\nA,sku-1,d1\nB,SKU-1 ,d2\nC,sku-2,d3";
        let resp = send(&h.app, upload_req("products.csv", csv)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "processing");
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let mut view = Value::Null;
        for _ in 0..200 {
            let resp = send(&h.app, get_req(&format!("/task/{task_id}"))).await;
            assert_eq!(resp.status(), StatusCode::OK);
            view = json_body(resp).await;
            if view["state"] == "succeeded" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(view["state"], "succeeded");
        assert_eq!(view["progress"], 100);
        assert_eq!(view["imported"], 2);
        assert_eq!(view["total"], 3, "every parsed row counts, duplicates included");
        assert_eq!(view["processed"], 3);
        assert_eq!(view["status"], "Completed! 2 products imported");
        assert_eq!(h.store.find_by_sku("sku-1").await.unwrap().name, "B");
    }

    #[tokio::test]
    async fn unknown_task_is_not_found_and_cancel_is_idempotent() {
        let h = harness(Duration::from_secs(60));
        let resp = send(&h.app, get_req("/task/nope")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["detail"], TASK_NOT_FOUND);

        for _ in 0..2 {
            let req = Request::builder()
                .method("POST")
                .uri("/cancel/nope")
                .body(Body::empty())
                .unwrap();
            let resp = send(&h.app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(json_body(resp).await["status"], "cancelled");
        }
    }

    #[tokio::test]
    async fn terminal_task_is_evicted_after_grace_period() {
        let h = harness(Duration::from_millis(20));
        h.state.registry.create("done").await.unwrap();
        h.state
            .registry
            .update(
                "done",
                JobState::Failed {
                    error: "missing required column 'sku'".into(),
                },
            )
            .await;

        let resp = send(&h.app, get_req("/task/done")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let view = json_body(resp).await;
        assert_eq!(view["state"], "failed");
        assert_eq!(view["error"], "missing required column 'sku'");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let resp = send(&h.app, get_req("/task/done")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn progress_stream_ends_after_terminal_event() {
        let h = harness(Duration::from_secs(60));
        h.state.registry.create("job").await.unwrap();
        h.state
            .registry
            .update(
                "job",
                JobState::Succeeded {
                    summary: ImportSummary {
                        parsed: 3,
                        unique: 2,
                        imported: 2,
                        duplicates_in_file: 1,
                        already_present: 0,
                    },
                },
            )
            .await;

        let resp = send(&h.app, get_req("/progress/job")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events = text.matches("data:").count();
        assert_eq!(events, 1, "{text}");
        assert!(text.contains("\"state\":\"succeeded\""));
        assert!(text.contains("\"total\":3"), "{text}");

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(h.state.registry.read("job").await.is_none());
    }

    #[tokio::test]
    async fn view_reports_pending_cancellation() {
        let view = JobView::new(&JobState::running(40, "Processing..."), true);
        assert_eq!(view.status, "Cancelling...");
        assert_eq!(view.state, "running");

        let done = JobView::new(
            &JobState::Cancelled {
                imported: 4,
                processed: 4,
                total: 10,
            },
            true,
        );
        assert_eq!(done.status, "Cancelled by user");
        assert_eq!((done.imported, done.processed, done.total), (4, 4, 10));
    }

    #[tokio::test]
    async fn product_crud_round_trip() {
        let h = harness(Duration::from_secs(60));
        let resp = send(
            &h.app,
            json_req(
                "POST",
                "/api/products",
                json!({"name": "Widget", "sku": " WID-1 ", "description": "blue"}),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = json_body(resp).await;
        assert_eq!(created["sku"], "wid-1");
        let id = created["id"].as_i64().unwrap();

        let resp = send(
            &h.app,
            json_req("POST", "/api/products", json!({"name": "Other", "sku": "wid-1"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(
            &h.app,
            json_req("PUT", &format!("/api/products/{id}"), json!({"active": false})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["active"], false);

        let resp = send(&h.app, get_req("/api/products?active=false&search=widg")).await;
        let page = json_body(resp).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["products"][0]["id"], id);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/products/{id}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, req).await.status(), StatusCode::OK);

        let resp = send(&h.app, get_req(&format!("/api/products/{id}"))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_to_taken_sku_conflicts() {
        let h = harness(Duration::from_secs(60));
        for sku in ["a-1", "b-1"] {
            let resp = send(
                &h.app,
                json_req("POST", "/api/products", json!({"name": sku, "sku": sku})),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }
        let b = h.store.find_by_sku("b-1").await.unwrap();
        let resp = send(
            &h.app,
            json_req("PUT", &format!("/api/products/{}", b.id), json!({"sku": "A-1"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(
            &h.app,
            json_req("PUT", "/api/products/9999", json!({"name": "ghost"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_list_filter_is_bad_request() {
        let h = harness(Duration::from_secs(60));
        let resp = send(&h.app, get_req("/api/products?active=maybe")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_and_delete_all() {
        let h = harness(Duration::from_secs(60));
        for (sku, active) in [("a", true), ("b", true), ("c", false)] {
            let resp = send(
                &h.app,
                json_req(
                    "POST",
                    "/api/products",
                    json!({"name": sku, "sku": sku, "active": active}),
                ),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let status = json_body(send(&h.app, get_req("/status")).await).await;
        assert_eq!(status["total_products"], 3);
        assert_eq!(status["active_products"], 2);
        assert_eq!(status["inactive_products"], 1);
        assert_eq!(status["database_status"], "connected");

        let req = Request::builder()
            .method("DELETE")
            .uri("/products-all")
            .body(Body::empty())
            .unwrap();
        let body = json_body(send(&h.app, req).await).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["deleted"], 3);
        assert_eq!(body["message"], "Deleted 3 products");
        assert!(h.store.all().await.is_empty());
    }
}
