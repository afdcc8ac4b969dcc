//! CSV product import pipeline: parse, dedup, batched writes, progress and cancellation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{ImportRow, ImportSummary, JobState};
use catalog_storage::{ProductStore, StorageError};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{oneshot, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Share of the progress bar reserved for loading and preprocessing.
const PREPARE_PROGRESS: usize = 10;
const BATCH_PROGRESS_SPAN: usize = 85;
const MAX_RUNNING_PROGRESS: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Refuse new jobs while every worker is busy.
    Reject,
    /// Park up to `max_queued` jobs until a worker frees up.
    Queue { max_queued: usize },
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub workers: usize,
    pub admission: AdmissionPolicy,
    pub job_timeout: Option<Duration>,
    pub evict_grace: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 2,
            admission: AdmissionPolicy::Queue { max_queued: 16 },
            job_timeout: None,
            evict_grace: Duration::from_secs(60),
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_queued = env_parse("CATALOG_IMPORT_MAX_QUEUED").unwrap_or(16);
        let admission = match std::env::var("CATALOG_IMPORT_ADMISSION") {
            Ok(v) if v.eq_ignore_ascii_case("reject") => AdmissionPolicy::Reject,
            _ => AdmissionPolicy::Queue { max_queued },
        };
        Self {
            batch_size: env_parse("CATALOG_IMPORT_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            workers: env_parse("CATALOG_IMPORT_WORKERS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.workers),
            admission,
            job_timeout: env_parse("CATALOG_IMPORT_TIMEOUT_SECS").map(Duration::from_secs),
            evict_grace: env_parse("CATALOG_JOB_EVICT_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.evict_grace),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read source file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("blank SKU on line {line}")]
    BlankSku { line: u64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("parser task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Parse a whole CSV document. `name` and `sku` columns are required,
/// `description` is optional and defaults to an empty string.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<ImportRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let name_idx = column("name").ok_or(ImportError::MissingColumn("name"))?;
    let sku_idx = column("sku").ok_or(ImportError::MissingColumn("sku"))?;
    let description_idx = column("description");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let sku = record.get(sku_idx).unwrap_or_default();
        if sku.trim().is_empty() {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(ImportError::BlankSku { line });
        }
        let description = description_idx
            .and_then(|idx| record.get(idx))
            .unwrap_or_default();
        rows.push(ImportRow::new(
            record.get(name_idx).unwrap_or_default(),
            sku,
            description,
        ));
    }
    Ok(rows)
}

/// Drop rows whose SKU reappears later in the file. Survivors keep the file
/// order of their last occurrence. Returns the kept rows and the drop count.
pub fn dedup_last_wins(rows: Vec<ImportRow>) -> (Vec<ImportRow>, usize) {
    let mut last_seen: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        last_seen.insert(row.sku.as_str(), idx);
    }
    let keep = last_seen.into_values().collect::<HashSet<_>>();
    let dropped = rows.len() - keep.len();

    let kept = rows
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, row)| row)
        .collect();
    (kept, dropped)
}

/// Running percentage after `processed` of `total` rows, capped at 95.
pub fn batch_progress(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return MAX_RUNNING_PROGRESS;
    }
    let pct = processed.min(total) * BATCH_PROGRESS_SPAN / total + PREPARE_PROGRESS;
    (pct as u8).min(MAX_RUNNING_PROGRESS)
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job {0} already exists")]
    DuplicateJob(String),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("job {0} has not reached a terminal state")]
    NotTerminal(String),
}

/// Process-wide view of import jobs.
///
/// Only the worker that owns a job writes its state; readers may call
/// `read` at any time.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    async fn create_with(&self, job_id: &str, initial: JobState) -> Result<(), RegistryError>;

    async fn create(&self, job_id: &str) -> Result<(), RegistryError> {
        self.create_with(job_id, JobState::starting()).await
    }

    /// Last write wins. Writes after a terminal state are ignored.
    async fn update(&self, job_id: &str, state: JobState);

    async fn read(&self, job_id: &str) -> Option<JobState>;

    /// Idempotent; a no-op for unknown or finished jobs.
    async fn request_cancellation(&self, job_id: &str);

    async fn is_cancel_requested(&self, job_id: &str) -> bool;

    /// Handle the worker polls between batches.
    async fn cancellation_token(&self, job_id: &str) -> CancellationToken;

    /// Remove a job whose terminal state has already been delivered.
    async fn evict(&self, job_id: &str) -> Result<JobState, RegistryError>;
}

#[derive(Debug)]
struct JobEntry {
    state: JobState,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl MemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for MemoryJobRegistry {
    async fn create_with(&self, job_id: &str, initial: JobState) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(RegistryError::DuplicateJob(job_id.to_string()));
        }
        jobs.insert(
            job_id.to_string(),
            JobEntry {
                state: initial,
                cancel: CancellationToken::new(),
            },
        );
        Ok(())
    }

    async fn update(&self, job_id: &str, state: JobState) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(entry) if entry.state.is_terminal() => {
                warn!(job_id, "ignoring update to finished job");
            }
            Some(entry) => entry.state = state,
            None => warn!(job_id, "ignoring update to unknown job"),
        }
    }

    async fn read(&self, job_id: &str) -> Option<JobState> {
        self.jobs.read().await.get(job_id).map(|e| e.state.clone())
    }

    async fn request_cancellation(&self, job_id: &str) {
        if let Some(entry) = self.jobs.read().await.get(job_id) {
            entry.cancel.cancel();
        }
    }

    async fn is_cancel_requested(&self, job_id: &str) -> bool {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|e| e.cancel.is_cancelled())
            .unwrap_or(false)
    }

    async fn cancellation_token(&self, job_id: &str) -> CancellationToken {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|e| e.cancel.clone())
            .unwrap_or_default()
    }

    async fn evict(&self, job_id: &str) -> Result<JobState, RegistryError> {
        let mut jobs = self.jobs.write().await;
        let terminal = jobs
            .get(job_id)
            .map(|e| e.state.is_terminal())
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;
        if !terminal {
            return Err(RegistryError::NotTerminal(job_id.to_string()));
        }
        jobs.remove(job_id)
            .map(|e| e.state)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }
}

/// Evict `job_id` after `delay`; for readers that already delivered the terminal state.
pub fn schedule_eviction(registry: Arc<dyn JobRegistry>, job_id: String, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match registry.evict(&job_id).await {
            Ok(_) | Err(RegistryError::NotFound(_)) => {}
            Err(err) => warn!(job_id, error = %err, "scheduled eviction skipped"),
        }
    });
}

pub struct Importer {
    store: Arc<dyn ProductStore>,
    batch_size: usize,
}

impl Importer {
    pub fn new(store: Arc<dyn ProductStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one import to a terminal state, which is also published to `registry`.
    pub async fn run(
        &self,
        source: &Path,
        job_id: &str,
        registry: &dyn JobRegistry,
        cancel: &CancellationToken,
    ) -> JobState {
        let span = info_span!("import", job_id, source = %source.display());
        let outcome = self
            .execute(source, job_id, registry, cancel)
            .instrument(span)
            .await;
        let state = match outcome {
            Ok(state) => state,
            Err(err) => {
                error!(job_id, error = %err, "import failed");
                JobState::Failed {
                    error: err.to_string(),
                }
            }
        };
        registry.update(job_id, state.clone()).await;
        state
    }

    async fn execute(
        &self,
        source: &Path,
        job_id: &str,
        registry: &dyn JobRegistry,
        cancel: &CancellationToken,
    ) -> Result<JobState, ImportError> {
        registry
            .update(job_id, JobState::running(5, "Loading CSV..."))
            .await;
        let bytes = fs::read(source).await?;
        let rows = tokio::task::spawn_blocking(move || parse_csv(&bytes)).await??;
        let parsed = rows.len();
        info!(parsed, "loaded CSV");

        registry
            .update(job_id, JobState::running(10, "Preprocessing data..."))
            .await;
        let (rows, duplicates_in_file) = dedup_last_wins(rows);
        let total = rows.len();
        let mut existing = self.store.existing_skus().await?;

        let mut imported = 0usize;
        let mut already_present = 0usize;
        let mut processed = 0usize;
        let mut remaining = rows.into_iter();

        loop {
            let batch = remaining.by_ref().take(self.batch_size).collect::<Vec<_>>();
            if batch.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                info!(processed, total, imported, "import cancelled");
                return Ok(JobState::Cancelled {
                    imported,
                    processed,
                    total,
                });
            }

            processed += batch.len();
            let mut staged = Vec::with_capacity(batch.len());
            for row in batch {
                if existing.insert(row.sku.clone()) {
                    staged.push(row.into_new_product());
                } else {
                    already_present += 1;
                }
            }

            let write = self.store.insert_batch(&staged).await?;
            imported += write.inserted;
            already_present += write.conflicts();
            if write.conflicts() > 0 {
                warn!(conflicts = write.conflicts(), "rows lost a SKU race at commit");
            }

            let progress = batch_progress(processed, total);
            registry
                .update(
                    job_id,
                    JobState::Running {
                        progress,
                        status: format!("Processing... {processed}/{total} ({imported} imported)"),
                        processed,
                        total,
                        imported,
                    },
                )
                .await;
            info!(progress, processed, total, imported, "batch committed");
        }

        if let Err(err) = fs::remove_file(source).await {
            warn!(error = %err, "could not remove imported source file");
        }

        let summary = ImportSummary {
            parsed,
            unique: total,
            imported,
            duplicates_in_file,
            already_present,
        };
        info!(imported, parsed, "import completed");
        Ok(JobState::Succeeded { summary })
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("only CSV files are accepted: {0}")]
    NotCsv(PathBuf),
    #[error("import workers are saturated")]
    Saturated,
    #[error("import worker stopped before the job was registered")]
    WorkerLost,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Bounded set of background import workers.
pub struct ImportPool {
    importer: Arc<Importer>,
    registry: Arc<dyn JobRegistry>,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    admission: AdmissionPolicy,
    job_timeout: Option<Duration>,
}

impl ImportPool {
    pub fn new(store: Arc<dyn ProductStore>, registry: Arc<dyn JobRegistry>, config: &ImportConfig) -> Self {
        Self {
            importer: Arc::new(Importer::new(store, config.batch_size)),
            registry,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            queued: Arc::new(AtomicUsize::new(0)),
            admission: config.admission,
            job_timeout: config.job_timeout,
        }
    }

    pub fn registry(&self) -> Arc<dyn JobRegistry> {
        self.registry.clone()
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Register a job for `source` and start it in the background.
    ///
    /// The only suspension point comes after the worker task has been spawned
    /// and owns the claimed permit or queue slot, so dropping this future
    /// cannot leak either one or strand a half-registered job.
    pub async fn submit(&self, source: PathBuf, job_id: Option<String>) -> Result<String, SubmitError> {
        if !is_csv_path(&source) {
            return Err(SubmitError::NotCsv(source));
        }
        let job_id = job_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let admission = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Admission::Started(permit),
            Err(_) => {
                let AdmissionPolicy::Queue { max_queued } = self.admission else {
                    return Err(SubmitError::Saturated);
                };
                self.queued
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < max_queued).then_some(n + 1)
                    })
                    .map_err(|_| SubmitError::Saturated)?;
                Admission::Queued(QueueSlot(self.queued.clone()))
            }
        };
        let waiting = matches!(admission, Admission::Queued(_));

        let task = JobTask {
            importer: self.importer.clone(),
            registry: self.registry.clone(),
            permits: self.permits.clone(),
            timeout: self.job_timeout,
            job_id: job_id.clone(),
            source,
        };
        let (registered_tx, registered) = oneshot::channel();
        tokio::spawn(task.run(admission, registered_tx));

        registered.await.map_err(|_| SubmitError::WorkerLost)??;
        if waiting {
            info!(job_id, "import queued");
        } else {
            info!(job_id, "import started");
        }
        Ok(job_id)
    }

    pub async fn status(&self, job_id: &str) -> Option<JobState> {
        self.registry.read(job_id).await
    }

    pub async fn cancel(&self, job_id: &str) {
        self.registry.request_cancellation(job_id).await;
    }
}

/// How a submitted job got past admission.
enum Admission {
    Started(OwnedSemaphorePermit),
    Queued(QueueSlot),
}

/// A claimed place in the wait queue, given back on drop.
struct QueueSlot(Arc<AtomicUsize>);

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct JobTask {
    importer: Arc<Importer>,
    registry: Arc<dyn JobRegistry>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
    job_id: String,
    source: PathBuf,
}

impl JobTask {
    async fn run(self, admission: Admission, registered: oneshot::Sender<Result<(), RegistryError>>) {
        let Self {
            importer,
            registry,
            permits,
            timeout,
            job_id,
            source,
        } = self;

        let initial = match admission {
            Admission::Started(_) => JobState::starting(),
            Admission::Queued(_) => JobState::queued(),
        };
        if let Err(err) = registry.create_with(&job_id, initial).await {
            drop(admission);
            let _ = registered.send(Err(err));
            return;
        }
        let _ = registered.send(Ok(()));

        let permit = match admission {
            Admission::Started(permit) => permit,
            Admission::Queued(slot) => {
                let permit = permits.acquire_owned().await;
                drop(slot);
                let Ok(permit) = permit else {
                    registry
                        .update(&job_id, JobState::Failed { error: "import workers shut down".into() })
                        .await;
                    return;
                };
                if registry.is_cancel_requested(&job_id).await {
                    registry
                        .update(&job_id, JobState::Cancelled { imported: 0, processed: 0, total: 0 })
                        .await;
                    return;
                }
                registry.update(&job_id, JobState::starting()).await;
                permit
            }
        };

        run_job(&importer, registry, &job_id, &source, timeout).await;
        drop(permit);
    }
}

async fn run_job(
    importer: &Importer,
    registry: Arc<dyn JobRegistry>,
    job_id: &str,
    source: &Path,
    timeout: Option<Duration>,
) {
    let cancel = registry.cancellation_token(job_id).await;
    let run = importer.run(source, job_id, registry.as_ref(), &cancel);
    match timeout {
        Some(limit) => {
            if tokio::time::timeout(limit, run).await.is_err() {
                warn!(job_id, timeout = ?limit, "import timed out");
                registry
                    .update(
                        job_id,
                        JobState::Failed {
                            error: format!("import timed out after {limit:?}"),
                        },
                    )
                    .await;
            }
        }
        None => {
            run.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_missing_description_and_loose_headers() {
        let rows = parse_csv(b" Name , SKU \nWidget, ABC-1 \n").unwrap();
        assert_eq!(rows, vec![ImportRow::new("Widget", "abc-1", "")]);
    }

    #[test]
    fn parse_rejects_missing_required_column() {
        let err = parse_csv(b"name,description\nA,d\n").unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("sku")));

        let err = parse_csv(b"").unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("name")));
    }

    #[test]
    fn parse_rejects_blank_sku_with_line_number() {
        let err = parse_csv(b"name,sku\nA,a-1\nB,   \n").unwrap_err();
        assert!(matches!(err, ImportError::BlankSku { line: 3 }));
    }

    #[test]
    fn parse_rejects_ragged_rows() {
        let err = parse_csv(b"name,sku,description\nA,a-1\n").unwrap_err();
        assert!(matches!(err, ImportError::Csv(_)));
    }

    #[test]
    fn dedup_keeps_last_occurrence_in_file_order() {
        let rows = vec![
            ImportRow::new("A", "sku-1", "d1"),
            ImportRow::new("C", "sku-2", "d3"),
            ImportRow::new("B", "SKU-1 ", "d2"),
        ];
        let (kept, dropped) = dedup_last_wins(rows);
        assert_eq!(dropped, 1);
        assert_eq!(
            kept,
            vec![
                ImportRow::new("C", "sku-2", "d3"),
                ImportRow::new("B", "sku-1", "d2"),
            ]
        );
    }

    #[test]
    fn progress_is_monotonic_and_capped() {
        let total = 12_345;
        let mut last = 0;
        for processed in (0..=total).step_by(500).chain([total]) {
            let p = batch_progress(processed, total);
            assert!(p >= last);
            assert!(p <= 95);
            last = p;
        }
        assert_eq!(batch_progress(total, total), 95);
        assert_eq!(batch_progress(0, 100), 10);
        assert_eq!(batch_progress(0, 0), 95);
    }

    #[tokio::test]
    async fn registry_rejects_duplicate_jobs() {
        let registry = MemoryJobRegistry::new();
        registry.create("job-1").await.unwrap();
        let err = registry.create("job-1").await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateJob(_)));
        assert_eq!(registry.read("job-1").await, Some(JobState::starting()));
    }

    #[tokio::test]
    async fn registry_freezes_terminal_states() {
        let registry = MemoryJobRegistry::new();
        registry.create("job-1").await.unwrap();
        let done = JobState::Succeeded {
            summary: ImportSummary::default(),
        };
        registry.update("job-1", done.clone()).await;
        registry.update("job-1", JobState::running(50, "late")).await;
        assert_eq!(registry.read("job-1").await, Some(done));
    }

    #[tokio::test]
    async fn registry_evicts_only_terminal_jobs() {
        let registry = MemoryJobRegistry::new();
        registry.create("job-1").await.unwrap();
        assert!(matches!(
            registry.evict("job-1").await,
            Err(RegistryError::NotTerminal(_))
        ));

        registry
            .update("job-1", JobState::Failed { error: "x".into() })
            .await;
        assert!(registry.evict("job-1").await.is_ok());
        assert!(registry.read("job-1").await.is_none());
        assert!(matches!(
            registry.evict("job-1").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_is_idempotent_and_tolerates_unknown_jobs() {
        let registry = MemoryJobRegistry::new();
        registry.request_cancellation("ghost").await;
        assert!(!registry.is_cancel_requested("ghost").await);

        registry.create("job-1").await.unwrap();
        let token = registry.cancellation_token("job-1").await;
        registry.request_cancellation("job-1").await;
        registry.request_cancellation("job-1").await;
        assert!(token.is_cancelled());
        assert!(registry.is_cancel_requested("job-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_eviction_removes_finished_job() {
        let registry: Arc<dyn JobRegistry> = Arc::new(MemoryJobRegistry::new());
        registry.create("job-1").await.unwrap();
        registry
            .update("job-1", JobState::Cancelled { imported: 0, processed: 0, total: 0 })
            .await;

        schedule_eviction(registry.clone(), "job-1".into(), Duration::from_secs(1));
        assert!(registry.read("job-1").await.is_some());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.read("job-1").await.is_none());
    }

    #[test]
    fn csv_detection_uses_extension() {
        assert!(is_csv_path(Path::new("/tmp/products.CSV")));
        assert!(!is_csv_path(Path::new("/tmp/products.txt")));
        assert!(!is_csv_path(Path::new("/tmp/products")));
    }
}
