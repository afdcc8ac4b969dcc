use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use catalog_core::JobState;
use catalog_import::{ImportConfig, ImportPool, Importer, JobRegistry, MemoryJobRegistry};
use catalog_storage::{
    MemoryProductStore, PgProductStore, ProductStore, UploadStore, WebhookConfig, WebhookNotifier,
};
use catalog_web::{AppState, WebConfig};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "catalog-cli")]
#[command(about = "Catalog importer command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve,
    /// Apply database migrations.
    Migrate,
    /// Import one CSV file in the foreground. Ctrl-C cancels between batches.
    Import {
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Allow importing into the in-memory store, which is discarded on exit.
        #[arg(long)]
        ephemeral: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await?,
        Commands::Migrate => {
            let url = database_url().context("DATABASE_URL must be set to run migrations")?;
            let store = PgProductStore::connect(&url, 1).await?;
            store.migrate().await.context("running migrations")?;
            println!("migrations applied");
        }
        Commands::Import {
            file,
            batch_size,
            ephemeral,
        } => import_file(file, batch_size, ephemeral).await?,
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CATALOG_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()?;
    }
    Ok(())
}

fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

async fn build_store() -> Result<Arc<dyn ProductStore>> {
    let Some(url) = database_url() else {
        warn!("DATABASE_URL not set; products are kept in memory only");
        return Ok(Arc::new(MemoryProductStore::new()));
    };
    let max_connections = std::env::var("CATALOG_DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(10);
    let store = PgProductStore::connect(&url, max_connections).await?;
    store.migrate().await.context("running migrations")?;
    info!(max_connections, "using postgres product store");
    Ok(Arc::new(store))
}

async fn serve() -> Result<()> {
    let web = WebConfig::from_env();
    let import = ImportConfig::from_env();
    let store = build_store().await?;
    let registry: Arc<dyn JobRegistry> = Arc::new(MemoryJobRegistry::new());
    let pool = Arc::new(ImportPool::new(store.clone(), registry, &import));
    let notifier = Arc::new(WebhookNotifier::new(WebhookConfig::from_env())?);

    info!(
        bind = %web.bind,
        upload_dir = %web.upload_dir.display(),
        workers = import.workers,
        batch_size = import.batch_size,
        admission = ?import.admission,
        webhooks = notifier.endpoints().len(),
        backend = store.backend_name(),
        "starting catalog importer"
    );

    let state = AppState::new(
        store,
        pool,
        UploadStore::new(web.upload_dir.clone()),
        notifier,
        import.evict_grace,
    )
    .with_upload_limit(web.max_upload_bytes);
    catalog_web::serve(state, &web.bind).await
}

/// A foreground import into a store that dies with the process is almost always a mistake.
fn ensure_durable(backend: &str, ephemeral: bool) -> Result<()> {
    if backend != "memory" {
        return Ok(());
    }
    if !ephemeral {
        bail!("DATABASE_URL is not set; imported rows would be lost on exit (pass --ephemeral to import anyway)");
    }
    warn!("importing into the in-memory store; rows are discarded when the command exits");
    Ok(())
}

/// Drop the staged copy of an import that did not finish.
async fn discard_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "could not remove staged import file"),
    }
}

async fn import_file(file: PathBuf, batch_size: Option<usize>, ephemeral: bool) -> Result<()> {
    let config = ImportConfig::from_env();
    let store = build_store().await?;
    ensure_durable(store.backend_name(), ephemeral)?;

    // Import a staged copy; a successful run removes its source.
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let uploads = UploadStore::new(WebConfig::from_env().upload_dir);
    let staged = uploads
        .stage(&file.to_string_lossy(), &bytes)
        .await
        .context("staging import file")?;

    let registry = MemoryJobRegistry::new();
    let job_id = Uuid::new_v4().to_string();
    registry.create(&job_id).await?;
    let cancel = registry.cancellation_token(&job_id).await;
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling after the current batch");
            interrupt.cancel();
        }
    });

    let importer = Importer::new(store, batch_size.unwrap_or(config.batch_size));
    let outcome = importer
        .run(&staged.path, &job_id, &registry, &cancel)
        .await;

    match outcome {
        JobState::Succeeded { summary } => println!(
            "import complete: parsed={} unique={} imported={} duplicates_in_file={} already_present={}",
            summary.parsed,
            summary.unique,
            summary.imported,
            summary.duplicates_in_file,
            summary.already_present
        ),
        JobState::Cancelled {
            imported,
            processed,
            total,
        } => {
            discard_staged(&staged.path).await;
            println!("import cancelled: imported={imported} processed={processed}/{total}");
        }
        JobState::Failed { error } => {
            discard_staged(&staged.path).await;
            bail!("import failed: {error}");
        }
        other => {
            discard_staged(&staged.path).await;
            bail!("import stopped in a non-terminal state: {other:?}");
        }
    }
    Ok(())
}
