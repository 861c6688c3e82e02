mod registry;
mod settings;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use driftwatch_core::{
    ColumnDriftDetector, SchemaMap, SchemaValidator, ValidationError, redact_connection_string,
};
use driftwatch_etl::{
    AlertNotifier, CkanClient, ConsoleNotifier, FetchError, PERMITS_TABLE, PerformanceMetrics,
    PermitsJob, PermitsJobConfig, TransformError, default_pipeline, load_file,
};
use driftwatch_store::{
    InMemoryJobHistory, InMemoryPermitStore, InMemorySchemaStore, JobHistory, PermitStore,
    PostgresStore, SchemaStore, StoreError, connect_with,
};
use registry::{
    RunContext, init_logging, start_run, write_drift_report, write_job_result, write_metrics,
};
use settings::{Settings, SettingsError};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid baseline file: {0}")]
    Baseline(#[from] serde_json::Error),
    #[error("job failed: {0}")]
    JobFailed(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "driftwatch",
    version,
    about = "Schema drift detection for open-data ETL"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, clean, check for drift and load the permits dataset.
    Run(RunArgs),
    /// Classify a local CSV or JSON file against a baseline schema.
    Validate(ValidateArgs),
    /// Print the recorded column history of a table.
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Settings file (defaults to ./driftwatch.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Fail the run on any schema drift.
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Use in-memory stores instead of Postgres.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// CSV or JSON file to check.
    file: PathBuf,
    /// Table whose baseline applies.
    #[arg(long, default_value = PERMITS_TABLE)]
    table: String,
    /// JSON object of `column -> type` to compare against. When absent the
    /// active schema is read from the database.
    #[arg(long)]
    baseline: Option<PathBuf>,
    /// Fail on any drift.
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Run the cleaning pipeline before classifying.
    #[arg(long, default_value_t = false)]
    clean: bool,
    /// Settings file used for the database connection.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Table to inspect.
    #[arg(default_value = PERMITS_TABLE)]
    table: String,
    /// Settings file used for the database connection.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run_job(args).await,
        Command::Validate(args) => run_validate(args).await,
        Command::Schema(args) => run_schema(args).await,
    }
}

struct Stores {
    schema: Arc<dyn SchemaStore>,
    permits: Arc<dyn PermitStore>,
    history: Arc<dyn JobHistory>,
}

async fn open_stores(settings: &Settings, dry_run: bool) -> Result<Stores, CliError> {
    if dry_run {
        info!(event = "stores_opened", backend = "memory");
        return Ok(Stores {
            schema: Arc::new(InMemorySchemaStore::new()),
            permits: Arc::new(InMemoryPermitStore::new()),
            history: Arc::new(InMemoryJobHistory::new()),
        });
    }

    let store = open_postgres(settings).await?;
    Ok(Stores {
        schema: store.clone(),
        permits: store.clone(),
        history: store,
    })
}

async fn open_postgres(settings: &Settings) -> Result<Arc<PostgresStore>, CliError> {
    let redacted = redact_connection_string(&settings.display_url());
    let pool = connect_with(settings.connect_options(), settings.database.max_connections).await?;
    let store = PostgresStore::new(pool);
    store.migrate().await?;
    info!(
        event = "stores_opened",
        backend = "postgres",
        host = redacted.host.as_deref().unwrap_or(""),
        database = redacted.database.as_deref().unwrap_or("")
    );
    Ok(Arc::new(store))
}

async fn run_job(args: RunArgs) -> Result<(), CliError> {
    let RunArgs {
        config,
        strict,
        dry_run,
        run_dir,
    } = args;

    let settings = Settings::load(config.as_deref())?;
    let strict = strict || settings.etl.strict_mode;

    let ctx = RunContext {
        run_id: Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        command: "run".to_string(),
        strict,
        dry_run,
        run_dir,
        connection: redact_connection_string(&settings.display_url()),
        settings: settings.clone(),
    };
    let paths = start_run(&ctx)?;
    init_logging(&settings.logging, Some(&paths.logs_path))?;
    info!(
        event = "run_started",
        run_id = %ctx.run_id,
        strict,
        dry_run,
        run_path = %paths.root.display()
    );

    let source = CkanClient::new(settings.ckan_config()?)?;
    let stores = open_stores(&settings, dry_run).await?;
    let notifier = notifier(&settings);
    let metrics = PerformanceMetrics::shared();

    let job = PermitsJob::new(
        Box::new(source),
        stores.schema,
        stores.permits,
        notifier,
        metrics.clone(),
    )
    .with_history(stores.history)
    .with_validator(ColumnDriftDetector::with_strict_mode(strict))
    .with_config(PermitsJobConfig {
        skip_transform_errors: settings.etl.skip_transform_errors,
        ..PermitsJobConfig::default()
    });

    let result = job.execute().await;

    write_job_result(&paths, &result)?;
    if let Some(report) = &result.drift_report {
        write_drift_report(&paths, report)?;
    }
    write_metrics(&paths, &metrics.snapshot())?;
    metrics.log_summary();

    println!("{result}");
    if let Some(report) = &result.drift_report {
        println!("{report}");
    }
    println!("Run artifacts: {}", paths.root.display());

    if result.is_success() {
        info!(event = "run_finished", status = result.status.as_str());
        Ok(())
    } else {
        Err(CliError::JobFailed(
            result
                .error_message
                .unwrap_or_else(|| result.status.as_str().to_string()),
        ))
    }
}

fn notifier(settings: &Settings) -> Arc<dyn AlertNotifier> {
    match &settings.logging.alerts_file {
        Some(path) => Arc::new(ConsoleNotifier::with_log_file(path)),
        None => Arc::new(ConsoleNotifier::new()),
    }
}

async fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    let ValidateArgs {
        file,
        table,
        baseline,
        strict,
        clean,
        config,
    } = args;

    let settings = Settings::load(config.as_deref())?;
    init_logging(&settings.logging, None)?;

    let mut batch = load_file(&file)?;
    if clean {
        batch = default_pipeline().transform(&batch, true)?;
    }

    let expected = match baseline {
        Some(path) => Some(read_baseline(&path)?),
        None => {
            let store = open_postgres(&settings).await?;
            let labels = store.get_active_schema(&table).await?;
            if labels.is_empty() {
                None
            } else {
                Some(SchemaMap::from_labels(&labels))
            }
        }
    };
    if expected.is_none() {
        warn!(event = "no_baseline", table = %table, "no baseline recorded; every column is new");
    }

    let detector = ColumnDriftDetector::with_strict_mode(strict);
    match detector.validate(&batch, &table, expected.as_ref()) {
        Ok(report) => {
            println!("{report}");
            Ok(())
        }
        Err(err) => {
            println!("{}", err.report());
            Err(err.into())
        }
    }
}

fn read_baseline(path: &Path) -> Result<SchemaMap, CliError> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let labels: BTreeMap<String, String> = serde_json::from_str(&content)?;
    Ok(SchemaMap::from_labels(&labels))
}

async fn run_schema(args: SchemaArgs) -> Result<(), CliError> {
    let settings = Settings::load(args.config.as_deref())?;
    init_logging(&settings.logging, None)?;

    let store = open_postgres(&settings).await?;
    let history = store.column_history(&args.table).await?;
    if history.is_empty() {
        println!("No schema recorded for '{}'", args.table);
        return Ok(());
    }

    println!("Schema history for '{}':", args.table);
    for record in history {
        println!(
            "  {:<32} {:<10} {:<8} {}",
            record.column_name,
            record.data_type,
            record.status.as_str(),
            record.discovered_at.to_rfc3339()
        );
    }
    Ok(())
}
