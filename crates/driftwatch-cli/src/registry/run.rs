use std::collections::BTreeMap;
use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use driftwatch_core::{DriftReport, RedactedConnection};
use driftwatch_etl::{JobResult, MetricSummary};
use serde::Serialize;

use super::{RegistryError, RegistryResult};
use crate::settings::Settings;

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub strict: bool,
    pub dry_run: bool,
    pub run_dir: PathBuf,
    pub settings: Settings,
    pub connection: RedactedConnection,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    run_id: &'a str,
    started_at: String,
    command: &'a str,
    strict: bool,
    dry_run: bool,
    settings: Settings,
    connection: &'a RedactedConnection,
    git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
struct GitInfo {
    commit: Option<String>,
    dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub job_result_path: PathBuf,
    pub drift_report_path: PathBuf,
    pub metrics_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        command: &ctx.command,
        strict: ctx.strict,
        dry_run: ctx.dry_run,
        settings: ctx.settings.redacted(),
        connection: &ctx.connection,
        git: collect_git_info(),
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        logs_path,
        job_result_path: root.join("job_result.json"),
        drift_report_path: root.join("drift_report.json"),
        metrics_path: root.join("metrics.json"),
        root,
    })
}

pub fn write_job_result(paths: &RunPaths, result: &JobResult) -> RegistryResult<()> {
    write_json(&paths.job_result_path, result)
}

pub fn write_drift_report(paths: &RunPaths, report: &DriftReport) -> RegistryResult<()> {
    write_json(&paths.drift_report_path, report)
}

pub fn write_metrics(
    paths: &RunPaths,
    metrics: &BTreeMap<String, MetricSummary>,
) -> RegistryResult<()> {
    write_json(&paths.metrics_path, metrics)
}

fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::redact_connection_string;

    fn context(run_dir: &Path) -> RunContext {
        let mut settings = Settings::default();
        settings.database.password = "hunter2".to_string();
        RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            command: "run".to_string(),
            strict: false,
            dry_run: true,
            run_dir: run_dir.to_path_buf(),
            connection: redact_connection_string(&settings.display_url()),
            settings,
        }
    }

    #[test]
    fn start_run_writes_redacted_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = start_run(&context(dir.path())).expect("start run");

        assert!(paths.root.starts_with(dir.path()));
        assert!(
            paths
                .root
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with("__run_abc"))
        );
        assert!(paths.logs_path.exists());

        let config = std::fs::read_to_string(paths.root.join("config.json")).expect("config");
        assert!(!config.contains("hunter2"));
        let parsed: serde_json::Value = serde_json::from_str(&config).expect("json");
        assert_eq!(parsed["command"], "run");
        assert_eq!(parsed["settings"]["database"]["password"], "***");
        assert_eq!(parsed["dry_run"], true);
    }

    #[test]
    fn metrics_are_written_as_json() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = start_run(&context(dir.path())).expect("start run");
        write_metrics(&paths, &BTreeMap::new()).expect("write metrics");
        let written = std::fs::read_to_string(&paths.metrics_path).expect("metrics");
        assert_eq!(written.trim(), "{}");
    }
}
