use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use driftwatch_etl::CkanConfig;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

/// Settings file picked up from the working directory when `--config` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "driftwatch.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },
    #[error("missing setting: {0}")]
    Missing(String),
}

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CkanSettings {
    pub base_url: String,
    pub resource_id: String,
    pub timeout_secs: u64,
}

impl Default for CkanSettings {
    fn default() -> Self {
        Self {
            base_url: "https://ckan0.cf.opendata.inter.prod-toronto.ca".to_string(),
            resource_id: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "driftwatch".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    pub alerts_file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            alerts_file: Some(PathBuf::from("logs/alerts.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlSettings {
    pub batch_size: usize,
    pub max_records: Option<usize>,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub strict_mode: bool,
    pub skip_transform_errors: bool,
}

impl Default for EtlSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_records: None,
            max_retries: 3,
            retry_delay_secs: 5,
            strict_mode: false,
            skip_transform_errors: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ckan: CkanSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub etl: EtlSettings,
}

impl Settings {
    /// Load settings from `path`, or from `driftwatch.toml` when present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> SettingsResult<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_SETTINGS_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Override individual keys from the environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> SettingsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CKAN_BASE_URL") {
            self.ckan.base_url = value;
        }
        if let Some(value) = lookup("CKAN_RESOURCE_ID") {
            self.ckan.resource_id = value;
        }
        if let Some(value) = lookup("DB_HOST") {
            self.database.host = value;
        }
        if let Some(value) = lookup("DB_PORT") {
            self.database.port = parse_env("DB_PORT", &value)?;
        }
        if let Some(value) = lookup("DB_NAME") {
            self.database.name = value;
        }
        if let Some(value) = lookup("DB_USER") {
            self.database.user = value;
        }
        if let Some(value) = lookup("DB_PASSWORD") {
            self.database.password = value;
        }
        if let Some(value) = lookup("LOG_LEVEL") {
            self.logging.level = value.to_ascii_lowercase();
        }
        if let Some(value) = lookup("LOG_FORMAT") {
            self.logging.format = parse_env("LOG_FORMAT", &value)?;
        }
        if let Some(value) = lookup("ETL_STRICT_MODE") {
            self.etl.strict_mode = parse_bool("ETL_STRICT_MODE", &value)?;
        }
        Ok(())
    }

    /// Connection options with the password passed as-is, never embedded in
    /// a URL.
    pub fn connect_options(&self) -> PgConnectOptions {
        let db = &self.database;
        let options = PgConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .database(&db.name)
            .username(&db.user);
        if db.password.is_empty() {
            options
        } else {
            options.password(&db.password)
        }
    }

    /// Database URL for logs and artifacts; the password is masked.
    pub fn display_url(&self) -> String {
        let db = &self.database;
        let credentials = if db.password.is_empty() {
            db.user.clone()
        } else {
            format!("{}:***", db.user)
        };
        format!(
            "postgresql://{credentials}@{}:{}/{}",
            db.host, db.port, db.name
        )
    }

    pub fn ckan_config(&self) -> SettingsResult<CkanConfig> {
        if self.ckan.resource_id.trim().is_empty() {
            return Err(SettingsError::Missing(
                "ckan.resource_id (or CKAN_RESOURCE_ID)".to_string(),
            ));
        }
        let mut config = CkanConfig::new(&self.ckan.base_url, &self.ckan.resource_id);
        config.batch_size = self.etl.batch_size;
        config.max_records = self.etl.max_records;
        config.max_retries = self.etl.max_retries;
        config.retry_delay = Duration::from_secs(self.etl.retry_delay_secs);
        config.timeout = Duration::from_secs(self.ckan.timeout_secs);
        Ok(config)
    }

    /// Copy safe to write into run artifacts.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.database.password.is_empty() {
            copy.database.password = "***".to_string();
        }
        copy
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> SettingsResult<T> {
    value.trim().parse().map_err(|_| SettingsError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> SettingsResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SettingsError::Env {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
