//! YAML configuration surface.
//!
//! Every section is optional in the file; missing keys fall back to the
//! documented defaults so `matilda --database foo.db` works with no config
//! file at all. Validation happens once, after deserialization, and reports
//! the offending key rather than a serde path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, Result};

pub const DEFAULT_NB_OCCURRENCE: u32 = 3;
pub const DEFAULT_MAX_TABLE: u32 = 3;
pub const DEFAULT_MAX_VARS: u32 = 6;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 1.0;
pub const DEFAULT_MEMORY_THRESHOLD: u64 = 15 * 1024 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: f64 = 3600.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub algorithm: AlgorithmConfig,
    pub monitor: MonitorConfig,
    pub results: ResultsConfig,
    pub logging: LoggingConfig,
    pub mlflow: MlflowConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the database file.
    pub path: Option<PathBuf>,
    /// Database file name inside `path`.
    pub name: Option<PathBuf>,
    /// Full driver URL (`sqlite:///path/to/db`); takes precedence over
    /// `path`/`name` when present.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    /// Minimum rule support. `0` means "no support floor", but rules with
    /// zero witnesses are never accepted.
    pub nb_occurrence: u32,
    /// Maximum atoms per rule (body plus head).
    pub max_table: u32,
    /// Maximum distinct variables per rule (shared plus existential).
    pub max_vars: u32,
    /// Minimum confidence of an accepted rule; 1.0 discovers exact TGDs.
    pub confidence_threshold: f64,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            nb_occurrence: DEFAULT_NB_OCCURRENCE,
            max_table: DEFAULT_MAX_TABLE,
            max_vars: DEFAULT_MAX_VARS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Resident-memory ceiling in bytes.
    pub memory_threshold: u64,
    /// Wall-clock budget in seconds. Fractional values are accepted so test
    /// runs can force an immediate trip.
    pub timeout: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
    pub output_dir: PathBuf,
    /// Cap on the ranked rule sink; `0` keeps every accepted rule.
    pub top_k: usize,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            top_k: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            level: "info".to_string(),
        }
    }
}

/// Experiment-tracking keys are recognized and validated, but tracking
/// itself is an external collaborator and is not bundled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MlflowConfig {
    #[serde(rename = "use")]
    pub use_tracking: bool,
    pub tracking_uri: Option<String>,
    pub experiment_name: Option<String>,
}

impl Config {
    /// Parse and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DiscoveryError::Config(format!("cannot read `{}`: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(text)
            .map_err(|e| DiscoveryError::Config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.algorithm.max_table < 2 {
            return Err(DiscoveryError::Config(
                "algorithm.max_table must be at least 2 (one body atom plus one head atom)"
                    .to_string(),
            ));
        }
        if self.algorithm.max_vars < 1 {
            return Err(DiscoveryError::Config(
                "algorithm.max_vars must be at least 1".to_string(),
            ));
        }
        let threshold = self.algorithm.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(DiscoveryError::Config(format!(
                "algorithm.confidence_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.monitor.timeout < 0.0 {
            return Err(DiscoveryError::Config(format!(
                "monitor.timeout must be non-negative, got {}",
                self.monitor.timeout
            )));
        }
        if self.mlflow.use_tracking && self.mlflow.tracking_uri.is_none() {
            return Err(DiscoveryError::Config(
                "mlflow.use is true but mlflow.tracking_uri is not set".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the SQLite file this run points at.
    ///
    /// `database.url` wins when present; otherwise `database.path` +
    /// `database.name`. Only `sqlite:` URLs are understood.
    pub fn database_file(&self) -> Result<PathBuf> {
        if let Some(url) = &self.database.url {
            let path = url
                .strip_prefix("sqlite:///")
                .or_else(|| url.strip_prefix("sqlite://"))
                .ok_or_else(|| {
                    DiscoveryError::Config(format!("unsupported database.url scheme: `{url}`"))
                })?;
            if path.is_empty() {
                return Err(DiscoveryError::Config(format!(
                    "database.url has an empty path: `{url}`"
                )));
            }
            return Ok(PathBuf::from(path));
        }

        let name = self.database.name.as_ref().ok_or_else(|| {
            DiscoveryError::Config(
                "no database configured: set database.url or database.path + database.name"
                    .to_string(),
            )
        })?;
        match &self.database.path {
            Some(dir) => Ok(dir.join(name)),
            None => Ok(name.clone()),
        }
    }
}
