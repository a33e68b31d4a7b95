//! Configuration file parser for ~/.config/podsieve/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which has no filter jobs. Unknown keys are accepted by serde but logged
//! as warnings since they are most likely typos.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchPolicy, Rules};
use crate::util::validate_source_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Well-formed TOML describing an unusable configuration.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional log file, truncated on each start. Logs always go to stdout.
    pub log_file: Option<PathBuf>,

    /// HTTP retrieval settings shared by every job.
    pub fetch: FetchSettings,

    /// Filter jobs, one `[[filter]]` table each.
    #[serde(rename = "filter")]
    pub filters: Vec<FilterJob>,
}

/// The `[fetch]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    /// Retries for 429/5xx/truncated responses. 0 = fail on first error.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_feed_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let policy = FetchPolicy::default();
        Self {
            timeout_secs: policy.timeout.as_secs(),
            max_retries: policy.max_retries,
            retry_backoff_ms: policy.retry_backoff.as_millis() as u64,
            max_feed_bytes: policy.max_feed_bytes,
        }
    }
}

impl FetchSettings {
    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_feed_bytes: self.max_feed_bytes,
        }
    }
}

/// One independent filtered mirror: where to read, where to write, and
/// which episodes to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FilterJob {
    pub name: String,
    pub source_url: String,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub rules: Rules,
}

const KNOWN_KEYS: [&str; 3] = ["log_file", "fetch", "filter"];
const KNOWN_FILTER_KEYS: [&str; 7] = [
    "name",
    "source_url",
    "output_path",
    "keep_title",
    "keep_description",
    "exclude_title",
    "exclude_description",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Upper bound for `fetch.max_retries`.
    pub const MAX_RETRIES: u32 = 10;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unusable values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            filters = config.filters.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.fetch.max_retries > Self::MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "fetch.max_retries must be at most {}",
                Self::MAX_RETRIES
            )));
        }

        let mut seen = HashSet::new();
        let mut outputs = HashSet::new();
        for job in &mut self.filters {
            job.name = job.name.trim().to_string();
            if job.name.is_empty() {
                return Err(ConfigError::Invalid("every [[filter]] needs a name".into()));
            }
            if !seen.insert(job.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate filter name '{}'",
                    job.name
                )));
            }
            validate_source_url(&job.source_url).map_err(|e| {
                ConfigError::Invalid(format!("filter '{}': source_url: {}", job.name, e))
            })?;
            job.source_url = job.source_url.trim().to_string();
            if job.output_path.as_os_str().is_empty() || job.output_path.file_name().is_none() {
                return Err(ConfigError::Invalid(format!(
                    "filter '{}': output_path must name a file",
                    job.name
                )));
            }
            // Jobs run concurrently and derive their download file from the
            // output path, so two jobs must never share one.
            if !outputs.insert(output_key(&job.output_path)) {
                return Err(ConfigError::Invalid(format!(
                    "filter '{}': output_path '{}' is already used by another filter",
                    job.name,
                    job.output_path.display()
                )));
            }

            let dropped = job.rules.drop_blank_keywords();
            if dropped > 0 {
                tracing::warn!(filter = %job.name, dropped, "Ignoring blank keywords");
            }
            if job.rules.is_empty() {
                tracing::warn!(filter = %job.name, "Filter has no keywords; every episode will be kept");
            }
        }
        Ok(())
    }

    /// Returns the jobs to run: all of them when `only` is empty, otherwise
    /// the named ones in configuration order.
    pub fn select(&self, only: &[String]) -> Result<Vec<FilterJob>, ConfigError> {
        if only.is_empty() {
            return Ok(self.filters.clone());
        }
        if let Some(unknown) = only
            .iter()
            .find(|name| !self.filters.iter().any(|job| &job.name == *name))
        {
            return Err(ConfigError::Invalid(format!("no filter named '{unknown}'")));
        }
        Ok(self
            .filters
            .iter()
            .filter(|job| only.contains(&job.name))
            .cloned()
            .collect())
    }
}

/// Identity of an output file for duplicate detection. The parent directory
/// is canonicalized when it already exists, so `a/./x.xml` and `a/x.xml`
/// collide; otherwise the lexical components are compared.
fn output_key(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.components().collect(),
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }

    let Some(filters) = raw.get("filter").and_then(|f| f.as_array()) else {
        return;
    };
    for table in filters.iter().filter_map(|f| f.as_table()) {
        for key in table.keys() {
            if !KNOWN_FILTER_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown key in [[filter]], ignoring");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
