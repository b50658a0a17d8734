//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `RC_*`
//! environment variables, and merging them with proper precedence rules.
//! The CLI layers its own arguments on top.

use crate::error::RedirectCheckError;
use crate::protocols::QueryTemplate;
use crate::schema::{PairFields, RowSchema};
use crate::types::{ProbeStrategy, RunConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the worker pool size.
pub const MAX_WORKERS: usize = 500;

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for run options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// HTTP client settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpFileConfig>,

    /// Input column layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaConfig>,
}

/// Default values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Admissions per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Per-request timeout (as string, e.g., "30s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// "head" or "get"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,

    /// Longest wait for one admission token (e.g. "500ms", "30s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_timeout: Option<String>,

    /// Pause after a row could not be admitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_backoff: Option<String>,
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HttpFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_max_idle_per_host: Option<usize>,

    /// Extra request headers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    /// Query parameters added to every URL; values may use `{{ now }}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, String>>,
}

/// `[schema]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<PairFields>>,
}

impl FileConfig {
    /// Overlay the values set in this file onto `config`.
    pub fn apply_to(&self, mut config: RunConfig) -> Result<RunConfig, RedirectCheckError> {
        if let Some(defaults) = &self.defaults {
            if let Some(workers) = defaults.workers {
                config = config.with_workers(workers);
            }
            if let Some(rate) = defaults.rate {
                config = config.with_rate(rate);
            }
            if let Some(capacity) = defaults.queue_capacity {
                config = config.with_queue_capacity(capacity);
            }
            if let Some(timeout) = &defaults.timeout {
                config = config.with_timeout(parse_duration(timeout)?);
            }
            if let Some(probe) = &defaults.probe {
                config = config.with_probe(parse_probe(probe)?);
            }
            if let Some(timeout) = &defaults.admission_timeout {
                config = config.with_admission_timeout(parse_duration(timeout)?);
            }
            if let Some(backoff) = &defaults.admission_backoff {
                config = config.with_admission_backoff(parse_duration(backoff)?);
            }
        }

        if let Some(http) = &self.http {
            if let Some(user_agent) = &http.user_agent {
                config.http.user_agent = user_agent.clone();
            }
            if http.pool_max_idle_per_host.is_some() {
                config.http.pool_max_idle_per_host = http.pool_max_idle_per_host;
            }
            for (name, value) in http.headers.iter().flatten() {
                config = config.with_header(name, value);
            }
            for (name, value) in http.query.iter().flatten() {
                config = config.with_query(name, value);
            }
        }

        if let Some(schema) = &self.schema {
            let mut merged = config.schema.clone();
            if let Some(id_field) = schema.id_field {
                merged.id_field = id_field;
            }
            if let Some(pairs) = &schema.pairs {
                merged.pairs = pairs.clone();
            }
            config = config.with_schema(merged);
        }

        Ok(config)
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to report which files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load and validate a single configuration file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, RedirectCheckError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RedirectCheckError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            RedirectCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;

        self.validate_config(&config)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");

        Ok(config)
    }

    /// Discover configuration files in standard locations and merge them.
    ///
    /// XDG config is overridden by the global file, which is overridden by
    /// the local one.
    pub fn discover_and_load(&self) -> Result<FileConfig, RedirectCheckError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring config file"),
            }
        }

        if self.verbose && loaded_files.len() > 1 {
            for (i, path) in loaded_files.iter().enumerate() {
                let status = if i == loaded_files.len() - 1 {
                    "highest precedence"
                } else {
                    "overridden where set later"
                };
                tracing::info!(path = %path.display(), status, "config file");
            }
        }

        Ok(merged_config)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./redirect-check.toml", "./.redirect-check.toml"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".redirect-check.toml", "redirect-check.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("redirect-check").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations. Values from `higher` win.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower_defaults), Some(higher_defaults)) => Some(DefaultsConfig {
                    workers: higher_defaults.workers.or(lower_defaults.workers),
                    rate: higher_defaults.rate.or(lower_defaults.rate),
                    queue_capacity: higher_defaults
                        .queue_capacity
                        .or(lower_defaults.queue_capacity),
                    timeout: higher_defaults.timeout.or(lower_defaults.timeout),
                    probe: higher_defaults.probe.or(lower_defaults.probe),
                    admission_timeout: higher_defaults
                        .admission_timeout
                        .or(lower_defaults.admission_timeout),
                    admission_backoff: higher_defaults
                        .admission_backoff
                        .or(lower_defaults.admission_backoff),
                }),
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            http: match (lower.http, higher.http) {
                (Some(lower_http), Some(higher_http)) => Some(HttpFileConfig {
                    user_agent: higher_http.user_agent.or(lower_http.user_agent),
                    pool_max_idle_per_host: higher_http
                        .pool_max_idle_per_host
                        .or(lower_http.pool_max_idle_per_host),
                    headers: merge_maps(lower_http.headers, higher_http.headers),
                    query: merge_maps(lower_http.query, higher_http.query),
                }),
                (lower_http, higher_http) => higher_http.or(lower_http),
            },
            schema: match (lower.schema, higher.schema) {
                (Some(lower_schema), Some(higher_schema)) => Some(SchemaConfig {
                    id_field: higher_schema.id_field.or(lower_schema.id_field),
                    pairs: higher_schema.pairs.or(lower_schema.pairs),
                }),
                (lower_schema, higher_schema) => higher_schema.or(lower_schema),
            },
        }
    }

    /// Validate a configuration for common issues.
    pub fn validate_config(&self, config: &FileConfig) -> Result<(), RedirectCheckError> {
        if let Some(defaults) = &config.defaults {
            if let Some(workers) = defaults.workers {
                validate_workers(workers)?;
            }
            if defaults.rate == Some(0) {
                return Err(RedirectCheckError::config("Rate must be at least 1"));
            }
            if defaults.queue_capacity == Some(0) {
                return Err(RedirectCheckError::config(
                    "Queue capacity must be at least 1",
                ));
            }
            if let Some(timeout) = &defaults.timeout {
                parse_duration(timeout)?;
            }
            if let Some(probe) = &defaults.probe {
                parse_probe(probe)?;
            }
            for value in [&defaults.admission_timeout, &defaults.admission_backoff]
                .into_iter()
                .flatten()
            {
                parse_duration(value)?;
            }
        }

        if let Some(http) = &config.http {
            for value in http.query.iter().flat_map(|query| query.values()) {
                QueryTemplate::parse(value)?;
            }
            if http.headers.iter().flatten().any(|(name, _)| name.trim().is_empty()) {
                return Err(RedirectCheckError::config("Header names cannot be empty"));
            }
        }

        if let Some(schema) = &config.schema {
            let candidate = RowSchema {
                id_field: schema.id_field.unwrap_or(0),
                pairs: schema
                    .pairs
                    .clone()
                    .unwrap_or_else(|| RowSchema::default().pairs),
            };
            candidate.validate().map_err(RedirectCheckError::config)?;
        }

        Ok(())
    }
}

fn merge_maps(
    lower: Option<BTreeMap<String, String>>,
    higher: Option<BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (lower, higher) {
        (Some(mut lower), Some(higher)) => {
            lower.extend(higher);
            Some(lower)
        }
        (lower, higher) => higher.or(lower),
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via RC_* environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub workers: Option<usize>,
    pub rate: Option<u32>,
    pub queue_capacity: Option<usize>,
    pub timeout: Option<Duration>,
    pub probe: Option<ProbeStrategy>,
    pub admission_timeout: Option<Duration>,
    pub admission_backoff: Option<Duration>,
    pub user_agent: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Parse variables through `lookup`. Invalid values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = EnvConfig::default();

        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let invalid = |name: &str, value: &str, hint: &str| {
            tracing::warn!(variable = name, value, "ignoring invalid value, {}", hint);
        };

        if let Some(val) = read("RC_WORKERS") {
            match val.parse::<usize>() {
                Ok(workers) if validate_workers(workers).is_ok() => {
                    env_config.workers = Some(workers)
                }
                _ => invalid("RC_WORKERS", &val, "must be 1-500"),
            }
        }

        if let Some(val) = read("RC_RATE") {
            match val.parse::<u32>() {
                Ok(rate) if rate > 0 => env_config.rate = Some(rate),
                _ => invalid("RC_RATE", &val, "must be a positive integer"),
            }
        }

        if let Some(val) = read("RC_QUEUE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(capacity) if capacity > 0 => env_config.queue_capacity = Some(capacity),
                _ => invalid("RC_QUEUE_CAPACITY", &val, "must be a positive integer"),
            }
        }

        for (name, slot) in [
            ("RC_TIMEOUT", &mut env_config.timeout),
            ("RC_ADMISSION_TIMEOUT", &mut env_config.admission_timeout),
            ("RC_ADMISSION_BACKOFF", &mut env_config.admission_backoff),
        ] {
            if let Some(val) = read(name) {
                match parse_duration(&val) {
                    Ok(duration) => *slot = Some(duration),
                    Err(_) => invalid(name, &val, "use format like '500ms', '30s' or '2m'"),
                }
            }
        }

        if let Some(val) = read("RC_PROBE") {
            match ProbeStrategy::parse(&val) {
                Some(probe) => env_config.probe = Some(probe),
                None => invalid("RC_PROBE", &val, "use 'head' or 'get'"),
            }
        }

        env_config.user_agent = read("RC_USER_AGENT");
        env_config.input = read("RC_INPUT");
        env_config.output = read("RC_OUTPUT");
        env_config.config = read("RC_CONFIG");

        env_config
    }

    /// Overlay the values set here onto `config`.
    pub fn apply_to(&self, mut config: RunConfig) -> RunConfig {
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(rate) = self.rate {
            config = config.with_rate(rate);
        }
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(probe) = self.probe {
            config = config.with_probe(probe);
        }
        if let Some(timeout) = self.admission_timeout {
            config = config.with_admission_timeout(timeout);
        }
        if let Some(backoff) = self.admission_backoff {
            config = config.with_admission_backoff(backoff);
        }
        if let Some(user_agent) = &self.user_agent {
            config.http.user_agent = user_agent.clone();
        }
        config
    }
}

/// Load configuration from the process environment.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    let env_config = EnvConfig::from_lookup(|name| env::var(name).ok());
    if verbose && env_config != EnvConfig::default() {
        tracing::info!(?env_config, "using RC_* environment variables");
    }
    env_config
}

/// Reject worker counts outside 1..=500.
pub fn validate_workers(workers: usize) -> Result<(), RedirectCheckError> {
    if workers == 0 || workers > MAX_WORKERS {
        return Err(RedirectCheckError::config(format!(
            "Workers must be between 1 and {}",
            MAX_WORKERS
        )));
    }
    Ok(())
}

/// Parse a timeout string like "5s", "30s", "2m" into seconds.
pub fn parse_timeout_string(timeout_str: &str) -> Option<u64> {
    let timeout_str = timeout_str.trim().to_lowercase();

    if let Some(secs) = timeout_str.strip_suffix('s') {
        secs.parse::<u64>().ok()
    } else if let Some(mins) = timeout_str.strip_suffix('m') {
        mins.parse::<u64>().ok().and_then(|m| m.checked_mul(60))
    } else {
        // Assume seconds if no unit
        timeout_str.parse::<u64>().ok()
    }
}

/// Parse a non-zero duration: "500ms", or anything [`parse_timeout_string`] takes.
pub fn parse_duration(timeout_str: &str) -> Result<Duration, RedirectCheckError> {
    let normalized = timeout_str.trim().to_lowercase();
    let parsed = match normalized.strip_suffix("ms") {
        Some(millis) => millis.parse::<u64>().ok().map(Duration::from_millis),
        None => parse_timeout_string(&normalized).map(Duration::from_secs),
    };

    match parsed {
        Some(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(RedirectCheckError::config(format!(
            "Invalid duration '{}'. Use format like '500ms', '30s', '2m'",
            timeout_str
        ))),
    }
}

fn parse_probe(value: &str) -> Result<ProbeStrategy, RedirectCheckError> {
    ProbeStrategy::parse(value).ok_or_else(|| {
        RedirectCheckError::config(format!("Invalid probe '{}'. Use 'head' or 'get'", value))
    })
}
