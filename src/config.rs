//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub apis: ApiConfig,
    pub logging: LoggingConfig,
}

/// Catalog location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory holding one JSON file per entry
    pub directory: PathBuf,
}

/// Batch synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Explicit parallelism; when unset it follows token presence
    pub parallelism: Option<usize>,
    pub unauthenticated_parallelism: usize,
    pub authenticated_parallelism: usize,
    /// Rate-limited responses tolerated before a run stops
    pub breaker_threshold: u32,
    pub request_timeout_seconds: u64,
    /// Process only the first N repositories
    pub limit: Option<usize>,
    /// `refresh` or `per-entry`
    pub mode: String,
    pub report_path: PathBuf,
    /// CI step summary file the report is appended to
    pub step_summary_path: Option<PathBuf>,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window for interactive status lookups
    pub status_ttl_seconds: u64,
    /// Freshness window for catalog listings
    pub list_ttl_seconds: u64,
    /// Coalesce concurrent misses for the same repository
    pub single_flight: bool,
}

/// External API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub github: ForgeApiConfig,
    pub gitlab: ForgeApiConfig,
    pub user_agent: String,
}

/// Connection settings for one forge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `json`, `pretty` or anything else for the compact default
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig {
                directory: PathBuf::from("catalog"),
            },
            sync: SyncConfig {
                parallelism: None,
                unauthenticated_parallelism: 5,
                authenticated_parallelism: 50,
                breaker_threshold: 5,
                request_timeout_seconds: 30,
                limit: None,
                mode: "refresh".to_string(),
                report_path: PathBuf::from("sync-report.md"),
                step_summary_path: None,
            },
            cache: CacheConfig {
                status_ttl_seconds: 600,
                list_ttl_seconds: 300,
                single_flight: true,
            },
            apis: ApiConfig {
                github: ForgeApiConfig {
                    base_url: "https://api.github.com".to_string(),
                    token: None,
                    timeout_seconds: 30,
                },
                gitlab: ForgeApiConfig {
                    base_url: "https://gitlab.com/api/v4".to_string(),
                    token: None,
                    timeout_seconds: 30,
                },
                user_agent: format!("catalog-pulse/{}", env!("CARGO_PKG_VERSION")),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "default".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from defaults, files and environment variables.
    ///
    /// Precedence, lowest first: built-in defaults, `config/default`,
    /// `config/local`, `config/{ENV}`, `CATALOG_PULSE__*` variables, then the
    /// conventional variables handled by [`Config::apply_env_overrides`].
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        let mut loaded: Config = builder
            .add_source(config::Environment::with_prefix("CATALOG_PULSE").separator("__"))
            .build()?
            .try_deserialize()?;
        loaded.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(loaded)
    }

    /// Fold in `GITHUB_TOKEN`, `GITLAB_TOKEN`, `PARALLEL`, `LIMIT` and
    /// `GITHUB_STEP_SUMMARY`. Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = get("GITHUB_TOKEN") {
            self.apis.github.token = Some(token);
        }
        if let Some(token) = get("GITLAB_TOKEN") {
            self.apis.gitlab.token = Some(token);
        }
        if let Some(parallel) = get("PARALLEL") {
            let value = parse_positive("PARALLEL", &parallel)?;
            self.sync.parallelism = Some(value);
        }
        if let Some(limit) = get("LIMIT") {
            self.sync.limit = Some(parse_positive("LIMIT", &limit)?);
        }
        if let Some(path) = get("GITHUB_STEP_SUMMARY") {
            self.sync.step_summary_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn has_github_token(&self) -> bool {
        self.apis
            .github
            .token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

impl SyncConfig {
    /// Explicit parallelism, or the default for the token situation
    pub fn effective_parallelism(&self, authenticated: bool) -> usize {
        self.parallelism
            .unwrap_or(if authenticated {
                self.authenticated_parallelism
            } else {
                self.unauthenticated_parallelism
            })
            .max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

impl CacheConfig {
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_seconds)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_seconds)
    }
}

impl ForgeApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, config::ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(config::ConfigError::Message(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}
