//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Validation runs once over the merged result and
//! reports every problem together.

use harvest_sdk::config::{DEFAULT_FALLBACK_URL, DEFAULT_PRIMARY_URL};
use harvest_sdk::{
    CatalogConfig, CatalogService, ClientConfig, RetryConfig, SdkResult, StakeKitClient,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default config file name looked up by the binaries.
pub const DEFAULT_CONFIG_FILE: &str = "harvest.toml";

const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid environment configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stakekit: StakeKitSettings,
    pub logging: LoggingSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone)]
pub struct StakeKitSettings {
    pub api_key: String,
    pub base_url: Url,
    pub fallback_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// One of `debug`, `info`, `warn`, `error`.
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub bypass_cache: bool,
}

/// Raw shape of `harvest.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    stakekit: FileStakeKit,
    logging: FileLogging,
    catalog: FileCatalog,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileStakeKit {
    api_key: Option<String>,
    base_url: Option<String>,
    fallback_url: Option<String>,
    request_timeout_ms: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLogging {
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileCatalog {
    bypass_cache: Option<bool>,
}

impl AppConfig {
    /// Load from `path` (if it exists) and the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_lookup(path, |key| std::env::var(key).ok())
    }

    /// Load from `path` (if it exists) and an arbitrary variable lookup.
    pub fn from_lookup(
        path: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::parse_file(path, &content)?
        } else {
            tracing::debug!(path = %path.display(), "Configuration file not found, using defaults");
            FileConfig::default()
        };

        Self::resolve(file, lookup)
    }

    /// Parse a TOML document with no environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file = Self::parse_file(Path::new(DEFAULT_CONFIG_FILE), content)?;
        Self::resolve(file, |_| None)
    }

    fn parse_file(path: &Path, content: &str) -> Result<FileConfig, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn resolve(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut issues = Vec::new();

        let api_key = lookup("STAKEKIT_API_KEY").or(file.stakekit.api_key);
        let api_key = match api_key {
            None => {
                issues.push("STAKEKIT_API_KEY: STAKEKIT_API_KEY is required".to_string());
                String::new()
            }
            Some(key) if key.trim().is_empty() => {
                issues.push("STAKEKIT_API_KEY: STAKEKIT_API_KEY cannot be empty".to_string());
                String::new()
            }
            Some(key) => key,
        };

        let base_url = parse_url(
            "STAKEKIT_BASE_URL",
            lookup("STAKEKIT_BASE_URL").or(file.stakekit.base_url),
            DEFAULT_PRIMARY_URL,
            &mut issues,
        );
        let fallback_url = parse_url(
            "STAKEKIT_FALLBACK_URL",
            lookup("STAKEKIT_FALLBACK_URL").or(file.stakekit.fallback_url),
            DEFAULT_FALLBACK_URL,
            &mut issues,
        );

        let timeout_ms = match lookup("REQUEST_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<i64>().ok(),
            None => Some(file.stakekit.request_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS as i64)),
        };
        let timeout = match timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms as u64),
            _ => {
                issues.push(
                    "REQUEST_TIMEOUT_MS: REQUEST_TIMEOUT_MS must be a positive integer".to_string(),
                );
                Duration::from_millis(DEFAULT_TIMEOUT_MS)
            }
        };

        let level = lookup("LOG_LEVEL")
            .or(file.logging.level)
            .unwrap_or_else(|| "info".to_string())
            .to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            issues.push(format!(
                "LOG_LEVEL: LOG_LEVEL must be one of {}",
                LOG_LEVELS.join(", ")
            ));
        }

        let bypass_cache = match lookup("CATALOG_BYPASS_CACHE") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    issues.push(
                        "CATALOG_BYPASS_CACHE: CATALOG_BYPASS_CACHE must be a boolean".to_string(),
                    );
                    false
                }
            },
            None => file.catalog.bypass_cache.unwrap_or(false),
        };

        let (Some(base_url), Some(fallback_url)) = (base_url, fallback_url) else {
            return Err(ConfigError::Invalid(issues));
        };
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues));
        }

        Ok(Self {
            stakekit: StakeKitSettings {
                api_key,
                base_url,
                fallback_url,
                timeout,
            },
            logging: LoggingSettings { level },
            catalog: CatalogSettings { bypass_cache },
        })
    }

    /// Client configuration for the StakeKit hosts.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            primary_url: self.stakekit.base_url.clone(),
            fallback_url: self.stakekit.fallback_url.clone(),
            api_key: self.stakekit.api_key.clone(),
            timeout: self.stakekit.timeout,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            bypass_cache: self.catalog.bypass_cache,
            ..CatalogConfig::default()
        }
    }

    /// Build the catalog service this configuration describes.
    pub fn catalog_service(&self) -> SdkResult<CatalogService> {
        let client = StakeKitClient::from_config(self.client_config())?;
        Ok(CatalogService::new(client, self.catalog_config()))
    }

    /// Filter directive used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> String {
        format!("harvest={level},harvest_mcp={level},harvest_sdk={level}", level = self.logging.level)
    }
}

fn parse_url(
    name: &str,
    raw: Option<String>,
    default: &str,
    issues: &mut Vec<String>,
) -> Option<Url> {
    let raw = raw.unwrap_or_else(|| default.to_string());
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            issues.push(format!("{name}: unsupported URL scheme '{}'", url.scheme()));
            None
        }
        Err(err) => {
            issues.push(format!("{name}: invalid URL ({err})"));
            None
        }
    }
}
