use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::api::client::RetryPolicy;
use crate::query::CacheOptions;

/// Environment variable overriding `api.url`
pub const API_URL_ENV: &str = "CODEBOOK_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Server origin, e.g. http://localhost:8001
  pub url: String,
  /// Path prefix every endpoint lives under
  pub base_path: String,
  pub timeout_secs: u64,
  pub max_retries: u32,
  /// Base delay for linear retry backoff
  pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:8001".to_string(),
      base_path: "/api".to_string(),
      timeout_secs: 10,
      max_retries: 2,
      retry_delay_ms: 1000,
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.max_retries,
      base_delay: Duration::from_millis(self.retry_delay_ms),
    }
  }

  /// Origin joined with the base path, without a trailing slash.
  pub fn base_url(&self) -> Result<String> {
    let origin =
      Url::parse(&self.url).map_err(|e| eyre!("Invalid API url '{}': {}", self.url, e))?;
    let base = origin
      .join(&self.base_path)
      .map_err(|e| eyre!("Invalid API base path '{}': {}", self.base_path, e))?;
    Ok(base.as_str().trim_end_matches('/').to_string())
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// How long fetched data stays fresh
  pub stale_time_secs: u64,
  /// Extra loader runs before a failed fetch is stored as an error
  pub query_retry: u32,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: 300,
      query_retry: 1,
    }
  }
}

impl CacheConfig {
  pub fn options(&self) -> CacheOptions {
    CacheOptions {
      stale_time: Duration::from_secs(self.stale_time_secs),
      retry: self.query_retry,
      ..CacheOptions::default()
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./codebook.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/codebook/config.yaml
  /// 4. Built-in defaults
  ///
  /// `CODEBOOK_API_URL` overrides the configured server url.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api.url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("codebook.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("codebook").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.api.base_url()?;
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be greater than zero"));
    }
    Ok(())
  }
}
