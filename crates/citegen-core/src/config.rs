use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root application configuration, loaded from `~/.config/citegen/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub providers: ProvidersConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Line-delimited JSON file holding raw provider records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Rewrite the cache file after every live fetch instead of once at the end.
    pub save_incrementally: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub user_agent: String,
    /// Pause after every live fetch, in seconds.
    pub politeness_delay_secs: f64,
    /// Wait used when a throttled response carries no usable `Retry-After`.
    pub default_retry_after_secs: u64,
    /// Cap on throttle retries. Unset means retry until the server answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_throttle_retries: Option<u32>,
    /// Apply the throttle retry loop to the DOI and Semantic Scholar providers too.
    pub retry_throttled_everywhere: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub arxiv_oai_url: String,
    pub crossref_url: String,
    pub semantic_scholar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub arxiv_pdf_base: String,
    pub doi_resolver_base: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl NetworkConfig {
    /// `politeness_delay_secs` as a [`Duration`]. Negative, non-finite and
    /// out-of-range values are rejected.
    pub fn politeness_delay(&self) -> Result<Duration> {
        let secs = self.politeness_delay_secs;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            CoreError::ConfigError(format!(
                "network.politeness_delay_secs must be a non-negative number of seconds, got {secs}"
            ))
        })
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("citegen/", env!("CARGO_PKG_VERSION")).to_string(),
            politeness_delay_secs: 5.0,
            default_retry_after_secs: 10,
            max_throttle_retries: None,
            retry_throttled_everywhere: false,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            arxiv_oai_url: "http://export.arxiv.org/oai2".to_string(),
            crossref_url: "http://api.crossref.org".to_string(),
            semantic_scholar_url: "http://api.semanticscholar.org/v1/paper".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            arxiv_pdf_base: "https://arxiv.org/pdf/".to_string(),
            doi_resolver_base: "https://dx.doi.org/".to_string(),
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/citegen/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CITEGEN_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("citegen")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.network.politeness_delay()?;
        Ok(())
    }
}
