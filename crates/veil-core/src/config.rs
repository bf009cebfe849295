use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{UrlCodec, DEFAULT_PREFIX};

/// Outbound fetch limits (`[fetch]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    /// Whole-transfer timeout.
    pub timeout_secs: u64,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    /// Origin bodies larger than this abort the fetch.
    pub max_body_bytes: u64,
    /// Sent when the client supplied no `User-Agent`.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: 30,
            follow_redirects: true,
            max_redirects: 10,
            max_body_bytes: 50 * 1024 * 1024,
            user_agent: format!("veil/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Response cache settings (`[cache]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Larger responses are served but never stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 512,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Global configuration loaded from `~/.config/veil/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    /// Address the front-end binds, e.g. `127.0.0.1:8080`.
    pub listen: String,
    /// Path prefix of every proxied reference.
    pub proxy_prefix: String,
    /// Prefix applied to origin cookie names; `None` forwards names as-is.
    pub cookie_prefix: Option<String>,
    /// Substrings that mark a `<script src>` as a tracker.
    pub tracker_denylist: Vec<String>,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
}

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            proxy_prefix: DEFAULT_PREFIX.to_string(),
            cookie_prefix: None,
            tracker_denylist: [
                "google-analytics.com",
                "googletagmanager.com",
                "doubleclick.net",
                "connect.facebook.net",
                "hotjar.com",
                "scorecardresearch.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl VeilConfig {
    /// Codec for the configured prefix; fails on an invalid prefix.
    pub fn codec(&self) -> Result<UrlCodec> {
        UrlCodec::new(&self.proxy_prefix)
            .with_context(|| format!("invalid proxy_prefix {:?}", self.proxy_prefix))
    }

    fn validate(self) -> Result<Self> {
        self.codec()?;
        if let Some(p) = &self.cookie_prefix {
            if p.is_empty() || p.contains(['=', ';', ' ']) {
                anyhow::bail!("invalid cookie_prefix {:?}", p);
            }
        }
        Ok(self)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("veil")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VeilConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = VeilConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path; the file must exist.
pub fn load_from(path: &Path) -> Result<VeilConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: VeilConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
}
