//! Build configuration for the cache manager.
//!
//! Holds the serving origin, the Shell Resource List, the generation names
//! of the current build and the image matching rule.
//!
//! Configuration is stored at `~/.config/shellcache/config.json`; a missing
//! file means the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cache::disk::is_valid_store_name;
use crate::classify::ImageRule;
use crate::lifecycle::Generations;
use crate::transport::http::DEFAULT_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Sub-directory of the cache directory holding the named stores
const STORES_DIR: &str = "stores";

pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Name shown on the offline page.
pub const DEFAULT_APP_NAME: &str = "Spice Affair";

/// Sync tag that triggers a shell refresh.
pub const DEFAULT_REFRESH_TAG: &str = "background-sync";

/// Document served for `/`.
pub const DEFAULT_SHELL_ROOT: &str = "/index.html";

const DEFAULT_SHELL_FILES: &[&str] = &[
    "/",
    "/index.html",
    "/menu.json",
    "/manifest.json",
    "/assets/logo.png",
    "/assets/chalkboard-background.webp",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin whose same-origin GET requests are managed.
    pub origin: String,
    pub app_name: String,
    pub shell_root: String,
    /// Shell Resource List, in install order.
    pub shell_files: Vec<String>,
    pub generations: Generations,
    pub images: ImageRule,
    pub refresh_tag: String,
    pub request_timeout_secs: u64,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            shell_root: DEFAULT_SHELL_ROOT.to_string(),
            shell_files: DEFAULT_SHELL_FILES.iter().map(|s| s.to_string()).collect(),
            generations: Generations::default(),
            images: ImageRule::default(),
            refresh_tag: DEFAULT_REFRESH_TAG.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the named stores.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(STORES_DIR))
    }

    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .with_context(|| format!("Invalid origin: {}", self.origin))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Origin must be http or https: {}", self.origin);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;

        if !self.shell_root.starts_with('/') {
            bail!("Shell root must be an absolute path: {}", self.shell_root);
        }
        if self.shell_files.is_empty() {
            bail!("Shell resource list is empty");
        }
        if let Some(bad) = self.shell_files.iter().find(|p| !p.starts_with('/')) {
            bail!("Shell resource must be an absolute path: {}", bad);
        }

        let Generations { shell, image } = &self.generations;
        if let Some(bad) = [shell, image].into_iter().find(|n| !is_valid_store_name(n)) {
            bail!("Invalid generation name: {:?}", bad);
        }
        if shell == image {
            bail!("Shell and image generations share the name {}", shell);
        }

        if self.images.path_segment.is_empty() {
            bail!("Image path segment must not be empty");
        }
        if let Some(bad) = self.images.extensions.iter().find(|e| !e.starts_with('.')) {
            bail!("Image extension must start with '.': {}", bad);
        }
        if self.request_timeout_secs == 0 {
            bail!("Request timeout must be at least one second");
        }
        Ok(())
    }
}
