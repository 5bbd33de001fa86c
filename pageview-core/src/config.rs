use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::layout::ViewSettings;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("cache capacity must be at least 1")]
    ZeroCacheCapacity,
    #[error("zoom factor must be a positive finite number, got {0}")]
    InvalidZoomFactor(f64),
    #[error("screen resolution must be a positive finite number, got {0}")]
    InvalidScreenResolution(f64),
    #[error("page spacing must not be negative, got {0}")]
    NegativePageSpacing(i32),
    #[error("document margins must not be negative")]
    NegativeMargins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of page bitmaps kept at once.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub view: ViewSettings,
    pub cache: CacheSettings,
}

impl ViewerConfig {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("net", "pageview", "pageview")
            .map(|dirs| dirs.config_dir().join("pageview.toml"))
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ViewerConfig =
            toml::from_str(source).context("failed to parse viewer configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {:?}", path))?;
        Self::from_toml_str(&source).with_context(|| format!("invalid configuration {:?}", path))
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "no configuration file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let view = &self.view;
        if self.cache.capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        if !(view.zoom_factor.is_finite() && view.zoom_factor > 0.0) {
            return Err(ConfigError::InvalidZoomFactor(view.zoom_factor));
        }
        if !(view.screen_resolution.is_finite() && view.screen_resolution > 0.0) {
            return Err(ConfigError::InvalidScreenResolution(view.screen_resolution));
        }
        if view.page_spacing < 0 {
            return Err(ConfigError::NegativePageSpacing(view.page_spacing));
        }
        let margins = &view.margins;
        if margins.left < 0 || margins.top < 0 || margins.right < 0 || margins.bottom < 0 {
            return Err(ConfigError::NegativeMargins);
        }
        Ok(())
    }

    pub fn cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache.capacity)
            .or(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN)
    }
}
