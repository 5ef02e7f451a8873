//! Engine configuration.
//!
//! [`EngineConfig`] collects the knobs that shape evaluation: processor chunk
//! size, worker bands, mipmap rendering, cache policy and operation quality.
//!
//! # Sources
//!
//! Lowest to highest precedence:
//!
//! 1. [`EngineConfig::default`]
//! 2. YAML ([`EngineConfig::from_yaml_str`], [`EngineConfig::from_yaml_file`]),
//!    missing keys keep their defaults
//! 3. Environment ([`EngineConfig::with_env_overrides`])
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TESSERA_CHUNK_SIZE` | `chunk_size` |
//! | `TESSERA_THREADS` | `threads` |
//! | `TESSERA_MIPMAP_RENDERING` | `mipmap_rendering` |
//! | `TESSERA_CACHE_POLICY` | `cache_policy` |
//! | `TESSERA_QUALITY` | `quality` |
//!
//! # Usage
//!
//! ```
//! use tessera_graph::{CachePolicy, EngineConfig};
//!
//! let config = EngineConfig::builder()
//!     .chunk_size(64 * 64)
//!     .threads(4)
//!     .cache_policy(CachePolicy::Auto)
//!     .build();
//! assert_eq!(config.threads, 4);
//! ```

use std::env;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::registry::Quality;

/// Smallest accepted chunk area.
pub const MIN_CHUNK_SIZE: u64 = 1;
/// Largest accepted chunk area.
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

/// When nodes keep their output in a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Every node with an output pad caches.
    #[default]
    Always,
    /// No node caches during evaluation.
    Never,
    /// Ask each operation via `cache_hint`.
    Auto,
}

impl FromStr for CachePolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "auto" => Ok(Self::Auto),
            other => Err(GraphError::config(format!("unknown cache policy '{other}'"))),
        }
    }
}

/// Engine-wide evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max pixel area rendered by one processor step.
    pub chunk_size: u64,
    /// Worker bands used by default-mode blits.
    pub threads: usize,
    /// Minimum pixels per band before a blit is split.
    pub min_band_area: u64,
    /// Evaluate scaled blits at a reduced mip level.
    pub mipmap_rendering: bool,
    /// Caching policy.
    pub cache_policy: CachePolicy,
    /// Registry strategy key.
    pub quality: Quality,
    /// Tile edge of buffers allocated by the engine.
    pub tile_size: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128 * 128,
            threads: 1,
            min_band_area: 64 * 64,
            mipmap_rendering: false,
            cache_policy: CachePolicy::Always,
            quality: Quality::Good,
            tile_size: tessera_core::DEFAULT_TILE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Starts a builder from the defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Parses YAML; missing keys keep their defaults.
    pub fn from_yaml_str(text: &str) -> GraphResult<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| GraphError::config(format!("invalid engine config: {e}")))?;
        Ok(config.normalized())
    }

    /// Reads and parses a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Applies `TESSERA_*` environment overrides.
    pub fn with_env_overrides(self) -> GraphResult<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TESSERA_CHUNK_SIZE") {
            self.chunk_size = parse_var("TESSERA_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("TESSERA_THREADS") {
            self.threads = parse_var("TESSERA_THREADS", &v)?;
        }
        if let Some(v) = lookup("TESSERA_MIPMAP_RENDERING") {
            self.mipmap_rendering = parse_flag(&v);
        }
        if let Some(v) = lookup("TESSERA_CACHE_POLICY") {
            self.cache_policy = v.parse()?;
        }
        if let Some(v) = lookup("TESSERA_QUALITY") {
            self.quality = v.parse()?;
        }
        Ok(self.normalized())
    }

    /// Clamps values into their accepted ranges.
    pub fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self.threads = self.threads.max(1);
        self.min_band_area = self.min_band_area.max(1);
        self.tile_size = self.tile_size.max(1);
        self
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> GraphResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GraphError::config(format!("{key}: cannot parse '{value}'")))
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim();
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the processor chunk area.
    pub fn chunk_size(mut self, area: u64) -> Self {
        self.config.chunk_size = area;
        self
    }

    /// Sets the number of worker bands.
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Sets the minimum band area.
    pub fn min_band_area(mut self, area: u64) -> Self {
        self.config.min_band_area = area;
        self
    }

    /// Enables mip-level evaluation of scaled blits.
    pub fn mipmap_rendering(mut self, enabled: bool) -> Self {
        self.config.mipmap_rendering = enabled;
        self
    }

    /// Sets the cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    /// Sets the registry quality.
    pub fn quality(mut self, quality: Quality) -> Self {
        self.config.quality = quality;
        self
    }

    /// Sets the tile edge.
    pub fn tile_size(mut self, size: i32) -> Self {
        self.config.tile_size = size;
        self
    }

    /// Builds the config, clamping out-of-range values.
    pub fn build(self) -> EngineConfig {
        self.config.normalized()
    }
}
