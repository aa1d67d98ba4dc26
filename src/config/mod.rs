//! Configuration for synthesis and function builds.
//!
//! Every option struct carries its defaults in a `Default` impl. Values can
//! be layered from an optional project file (`armforge.toml`, see
//! [`ProjectConfig`]) and then from command-line flags.
//!
//! ```toml
//! [synth]
//! outdir = "armforge.out"
//! strict = true
//! max_template_size = 3145728
//!
//! [build]
//! concurrency = 8
//! build_timeout_secs = 120
//!
//! [cache]
//! dir = ".armforge-cache"
//! ttl_ms = 600000
//! ```

mod project;

pub use project::{BuildSection, CacheSection, ProjectConfig, SynthSection};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    CACHE_DIR_ENV, DEFAULT_BUILD_CONCURRENCY, DEFAULT_BUILD_TIMEOUT, DEFAULT_CACHE_MAX_SIZE,
    DEFAULT_CACHE_TTL, DEFAULT_MAX_TEMPLATE_SIZE, DEFAULT_OUTDIR,
};
use crate::synth::validation::ValidationLevel;

/// Options consumed by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Final output directory
    pub outdir: PathBuf,
    pub skip_validation: bool,
    /// 2-space indented output instead of compact JSON
    pub pretty_print: bool,
    /// Treat validation warnings as errors
    pub strict: bool,
    pub enable_linked_templates: bool,
    /// Per-document ceiling in bytes
    pub max_template_size: usize,
    pub validation_level: ValidationLevel,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from(DEFAULT_OUTDIR),
            skip_validation: false,
            pretty_print: true,
            strict: false,
            enable_linked_templates: true,
            max_template_size: DEFAULT_MAX_TEMPLATE_SIZE,
            validation_level: ValidationLevel::default(),
        }
    }
}

/// Build cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    /// Entries older than this are misses
    pub ttl: Duration,
    /// Total size ceiling in bytes
    pub max_size: u64,
    pub enabled: bool,
}

impl CacheConfig {
    /// Cache config rooted at `cache_dir` with default limits.
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl: DEFAULT_CACHE_TTL,
            max_size: DEFAULT_CACHE_MAX_SIZE,
            enabled: true,
        }
    }

    /// A config whose cache never hits and never stores.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let cache_dir = default_cache_dir().unwrap_or_else(|_| std::env::temp_dir().join("armforge-builds"));
        Self::with_dir(cache_dir)
    }
}

/// Default build cache location.
///
/// `ARMFORGE_CACHE_DIR` wins; otherwise the platform cache directory
/// (`~/.cache/armforge/builds` on Linux).
pub fn default_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    dirs::cache_dir()
        .map(|dir| dir.join("armforge").join("builds"))
        .ok_or_else(|| anyhow!("Unable to determine the platform cache directory"))
}

/// Function builder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub cache: CacheConfig,
    /// Maximum number of builds in flight
    pub concurrency: usize,
    /// Record per-build telemetry
    pub telemetry: bool,
    /// Wall-clock limit for one build
    pub build_timeout: Duration,
    /// Stop scheduling queued builds after the first failure
    pub fail_fast: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            concurrency: DEFAULT_BUILD_CONCURRENCY,
            telemetry: true,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            fail_fast: false,
        }
    }
}

impl BuilderConfig {
    pub fn with_cache(cache: CacheConfig) -> Self {
        Self {
            cache,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let synth = SynthesisOptions::default();
        assert!(synth.pretty_print);
        assert!(synth.enable_linked_templates);
        assert_eq!(synth.max_template_size, 3 * 1024 * 1024);

        let cache = CacheConfig::with_dir("/tmp/cache");
        assert_eq!(cache.ttl, Duration::from_millis(3_600_000));
        assert_eq!(cache.max_size, 1_073_741_824);
        assert!(cache.enabled);

        let builder = BuilderConfig::with_cache(cache);
        assert_eq!(builder.concurrency, 4);
        assert!(builder.telemetry);
    }

    #[test]
    fn test_concurrency_is_at_least_one() {
        let builder = BuilderConfig::with_cache(CacheConfig::disabled()).concurrency(0);
        assert_eq!(builder.concurrency, 1);
    }
}
