//! Optional `armforge.toml` project file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::{BuilderConfig, CacheConfig, SynthesisOptions};
use crate::constants::PROJECT_CONFIG_FILE;
use crate::synth::validation::ValidationLevel;

/// `[synth]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthSection {
    pub outdir: Option<PathBuf>,
    pub skip_validation: Option<bool>,
    pub pretty_print: Option<bool>,
    pub strict: Option<bool>,
    pub enable_linked_templates: Option<bool>,
    pub max_template_size: Option<usize>,
    pub validation_level: Option<ValidationLevel>,
}

/// `[build]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    pub concurrency: Option<usize>,
    pub telemetry: Option<bool>,
    pub build_timeout_secs: Option<u64>,
    pub fail_fast: Option<bool>,
}

/// `[cache]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    pub dir: Option<PathBuf>,
    pub ttl_ms: Option<u64>,
    pub max_size: Option<u64>,
    pub enabled: Option<bool>,
}

/// Project-level configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub synth: SynthSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub cache: CacheSection,
    /// Directory the file was loaded from; relative paths resolve against it
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl ProjectConfig {
    /// Load from `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read project config from {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse project config from {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Load from an explicit path, or from `armforge.toml` in the current
    /// directory when it exists, or fall back to defaults.
    pub async fn load_with_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path).await,
            None => {
                let default_path = PathBuf::from(PROJECT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(&default_path).await
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Synthesis options with file values layered over defaults.
    pub fn synthesis_options(&self) -> SynthesisOptions {
        let mut options = SynthesisOptions::default();
        let s = &self.synth;
        if let Some(outdir) = &s.outdir {
            options.outdir = self.resolve(outdir);
        }
        if let Some(v) = s.skip_validation {
            options.skip_validation = v;
        }
        if let Some(v) = s.pretty_print {
            options.pretty_print = v;
        }
        if let Some(v) = s.strict {
            options.strict = v;
        }
        if let Some(v) = s.enable_linked_templates {
            options.enable_linked_templates = v;
        }
        if let Some(v) = s.max_template_size {
            options.max_template_size = v;
        }
        if let Some(v) = s.validation_level {
            options.validation_level = v;
        }
        options
    }

    /// Cache settings with file values layered over defaults.
    pub fn cache_config(&self) -> CacheConfig {
        let mut cache = match &self.cache.dir {
            Some(dir) => CacheConfig::with_dir(self.resolve(dir)),
            None => CacheConfig::default(),
        };
        if let Some(ttl) = self.cache.ttl_ms {
            cache.ttl = Duration::from_millis(ttl);
        }
        if let Some(max_size) = self.cache.max_size {
            cache.max_size = max_size;
        }
        if let Some(enabled) = self.cache.enabled {
            cache.enabled = enabled;
        }
        cache
    }

    /// Builder settings with file values layered over defaults.
    pub fn builder_config(&self) -> BuilderConfig {
        let mut config = BuilderConfig::with_cache(self.cache_config());
        if let Some(concurrency) = self.build.concurrency {
            config = config.concurrency(concurrency);
        }
        if let Some(telemetry) = self.build.telemetry {
            config.telemetry = telemetry;
        }
        if let Some(secs) = self.build.build_timeout_secs {
            config.build_timeout = Duration::from_secs(secs);
        }
        if let Some(fail_fast) = self.build.fail_fast {
            config.fail_fast = fail_fast;
        }
        config
    }
}
