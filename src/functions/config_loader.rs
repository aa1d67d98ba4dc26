//! Declarative per-function configuration.
//!
//! A function may ship a `resource.json` or `resource.yaml` next to its
//! handler describing its trigger, bindings, build option overrides and
//! app settings. The file is parsed, never executed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::bindings::{InputBinding, OutputBinding, Trigger, validate_bindings};
use super::descriptor::{BuildOptions, FunctionDescriptor};
use crate::core::ArmforgeError;

/// Parsed contents of a function configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionConfig {
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    #[serde(default)]
    pub outputs: Vec<OutputBinding>,
    /// Replaces the descriptor's build options when present
    #[serde(default)]
    pub options: Option<BuildOptions>,
    /// App settings for the function runtime
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl FunctionConfig {
    /// Merge into `descriptor`. Values present in the file win; the
    /// descriptor keeps whatever the file leaves out.
    pub fn apply_to(self, mut descriptor: FunctionDescriptor) -> FunctionDescriptor {
        if self.trigger.is_some() {
            descriptor.trigger = self.trigger;
        }
        if !self.inputs.is_empty() {
            descriptor.inputs = self.inputs;
        }
        if !self.outputs.is_empty() {
            descriptor.outputs = self.outputs;
        }
        if let Some(options) = self.options {
            descriptor.options = options;
        }
        descriptor
    }
}

/// Source of function configuration.
pub trait ConfigLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<FunctionConfig>;
}

/// Reads JSON or YAML configuration files, chosen by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeConfigLoader;

impl DeclarativeConfigLoader {
    fn parse(path: &Path, content: &str) -> Result<FunctionConfig> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let config: FunctionConfig = match extension {
            "json" => serde_json::from_str(content).context("invalid JSON")?,
            "yaml" | "yml" => serde_yaml::from_str(content).context("invalid YAML")?,
            other => anyhow::bail!("unsupported configuration format '.{other}'"),
        };

        if let Some(trigger) = &config.trigger {
            validate_bindings(trigger, &config.inputs, &config.outputs)?;
        }
        Ok(config)
    }
}

impl ConfigLoader for DeclarativeConfigLoader {
    fn load(&self, path: &Path) -> Result<FunctionConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| ArmforgeError::InvalidConfig {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::parse(path, &content).map_err(|e| {
            ArmforgeError::InvalidConfig {
                path: path.display().to_string(),
                reason: format!("{e:#}"),
            }
            .into()
        })
    }
}
