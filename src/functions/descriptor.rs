//! Function descriptors and build options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::bindings::{InputBinding, OutputBinding, Trigger};

/// Compiler options for one function.
///
/// Serialized canonically (fixed field order, sorted maps) so the JSON form
/// can be hashed into the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    pub minify: bool,
    pub source_map: bool,
    /// Runtime target passed to the compiler, e.g. `node18`
    pub target: String,
    /// Packages left out of the bundle
    pub external: Vec<String>,
    /// Compile-time constant substitutions
    pub define: BTreeMap<String, String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            minify: true,
            source_map: false,
            target: "node18".to_string(),
            external: Vec::new(),
            define: BTreeMap::new(),
        }
    }
}

impl BuildOptions {
    /// Canonical JSON form used for hashing.
    pub fn canonical_json(&self) -> String {
        let mut canonical = self.clone();
        canonical.external.sort();
        canonical.external.dedup();
        // BuildOptions only holds strings, bools and string maps
        serde_json::to_string(&canonical).unwrap_or_default()
    }
}

/// Everything needed to build and package one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    /// Unique id, used as the artifact map key
    pub id: String,
    pub name: String,
    /// Absolute path of the handler entry point
    pub handler: PathBuf,
    /// Optional declarative configuration file (`resource.json`/`.yaml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_config: Option<PathBuf>,
    #[serde(default)]
    pub options: BuildOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputBinding>,
}

impl FunctionDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, handler: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            handler: handler.into(),
            resource_config: None,
            options: BuildOptions::default(),
            trigger: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn with_resource_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.resource_config = Some(path.into());
        self
    }
}
