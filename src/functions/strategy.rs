//! Packaging strategy selection.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::artifact::BuildMetadata;
use crate::constants::{CONTAINER_SIZE_THRESHOLD_KB, EXTERNAL_SIZE_THRESHOLD_KB, INLINE_SIZE_LIMIT_KB};

/// How a built function is shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingStrategy {
    /// Code embedded in the template
    Inline,
    /// Zip archive uploaded to blob storage
    Storage,
    /// Container image
    Container,
    /// Referenced from an external artifact location
    External,
}

impl PackagingStrategy {
    /// Pick a strategy from bundle size and dependency facts.
    ///
    /// Conditions are evaluated in order and the first match wins:
    /// small and dependency-free bundles go inline, native modules or very
    /// large bundles need a container, large bundles are external, and
    /// everything else is packaged for storage.
    pub fn determine(size_kb: f64, dependencies: &[String], has_native_modules: bool) -> Self {
        if size_kb < INLINE_SIZE_LIMIT_KB && dependencies.is_empty() {
            Self::Inline
        } else if has_native_modules || size_kb > CONTAINER_SIZE_THRESHOLD_KB {
            Self::Container
        } else if size_kb > EXTERNAL_SIZE_THRESHOLD_KB {
            Self::External
        } else {
            Self::Storage
        }
    }

    /// Strategy for an artifact described by `metadata`.
    pub fn for_metadata(metadata: &BuildMetadata) -> Self {
        let deps: Vec<String> = metadata.dependencies.iter().cloned().collect();
        Self::determine(metadata.size as f64 / 1024.0, &deps, metadata.has_native_modules)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Storage => "storage",
            Self::Container => "container",
            Self::External => "external",
        }
    }
}

impl fmt::Display for PackagingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
