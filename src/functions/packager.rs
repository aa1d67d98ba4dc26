//! Function packaging.
//!
//! [`package_for_strategy`] turns a built artifact into a [`FunctionPackage`]
//! for its strategy. Only the storage strategy produces an archive; the
//! others emit a deployment reference.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::artifact::BuildArtifact;
use super::bindings::{InputBinding, OutputBinding, Trigger, binding_descriptors};
use super::strategy::PackagingStrategy;
use crate::core::ArmforgeError;
use crate::utils::sha256_integrity;

const SCRIPT_FILE: &str = "index.js";

/// How a package reaches the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DeploymentConfig {
    /// Code embedded in the template
    Inline { code: String },
    /// Zip archive to upload as a blob
    Storage {
        #[serde(skip)]
        archive: Vec<u8>,
        blob_name: String,
        /// `sha256:<hex>` digest of the archive bytes
        integrity: String,
        size: u64,
    },
    Container { image_hint: String },
    External { artifact_uri: String },
}

/// A built function with its packaging decision.
#[derive(Debug, Clone)]
pub struct FunctionPackage {
    pub artifact: BuildArtifact,
    pub strategy: PackagingStrategy,
    pub deployment: DeploymentConfig,
    /// App settings for the runtime
    pub app_settings: BTreeMap<String, String>,
}

impl FunctionPackage {
    /// Integrity digest of the deployable payload.
    pub fn integrity(&self) -> String {
        match &self.deployment {
            DeploymentConfig::Storage { integrity, .. } => integrity.clone(),
            _ => sha256_integrity(&self.artifact.bundle),
        }
    }
}

/// Builds zip archives for blob-storage deployment.
///
/// Archive layout:
/// ```text
/// host.json
/// {functionName}/function.json
/// {functionName}/index.js
/// {functionName}/index.js.map   (when a source map exists)
/// ```
/// Entries carry a fixed timestamp so identical inputs give identical bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoragePackager;

impl StoragePackager {
    pub fn package(
        &self,
        artifact: &BuildArtifact,
        trigger: &Trigger,
        inputs: &[InputBinding],
        outputs: &[OutputBinding],
    ) -> Result<FunctionPackage> {
        let archive = build_archive(artifact, trigger, inputs, outputs).map_err(|e| {
            ArmforgeError::PackagingFailed {
                function_name: artifact.function_name.clone(),
                strategy: PackagingStrategy::Storage.to_string(),
                reason: format!("{e:#}"),
            }
        })?;

        let integrity = sha256_integrity(&archive);
        tracing::debug!(
            "Packaged {} into {} byte archive ({integrity})",
            artifact.function_name,
            archive.len()
        );

        Ok(FunctionPackage {
            artifact: artifact.clone(),
            strategy: PackagingStrategy::Storage,
            deployment: DeploymentConfig::Storage {
                size: archive.len() as u64,
                archive,
                blob_name: format!("{}.zip", artifact.function_name),
                integrity,
            },
            app_settings: BTreeMap::new(),
        })
    }
}

fn function_json(trigger: &Trigger, inputs: &[InputBinding], outputs: &[OutputBinding]) -> Result<Vec<u8>> {
    let document = json!({
        "bindings": binding_descriptors(trigger, inputs, outputs),
        "scriptFile": SCRIPT_FILE,
    });
    serde_json::to_vec_pretty(&document).context("Failed to serialize function.json")
}

fn host_json() -> Result<Vec<u8>> {
    let document = json!({
        "version": "2.0",
        "extensionBundle": {
            "id": "Microsoft.Azure.Functions.ExtensionBundle",
            "version": "[4.*, 5.0.0)",
        },
    });
    serde_json::to_vec_pretty(&document).context("Failed to serialize host.json")
}

fn build_archive(
    artifact: &BuildArtifact,
    trigger: &Trigger,
    inputs: &[InputBinding],
    outputs: &[OutputBinding],
) -> Result<Vec<u8>> {
    let name = &artifact.function_name;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("host.json".to_string(), host_json()?),
        (format!("{name}/function.json"), function_json(trigger, inputs, outputs)?),
        (format!("{name}/{SCRIPT_FILE}"), artifact.bundle.clone()),
    ];
    if let Some(map) = &artifact.source_map {
        entries.push((format!("{name}/{SCRIPT_FILE}.map"), map.clone()));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in entries {
        writer
            .start_file(path.as_str(), options)
            .with_context(|| format!("Failed to add {path} to archive"))?;
        writer
            .write_all(&content)
            .with_context(|| format!("Failed to write {path} to archive"))?;
    }
    let cursor = writer.finish().context("Failed to finalize archive")?;
    Ok(cursor.into_inner())
}

/// Package `artifact` according to `strategy`.
///
/// Storage packaging needs a trigger; a function without one is a
/// packaging error.
pub fn package_for_strategy(
    artifact: &BuildArtifact,
    strategy: PackagingStrategy,
    trigger: Option<&Trigger>,
    inputs: &[InputBinding],
    outputs: &[OutputBinding],
) -> Result<FunctionPackage> {
    let deployment = match strategy {
        PackagingStrategy::Storage => {
            let trigger = trigger.ok_or_else(|| ArmforgeError::PackagingFailed {
                function_name: artifact.function_name.clone(),
                strategy: strategy.to_string(),
                reason: "function has no trigger".to_string(),
            })?;
            return StoragePackager.package(artifact, trigger, inputs, outputs);
        }
        PackagingStrategy::Inline => DeploymentConfig::Inline {
            code: String::from_utf8(artifact.bundle.clone()).map_err(|e| {
                ArmforgeError::PackagingFailed {
                    function_name: artifact.function_name.clone(),
                    strategy: strategy.to_string(),
                    reason: format!("bundle is not valid UTF-8: {e}"),
                }
            })?,
        },
        PackagingStrategy::Container => {
            let tag: String = artifact.metadata.hash.chars().take(12).collect();
            DeploymentConfig::Container {
                image_hint: format!("{}:{tag}", artifact.function_name),
            }
        }
        PackagingStrategy::External => DeploymentConfig::External {
            artifact_uri: format!("functions/{}/{SCRIPT_FILE}", artifact.function_name),
        },
    };

    Ok(FunctionPackage {
        artifact: artifact.clone(),
        strategy,
        deployment,
        app_settings: BTreeMap::new(),
    })
}
