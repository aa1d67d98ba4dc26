//! Cloud assembly output.
//!
//! Everything the synthesizer produced is written below the output
//! directory:
//!
//! ```text
//! {outdir}/
//!   {stack}.json                      root template of each stack
//!   {stack}-linked-{n}.json           linked templates, when split
//!   functions/{name}/index.js         bundle of each function
//!   functions/{name}/index.js.map     source map, when built with one
//!   functions/{name}/{name}.zip       archive, for storage packaging
//!   manifest.json                     written last
//! ```
//!
//! Files are first written to a staging directory inside the output
//! directory and moved into place only once all of them were written.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{PackagedFunction, SynthesizedStack};
use crate::constants::MANIFEST_VERSION;
use crate::core::{ArmforgeError, DeploymentScope};
use crate::functions::{DeploymentConfig, PackagingStrategy};
use crate::utils::fs::promote_dir;
use crate::utils::{atomic_write, atomic_write_multiple, ensure_dir, is_safe_file_name};

pub const MANIFEST_FILE: &str = "manifest.json";
const FUNCTIONS_DIR: &str = "functions";

/// Index of a cloud assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub stacks: Vec<StackManifest>,
    #[serde(default)]
    pub functions: Vec<FunctionManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackManifest {
    pub name: String,
    pub scope: DeploymentScope,
    /// Root template, relative to the output directory
    pub template_file: String,
    #[serde(default)]
    pub linked_templates: Vec<String>,
    #[serde(default)]
    pub deployment_order: Vec<String>,
    pub resource_count: usize,
    pub parameter_count: usize,
    pub output_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionManifest {
    pub function_id: String,
    pub function_name: String,
    /// Stack declaring the function
    pub stack: String,
    pub strategy: PackagingStrategy,
    /// Deployable file, relative to the output directory
    pub artifact: String,
    /// `sha256:<hex>` digest of the deployable file
    pub integrity: String,
    pub size: u64,
    pub cache_hit: bool,
}

/// Compute the manifest for a synthesis result without touching disk.
pub fn build_manifest(stacks: &[SynthesizedStack], functions: &[PackagedFunction]) -> Manifest {
    let stacks = stacks
        .iter()
        .map(|stack| {
            let templates = &stack.templates;
            StackManifest {
                name: stack.name.clone(),
                scope: stack.scope,
                template_file: template_file(&stack.name),
                linked_templates: templates.linked.keys().map(|name| template_file(name)).collect(),
                deployment_order: templates.deployment_order.clone(),
                resource_count: templates.resource_count(),
                parameter_count: templates.root.parameters.len(),
                output_count: templates.root.outputs.len(),
            }
        })
        .collect();

    let functions = functions
        .iter()
        .map(|function| {
            let package = &function.package;
            let name = &package.artifact.function_name;
            let (artifact, size) = match &package.deployment {
                DeploymentConfig::Storage {
                    blob_name,
                    size,
                    ..
                } => (function_file(name, blob_name), *size),
                _ => (function_file(name, "index.js"), package.artifact.metadata.size),
            };
            FunctionManifest {
                function_id: package.artifact.function_id.clone(),
                function_name: name.clone(),
                stack: function.stack.clone(),
                strategy: package.strategy,
                artifact,
                integrity: package.integrity(),
                size,
                cache_hit: function.cache_hit,
            }
        })
        .collect();

    Manifest {
        version: MANIFEST_VERSION.to_string(),
        stacks,
        functions,
    }
}

fn checked_name<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    if is_safe_file_name(name) {
        Ok(name)
    } else {
        Err(ArmforgeError::UnsafeName {
            kind: kind.to_string(),
            name: name.to_string(),
        }
        .into())
    }
}

fn template_file(name: &str) -> String {
    format!("{name}.json")
}

fn function_file(function_name: &str, file: &str) -> String {
    format!("{FUNCTIONS_DIR}/{function_name}/{file}")
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<Vec<u8>> {
    let bytes = if pretty { serde_json::to_vec_pretty(value) } else { serde_json::to_vec(value) };
    bytes.context("Failed to serialize assembly document")
}

/// Every file of the assembly except the manifest, relative to the output
/// directory. Names are checked before any path is built, and two sources
/// mapping to the same file are an error.
fn assembly_files(
    stacks: &[SynthesizedStack],
    functions: &[PackagedFunction],
    pretty: bool,
) -> Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut files = Vec::new();

    for stack in stacks {
        let name = checked_name("Stack", &stack.name)?;
        files.push((PathBuf::from(template_file(name)), to_json(&stack.templates.root, pretty)?));
        for (name, template) in &stack.templates.linked {
            let name = checked_name("Template", name)?;
            files.push((PathBuf::from(template_file(name)), to_json(template, pretty)?));
        }
    }

    for function in functions {
        let artifact = &function.package.artifact;
        let name = checked_name("Function", &artifact.function_name)?;
        files.push((PathBuf::from(function_file(name, "index.js")), artifact.bundle.clone()));
        if let Some(map) = &artifact.source_map {
            files.push((PathBuf::from(function_file(name, "index.js.map")), map.clone()));
        }
        if let DeploymentConfig::Storage {
            archive,
            blob_name,
            ..
        } = &function.package.deployment
        {
            let blob_name = checked_name("Archive", blob_name)?;
            files.push((PathBuf::from(function_file(name, blob_name)), archive.clone()));
        }
    }

    let mut seen = BTreeSet::new();
    for (path, _) in &files {
        if !seen.insert(path.as_path()) {
            return Err(ArmforgeError::DuplicateName {
                kind: "output file".to_string(),
                name: path.display().to_string(),
                scope: "assembly".to_string(),
            }
            .into());
        }
    }

    Ok(files)
}

/// Write the assembly below `outdir` and return its manifest.
pub async fn assemble(
    outdir: &Path,
    stacks: &[SynthesizedStack],
    functions: &[PackagedFunction],
    pretty: bool,
) -> Result<Manifest> {
    let manifest = build_manifest(stacks, functions);
    let files = assembly_files(stacks, functions, pretty)?;
    let manifest_bytes = to_json(&manifest, pretty)?;

    ensure_dir(outdir)?;
    let staging = tempfile::Builder::new()
        .prefix(".armforge-staging-")
        .tempdir_in(outdir)
        .with_context(|| format!("Failed to create staging directory in {}", outdir.display()))?;

    let staged: Vec<(PathBuf, Vec<u8>)> =
        files.into_iter().map(|(relative, content)| (staging.path().join(relative), content)).collect();
    atomic_write_multiple(staged).await?;

    let staging_path = staging.path().to_path_buf();
    let destination = outdir.to_path_buf();
    let promoted = tokio::task::spawn_blocking(move || promote_dir(&staging_path, &destination))
        .await
        .context("Assembly promotion task panicked")??;

    atomic_write(&outdir.join(MANIFEST_FILE), &manifest_bytes)?;
    tracing::info!(
        "Wrote {} file(s) and {MANIFEST_FILE} to {}",
        promoted.len(),
        outdir.display()
    );

    Ok(manifest)
}
