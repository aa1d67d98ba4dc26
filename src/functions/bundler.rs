//! Handler bundling.
//!
//! [`Compiler`] is the seam to the TypeScript-to-JavaScript toolchain.
//! [`EsbuildCompiler`] drives the `esbuild` executable; tests substitute an
//! in-process fake. [`FunctionBundler`] turns compiler output into a
//! [`BuildArtifact`], extracting dependency and native-module facts from the
//! compiler's metafile.

use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tokio::process::Command;

use super::artifact::BuildArtifact;
use super::descriptor::BuildOptions;
use crate::constants::ESBUILD_ENV;
use crate::core::ArmforgeError;

static NATIVE_MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\.node$|(^|/)binding\.gyp$|(^|/)prebuilds/|(^|/)build/Release/)").expect("valid regex")
});

/// Input to one compilation.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Absolute path of the handler entry point
    pub entry_point: PathBuf,
    pub options: BuildOptions,
}

/// Build metadata reported by the compiler.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Metafile {
    /// Every input file that contributed to the bundle, keyed by path
    #[serde(default)]
    pub inputs: BTreeMap<String, MetafileInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetafileInput {
    #[serde(default)]
    pub bytes: u64,
}

impl Metafile {
    /// A metafile listing `paths` as inputs.
    pub fn from_inputs<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: paths.into_iter().map(|p| (p.into(), MetafileInput::default())).collect(),
        }
    }

    /// Top-level package names of every third-party input.
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.inputs.keys().filter_map(|path| package_name(path)).collect()
    }

    /// Whether any input looks like a native binary or native build file.
    pub fn has_native_modules(&self) -> bool {
        self.inputs.keys().any(|path| NATIVE_MODULE_RE.is_match(&path.replace('\\', "/")))
    }
}

/// Package name owning `path`, taken from the segment after the last
/// `node_modules/`. Scoped packages keep their `@scope/` prefix.
fn package_name(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    let (_, rest) = normalized.rsplit_once("node_modules/")?;
    let mut segments = rest.split('/').filter(|s| !s.is_empty());
    let first = segments.next()?;
    if first.starts_with('@') {
        let second = segments.next()?;
        Some(format!("{first}/{second}"))
    } else {
        Some(first.to_string())
    }
}

/// Compiler output held in memory.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub code: Vec<u8>,
    pub source_map: Option<Vec<u8>>,
    pub metafile: Metafile,
}

/// A TypeScript-to-JavaScript bundler.
pub trait Compiler: Send + Sync {
    /// Toolchain version string, part of every cache key.
    fn version(&self) -> String;

    fn compile(&self, request: CompileRequest) -> BoxFuture<'_, Result<CompileOutput>>;
}

/// The `esbuild` executable.
///
/// Output goes to a private temporary directory that is removed once the
/// results are read back, so no files are left behind.
#[derive(Debug, Clone)]
pub struct EsbuildCompiler {
    executable: PathBuf,
    version: String,
}

impl EsbuildCompiler {
    /// Find esbuild via `ARMFORGE_ESBUILD` or `PATH` and query its version.
    pub async fn locate() -> Result<Self> {
        let executable = match std::env::var_os(ESBUILD_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => which::which("esbuild").map_err(|_| ArmforgeError::CompilerNotFound {
                name: "esbuild".to_string(),
            })?,
        };

        let output = Command::new(&executable)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {} --version", executable.display()))?;
        if !output.status.success() {
            return Err(ArmforgeError::CompilerNotFound {
                name: executable.display().to_string(),
            }
            .into());
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(target: "bundler", "Using esbuild {version} at {}", executable.display());
        Ok(Self::with_executable(executable, format!("esbuild {version}")))
    }

    pub fn with_executable(executable: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            version: version.into(),
        }
    }

    /// Command-line arguments for one build into `outfile`.
    fn args(request: &CompileRequest, outfile: &Path, metafile: &Path) -> Vec<String> {
        let options = &request.options;
        let mut args = vec![
            request.entry_point.display().to_string(),
            "--bundle".to_string(),
            "--platform=node".to_string(),
            "--format=cjs".to_string(),
            format!("--target={}", options.target),
            "--tree-shaking=true".to_string(),
            "--log-level=error".to_string(),
            format!("--outfile={}", outfile.display()),
            format!("--metafile={}", metafile.display()),
        ];
        if options.minify {
            args.push("--minify".to_string());
        }
        if options.source_map {
            args.push("--sourcemap=external".to_string());
        }
        for package in &options.external {
            args.push(format!("--external:{package}"));
        }
        for (key, value) in &options.define {
            args.push(format!("--define:{key}={value}"));
        }
        args
    }

    async fn run(&self, request: CompileRequest) -> Result<CompileOutput> {
        let out_dir = tempfile::Builder::new()
            .prefix("armforge-esbuild-")
            .tempdir()
            .context("Failed to create compiler output directory")?;
        let outfile = out_dir.path().join("index.js");
        let metafile = out_dir.path().join("meta.json");
        let args = Self::args(&request, &outfile, &metafile);

        tracing::debug!(target: "bundler", "Executing: {} {}", self.executable.display(), args.join(" "));

        let mut command = Command::new(&self.executable);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = request.entry_point.parent() {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.executable.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "esbuild exited with {}: {}",
                output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr.trim()
            ));
        }

        let code = tokio::fs::read(&outfile).await.context("Compiler produced no output file")?;
        let source_map = if request.options.source_map {
            tokio::fs::read(out_dir.path().join("index.js.map")).await.ok()
        } else {
            None
        };
        let metafile: Metafile = match tokio::fs::read(&metafile).await {
            Ok(content) => serde_json::from_slice(&content).context("Failed to parse compiler metafile")?,
            Err(_) => Metafile::default(),
        };

        Ok(CompileOutput {
            code,
            source_map,
            metafile,
        })
    }
}

impl Compiler for EsbuildCompiler {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn compile(&self, request: CompileRequest) -> BoxFuture<'_, Result<CompileOutput>> {
        Box::pin(self.run(request))
    }
}

/// Turns handlers into [`BuildArtifact`]s.
#[derive(Clone)]
pub struct FunctionBundler {
    compiler: Arc<dyn Compiler>,
}

impl FunctionBundler {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }

    pub fn compiler_version(&self) -> String {
        self.compiler.version()
    }

    /// Bundle one handler.
    ///
    /// Compiler failures become [`ArmforgeError::BuildFailed`] carrying the
    /// function id and name; an empty bundle is [`ArmforgeError::EmptyBundle`].
    pub async fn bundle(
        &self,
        function_id: &str,
        function_name: &str,
        handler: &Path,
        options: &BuildOptions,
    ) -> Result<BuildArtifact> {
        let started = Instant::now();
        let build_failed = |reason: String| ArmforgeError::BuildFailed {
            function_id: function_id.to_string(),
            function_name: function_name.to_string(),
            reason,
        };

        let entry_point = tokio::fs::canonicalize(handler)
            .await
            .map_err(|e| build_failed(format!("cannot resolve handler {}: {e}", handler.display())))?;

        let output = self
            .compiler
            .compile(CompileRequest {
                entry_point,
                options: options.clone(),
            })
            .await
            .map_err(|e| build_failed(format!("{e:#}")))?;

        if output.code.is_empty() {
            return Err(ArmforgeError::EmptyBundle {
                function_id: function_id.to_string(),
            }
            .into());
        }

        let dependencies = output.metafile.dependencies();
        let has_native_modules = output.metafile.has_native_modules();
        let build_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::debug!(
            target: "bundler",
            "Bundled {function_id}: {} bytes, {} dependencies, native={has_native_modules}",
            output.code.len(),
            dependencies.len()
        );

        Ok(BuildArtifact::new(
            function_id,
            function_name,
            output.code,
            output.source_map,
            dependencies,
            has_native_modules,
            build_time_ms,
        ))
    }
}
