//! Test fixtures: handler files, app documents and a fake compiler.

use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::functions::{CompileOutput, CompileRequest, Compiler, Metafile};

/// Write `src/{name}.ts` under `dir` and return its path.
pub fn write_handler(dir: &Path, name: &str, content: &str) -> PathBuf {
    let src = dir.join("src");
    std::fs::create_dir_all(&src).unwrap();
    let path = src.join(format!("{name}.ts"));
    std::fs::write(&path, content).unwrap();
    path
}

/// In-process stand-in for esbuild.
///
/// The "compiled" bundle is the handler source behind a banner. Markers in
/// the handler control the outcome:
///
/// | Marker            | Effect                                        |
/// |-------------------|-----------------------------------------------|
/// | `// FAIL`         | compilation error                             |
/// | `// EMPTY`        | empty bundle                                  |
/// | `// HANG`         | never finishes within a test timeout          |
/// | `// DEP name`     | `node_modules/name/index.js` in the metafile  |
/// | `// NATIVE`       | a `.node` binary in the metafile              |
/// | `// PAD n`        | bundle padded with `n` bytes                  |
///
/// The compiler counts calls and tracks the highest number of overlapping
/// compilations.
#[derive(Debug, Default)]
pub struct FakeCompiler {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every compilation open for `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, request: CompileRequest) -> Result<CompileOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let source = tokio::fs::read_to_string(&request.entry_point).await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if source.contains("// HANG") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if source.contains("// FAIL") {
            return Err(anyhow!("{}: syntax error", request.entry_point.display()));
        }
        if source.contains("// EMPTY") {
            return Ok(CompileOutput::default());
        }

        let mut inputs = vec![request.entry_point.display().to_string()];
        let mut code = format!("\"use strict\";\n{source}");
        for line in source.lines() {
            let line = line.trim();
            if let Some(dep) = line.strip_prefix("// DEP ") {
                inputs.push(format!("node_modules/{}/index.js", dep.trim()));
            } else if line == "// NATIVE" {
                inputs.push("node_modules/native-addon/build/Release/addon.node".to_string());
            } else if let Some(pad) = line.strip_prefix("// PAD ")
                && let Ok(n) = pad.trim().parse::<usize>()
            {
                code.push_str(&" ".repeat(n));
            }
        }

        let source_map = request
            .options
            .source_map
            .then(|| br#"{"version":3,"mappings":""}"#.to_vec());

        Ok(CompileOutput {
            code: code.into_bytes(),
            source_map,
            metafile: Metafile::from_inputs(inputs),
        })
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Compiler for FakeCompiler {
    fn version(&self) -> String {
        "fake 1.0.0".to_string()
    }

    fn compile(&self, request: CompileRequest) -> BoxFuture<'_, Result<CompileOutput>> {
        Box::pin(self.run(request))
    }
}

/// An app document on disk with its handlers.
#[derive(Debug, Clone)]
pub struct AppFixture {
    pub content: String,
}

impl AppFixture {
    /// One resource-group stack with a storage account, a function app that
    /// depends on it, and one HTTP function.
    pub fn basic() -> Self {
        Self {
            content: r#"
name: shop
stacks:
  - name: shop-core
    location: westeurope
    outputs:
      storageName:
        type: string
        value: shopdata
    resources:
      - type: Microsoft.Web/sites
        apiVersion: "2023-01-01"
        name: shop-api
        kind: functionapp
        dependsOn: [shopdata]
        properties:
          siteConfig: {}
      - type: Microsoft.Storage/storageAccounts
        apiVersion: "2023-01-01"
        name: shopdata
        kind: StorageV2
        sku: { name: Standard_LRS }
    functions:
      - name: orders
        handler: src/orders.ts
        trigger:
          type: http
          methods: [GET, POST]
          route: orders
"#
            .trim_start()
            .to_string(),
        }
    }

    /// Two stacks where the first references a resource of the second.
    pub fn orphan_reference() -> Self {
        Self {
            content: r#"
name: broken
stacks:
  - name: one
    location: westeurope
    resources:
      - type: Microsoft.Web/sites
        apiVersion: "2023-01-01"
        name: site
        dependsOn: [elsewhere]
  - name: two
    location: westeurope
    resources:
      - type: Microsoft.Storage/storageAccounts
        apiVersion: "2023-01-01"
        name: elsewhere
"#
            .trim_start()
            .to_string(),
        }
    }

    /// Write `app.yaml` and a handler for every function under `dir`.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join("app.yaml");
        std::fs::write(&path, &self.content).unwrap();
        if self.content.contains("src/orders.ts") {
            write_handler(dir, "orders", "export const handler = async () => ({ status: 200 });\n");
        }
        path
    }
}
