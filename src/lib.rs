//! armforge - synthesize construct trees into ARM templates and build
//! serverless function artifacts.
//!
//! # Architecture Overview
//!
//! Two pipelines share one data model:
//!
//! - **Synthesis** ([`synth`]) walks a construct tree ([`construct`]),
//!   lowers every resource to its template form, wires and sorts
//!   dependencies, splits oversized templates into linked templates,
//!   validates the result and writes a cloud assembly with a manifest.
//! - **Function builds** ([`functions`]) bundle TypeScript handlers with
//!   esbuild through a content-addressed build cache, choose a packaging
//!   strategy per artifact and package storage deployments as zip archives.
//!
//! # Modules
//!
//! - [`cli`] - `synth`, `build` and `cache` commands
//! - [`config`] - synthesis, builder and cache options plus `armforge.toml`
//! - [`constants`] - platform limits and defaults
//! - [`construct`] - construct tree read API and declarative app documents
//! - [`core`] - error taxonomy and deployment scopes
//! - [`functions`] - function build pipeline
//! - [`synth`] - synthesis pipeline
//! - [`utils`] - hashing, atomic file writes and progress bars
//!
//! # App document
//!
//! ```yaml
//! name: shop
//! stacks:
//!   - name: shop-core
//!     location: westeurope
//!     resources:
//!       - type: Microsoft.Storage/storageAccounts
//!         apiVersion: "2023-01-01"
//!         name: shopdata
//!     functions:
//!       - name: orders
//!         handler: src/orders.ts
//!         trigger: { type: http, methods: [GET] }
//! ```
//!
//! # Output
//!
//! ```text
//! armforge.out/
//!   shop-core.json
//!   functions/orders/index.js
//!   manifest.json
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod construct;
pub mod core;
pub mod functions;
pub mod synth;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
