//! Function build pipeline.
//!
//! Function constructs name a TypeScript handler. Building one means:
//!
//! 1. compute a content-addressed cache key and try the [`BuildCache`]
//! 2. on a miss, bundle the handler with a [`Compiler`] (esbuild)
//! 3. pick a [`PackagingStrategy`] from the bundle's size, dependencies and
//!    native modules
//! 4. package the artifact for deployment ([`package_for_strategy`])
//!
//! [`FunctionBuilder`] runs steps 1-3 for a batch with bounded concurrency
//! and per-build telemetry; the synthesizer performs step 4 when it writes
//! the cloud assembly.

mod artifact;
mod bindings;
mod builder;
mod bundler;
mod cache;
mod config_loader;
mod descriptor;
mod packager;
mod strategy;
mod telemetry;

pub use artifact::{BuildArtifact, BuildMetadata, estimate_memory_mb};
pub use bindings::{AuthLevel, InputBinding, OutputBinding, Trigger, binding_descriptors, validate_bindings};
pub use builder::{BuildFailure, BuildOutcome, BuiltFunction, FunctionBuilder};
pub use bundler::{CompileOutput, CompileRequest, Compiler, EsbuildCompiler, FunctionBundler, Metafile, MetafileInput};
pub use cache::{BuildCache, CacheEntry, CacheStats};
pub use config_loader::{ConfigLoader, DeclarativeConfigLoader, FunctionConfig};
pub use descriptor::{BuildOptions, FunctionDescriptor};
pub use packager::{DeploymentConfig, FunctionPackage, StoragePackager, package_for_strategy};
pub use strategy::PackagingStrategy;
pub use telemetry::{BuildStats, BuildTelemetry, TelemetryRecord};
