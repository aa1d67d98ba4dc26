//! Concurrency-limited function build orchestration.
//!
//! [`FunctionBuilder::build_all`] runs in three steps:
//! 1. Pre-flight: every handler must exist, function ids must be unique and
//!    every configuration file must parse. All problems of a kind are
//!    reported together before any build starts.
//! 2. Scheduling: a single coordinating loop owns the pending queue and the
//!    in-flight set ([`FuturesUnordered`]). It tops the in-flight set up to
//!    the concurrency limit, waits for one build to settle, records its
//!    outcome and repeats until both are empty.
//! 3. Reporting: failures never cancel builds already in flight. They are
//!    collected and surfaced together once everything has settled.
//!
//! Each build is bounded by a wall-clock timeout. A build that times out is
//! dropped, which kills its compiler process and frees its slot.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::artifact::BuildArtifact;
use super::bindings::validate_bindings;
use super::bundler::{Compiler, FunctionBundler};
use super::cache::BuildCache;
use super::config_loader::{ConfigLoader, DeclarativeConfigLoader};
use super::descriptor::FunctionDescriptor;
use super::strategy::PackagingStrategy;
use super::telemetry::{BuildStats, BuildTelemetry, TelemetryRecord};
use crate::config::BuilderConfig;
use crate::core::ArmforgeError;

/// A successfully built function.
#[derive(Debug, Clone)]
pub struct BuiltFunction {
    /// Descriptor with its configuration file merged in
    pub descriptor: FunctionDescriptor,
    pub artifact: BuildArtifact,
    pub strategy: PackagingStrategy,
    pub cache_hit: bool,
    /// App settings from the configuration file
    pub environment: BTreeMap<String, String>,
}

/// A function whose build failed or was never started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub function_id: String,
    pub function_name: String,
    pub message: String,
}

/// Result of a batch once every build has settled.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    /// Successful builds keyed by function id
    pub artifacts: BTreeMap<String, BuiltFunction>,
    pub failures: Vec<BuildFailure>,
    pub telemetry: Vec<TelemetryRecord>,
}

impl BuildOutcome {
    /// Fail with [`ArmforgeError::BatchBuildFailed`] when any build failed.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        Err(ArmforgeError::BatchBuildFailed {
            failures: self
                .failures
                .iter()
                .map(|f| format!("{} ({}): {}", f.function_name, f.function_id, f.message))
                .collect(),
        }
        .into())
    }
}

/// A descriptor ready to build.
struct BuildJob {
    descriptor: FunctionDescriptor,
    environment: BTreeMap<String, String>,
}

/// Builds functions through the cache and bundler.
pub struct FunctionBuilder {
    config: BuilderConfig,
    cache: BuildCache,
    bundler: FunctionBundler,
    config_loader: Arc<dyn ConfigLoader>,
    telemetry: BuildTelemetry,
    progress: Option<ProgressBar>,
}

impl FunctionBuilder {
    pub fn new(config: BuilderConfig, compiler: Arc<dyn Compiler>) -> Self {
        let cache = BuildCache::new(config.cache.clone(), compiler.version());
        let telemetry = BuildTelemetry::new(config.telemetry);
        Self {
            config,
            cache,
            bundler: FunctionBundler::new(compiler),
            config_loader: Arc::new(DeclarativeConfigLoader),
            telemetry,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_config_loader(mut self, loader: Arc<dyn ConfigLoader>) -> Self {
        self.config_loader = loader;
        self
    }

    /// Advance `progress` by one for every settled build.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Telemetry of the current run.
    pub fn telemetry(&self) -> &[TelemetryRecord] {
        self.telemetry.records()
    }

    pub fn stats(&self) -> BuildStats {
        self.telemetry.stats()
    }

    /// Build every descriptor; any failure fails the batch after all builds
    /// have settled.
    pub async fn build_all(&mut self, descriptors: &[FunctionDescriptor]) -> Result<BuildOutcome> {
        self.build_all_settled(descriptors).await?.into_result()
    }

    /// Build every descriptor and report successes and failures side by side.
    ///
    /// Only pre-flight problems are returned as errors. Telemetry is reset at
    /// the start of each call.
    pub async fn build_all_settled(&mut self, descriptors: &[FunctionDescriptor]) -> Result<BuildOutcome> {
        self.telemetry.reset();
        let jobs = self.preflight(descriptors).await?;
        let concurrency = self.config.concurrency.max(1);
        let limit = self.config.build_timeout;

        tracing::info!("Building {} function(s) with concurrency {concurrency}", jobs.len());

        let cache = &self.cache;
        let bundler = &self.bundler;
        let telemetry = &mut self.telemetry;
        let progress = self.progress.as_ref();

        let mut queue: VecDeque<BuildJob> = jobs.into();
        let mut in_flight = FuturesUnordered::new();
        let mut outcome = BuildOutcome::default();
        let mut scheduling = true;

        loop {
            while scheduling && in_flight.len() < concurrency {
                let Some(job) = queue.pop_front() else {
                    break;
                };
                tracing::debug!("Scheduling build of {}", job.descriptor.id);
                in_flight.push(run_build(cache, bundler, job, limit));
            }

            let Some((job, elapsed, result)) = in_flight.next().await else {
                break;
            };
            if let Some(progress) = progress {
                progress.inc(1);
            }

            let build_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            match result {
                Ok(built) => {
                    telemetry.record(TelemetryRecord {
                        function_id: built.descriptor.id.clone(),
                        build_time_ms,
                        bundle_size: built.artifact.metadata.size,
                        cache_hit: built.cache_hit,
                        strategy: Some(built.strategy),
                        success: true,
                        error: None,
                    });
                    outcome.artifacts.insert(built.descriptor.id.clone(), built);
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    tracing::warn!("Build of {} failed: {message}", job.id);
                    telemetry.record(TelemetryRecord::failure(&job.id, build_time_ms, &message));
                    outcome.failures.push(BuildFailure {
                        function_id: job.id.clone(),
                        function_name: job.name.clone(),
                        message,
                    });
                    if self.config.fail_fast {
                        scheduling = false;
                    }
                }
            }
        }

        for job in queue {
            outcome.failures.push(BuildFailure {
                function_id: job.descriptor.id,
                function_name: job.descriptor.name,
                message: "not built: an earlier build failed".to_string(),
            });
        }

        outcome.telemetry = telemetry.snapshot();
        let stats = telemetry.stats();
        tracing::info!(
            "Built {} function(s): {} cache hit(s), {} failure(s)",
            stats.total,
            stats.cache_hits,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    /// Build a single function. Its telemetry is appended to the current run.
    pub async fn build_one(&mut self, descriptor: &FunctionDescriptor) -> Result<BuiltFunction> {
        let mut jobs = self.preflight(std::slice::from_ref(descriptor)).await?;
        let Some(job) = jobs.pop() else {
            unreachable!("pre-flight returns one job per descriptor");
        };

        let (job, elapsed, result) = run_build(&self.cache, &self.bundler, job, self.config.build_timeout).await;
        let build_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(built) => self.telemetry.record(TelemetryRecord {
                function_id: job.id.clone(),
                build_time_ms,
                bundle_size: built.artifact.metadata.size,
                cache_hit: built.cache_hit,
                strategy: Some(built.strategy),
                success: true,
                error: None,
            }),
            Err(e) => self.telemetry.record(TelemetryRecord::failure(&job.id, build_time_ms, format!("{e:#}"))),
        }
        result
    }

    /// Check inputs for the whole batch and merge configuration files.
    async fn preflight(&self, descriptors: &[FunctionDescriptor]) -> Result<Vec<BuildJob>> {
        let mut missing: Vec<PathBuf> = Vec::new();
        for descriptor in descriptors {
            let exists = tokio::fs::metadata(&descriptor.handler).await.is_ok_and(|m| m.is_file());
            if !exists {
                missing.push(descriptor.handler.clone());
            }
        }
        if !missing.is_empty() {
            return Err(ArmforgeError::HandlerNotFound { paths: missing }.into());
        }

        let mut seen = BTreeSet::new();
        for descriptor in descriptors {
            if !seen.insert(descriptor.id.as_str()) {
                return Err(ArmforgeError::DuplicateName {
                    kind: "function".to_string(),
                    name: descriptor.id.clone(),
                    scope: "build batch".to_string(),
                }
                .into());
            }
        }

        let mut jobs = Vec::with_capacity(descriptors.len());
        let mut problems: Vec<ArmforgeError> = Vec::new();
        for descriptor in descriptors {
            let (descriptor, environment) = match &descriptor.resource_config {
                Some(path) => match self.config_loader.load(path) {
                    Ok(config) => {
                        let environment = config.environment.clone();
                        (config.apply_to(descriptor.clone()), environment)
                    }
                    Err(e) => {
                        problems.push(match e.downcast::<ArmforgeError>() {
                            Ok(typed) => typed,
                            Err(e) => ArmforgeError::InvalidConfig {
                                path: path.display().to_string(),
                                reason: format!("{e:#}"),
                            },
                        });
                        continue;
                    }
                },
                None => (descriptor.clone(), BTreeMap::new()),
            };

            if let Some(trigger) = &descriptor.trigger
                && let Err(e) = validate_bindings(trigger, &descriptor.inputs, &descriptor.outputs)
            {
                problems.push(ArmforgeError::InvalidConfig {
                    path: format!("function '{}'", descriptor.id),
                    reason: format!("{e:#}"),
                });
                continue;
            }

            jobs.push(BuildJob {
                descriptor,
                environment,
            });
        }

        match problems.len() {
            0 => Ok(jobs),
            1 => Err(problems.remove(0).into()),
            n => Err(anyhow::anyhow!(
                "{n} function configurations are invalid:\n{}",
                problems.iter().map(|p| format!("  - {p}")).collect::<Vec<_>>().join("\n")
            )),
        }
    }
}

/// Identity of a settled build, kept for failure reporting.
struct JobIdentity {
    id: String,
    name: String,
}

/// Run one build under the timeout.
async fn run_build(
    cache: &BuildCache,
    bundler: &FunctionBundler,
    job: BuildJob,
    limit: Duration,
) -> (JobIdentity, Duration, Result<BuiltFunction>) {
    let identity = JobIdentity {
        id: job.descriptor.id.clone(),
        name: job.descriptor.name.clone(),
    };
    let started = Instant::now();

    let result = match tokio::time::timeout(limit, build(cache, bundler, job)).await {
        Ok(result) => result.with_context(|| {
            format!("Failed to build function '{}' ({})", identity.name, identity.id)
        }),
        Err(_) => Err(ArmforgeError::BuildTimeout {
            function_id: identity.id.clone(),
            seconds: limit.as_secs(),
        }
        .into()),
    };

    (identity, started.elapsed(), result)
}

/// Cache lookup, then bundling on a miss.
async fn build(cache: &BuildCache, bundler: &FunctionBundler, job: BuildJob) -> Result<BuiltFunction> {
    let BuildJob {
        descriptor,
        environment,
    } = job;

    let key = cache
        .cache_key(&descriptor.handler, &descriptor.options, descriptor.resource_config.as_deref())
        .await?;

    if let Some(entry) = cache.get(&key).await {
        let mut artifact = entry.artifact;
        // identical inputs can be shared by several functions
        artifact.function_id = descriptor.id.clone();
        artifact.function_name = descriptor.name.clone();
        let strategy = entry
            .strategy
            .unwrap_or_else(|| PackagingStrategy::for_metadata(&artifact.metadata));
        return Ok(BuiltFunction {
            descriptor,
            artifact,
            strategy,
            cache_hit: true,
            environment,
        });
    }

    let artifact = bundler
        .bundle(&descriptor.id, &descriptor.name, &descriptor.handler, &descriptor.options)
        .await?;
    let strategy = PackagingStrategy::for_metadata(&artifact.metadata);
    cache.set(&key, &artifact, strategy).await;

    Ok(BuiltFunction {
        descriptor,
        artifact,
        strategy,
        cache_hit: false,
        environment,
    })
}
