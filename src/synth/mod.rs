//! Synthesis pipeline
//!
//! [`Synthesizer`] turns a construct tree into a cloud assembly, moving
//! through a fixed sequence of phases:
//!
//! ```text
//! Prepare -> Transform -> SplitAndPackage -> Validate -> Assemble -> Done
//! ```
//!
//! - **Prepare** walks the tree, groups resources and functions by stack and
//!   rejects scope violations ([`traverser`]).
//! - **Transform** lowers resources, applies the stack's default location,
//!   wires `dependsOn` and sorts each stack ([`transformer`], [`resolver`]).
//! - **SplitAndPackage** splits oversized templates ([`splitter`]) and
//!   builds and packages every function.
//! - **Validate** runs the [`validation`] pipeline over every root template.
//!   It is skipped when `skip_validation` is set.
//! - **Assemble** writes templates, function artifacts and the manifest
//!   ([`assembly`]).
//!
//! A failing phase aborts the run with an [`ArmforgeError::PhaseFailed`]
//! context. Nothing is written to the output directory before Assemble.

pub mod assembly;
pub mod document;
pub mod graph;
pub mod resolver;
pub mod splitter;
pub mod transformer;
pub mod traverser;
pub mod validation;

pub use assembly::{FunctionManifest, Manifest, StackManifest};

use anyhow::{Context, Result, anyhow};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::SynthesisOptions;
use crate::construct::ConstructNode;
use crate::core::{ArmforgeError, DeploymentScope};
use crate::functions::{BuildStats, FunctionBuilder, FunctionDescriptor, FunctionPackage, package_for_strategy};
use document::{ArmTemplate, LinkedTemplateSet, TransformedResource};
use resolver::DependencyResolver;
use splitter::SplitOptions;
use transformer::ResourceTransformer;
use traverser::StackCollection;
use validation::{ValidationInput, ValidationOptions, ValidationPipeline, ValidationReport};

/// Phases of a synthesis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Prepare,
    Transform,
    SplitAndPackage,
    Validate,
    Assemble,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Transform => "transform",
            Self::SplitAndPackage => "split-and-package",
            Self::Validate => "validate",
            Self::Assemble => "assemble",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stack after transform and split.
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    /// Construct path
    pub id: String,
    pub name: String,
    pub scope: DeploymentScope,
    /// Every resource of the stack in dependency order, before splitting
    pub resources: Vec<TransformedResource>,
    pub templates: LinkedTemplateSet,
}

/// A function built and packaged for deployment.
#[derive(Debug, Clone)]
pub struct PackagedFunction {
    /// Name of the stack declaring the function
    pub stack: String,
    pub package: FunctionPackage,
    pub cache_hit: bool,
}

/// Everything a synthesis run produced.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub manifest: Manifest,
    pub stacks: Vec<SynthesizedStack>,
    /// Validation report per stack name; empty when validation was skipped
    pub reports: BTreeMap<String, ValidationReport>,
    pub functions: Vec<PackagedFunction>,
    /// Phases entered, in order
    pub phases: Vec<Phase>,
    pub build_stats: Option<BuildStats>,
}

/// Runs the synthesis phases over a construct tree.
///
/// # Examples
///
/// ```rust,no_run
/// use armforge::config::SynthesisOptions;
/// use armforge::construct::load_app;
/// use armforge::synth::Synthesizer;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let tree = load_app(Path::new("app.yaml")).await?;
/// let result = Synthesizer::new(SynthesisOptions::default()).synthesize(&tree).await?;
/// println!("{} stack(s)", result.manifest.stacks.len());
/// # Ok(())
/// # }
/// ```
pub struct Synthesizer {
    options: SynthesisOptions,
    pipeline: ValidationPipeline,
    builder: Option<FunctionBuilder>,
    phases: Vec<Phase>,
}

impl Synthesizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self {
            options,
            pipeline: ValidationPipeline::with_defaults(),
            builder: None,
            phases: Vec::new(),
        }
    }

    /// Builder for the app's functions. Required when the tree has any.
    #[must_use]
    pub fn with_builder(mut self, builder: FunctionBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    #[must_use]
    pub fn with_pipeline(mut self, pipeline: ValidationPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    pub fn builder(&self) -> Option<&FunctionBuilder> {
        self.builder.as_ref()
    }

    /// Phases entered by the last run.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run every phase over `root` and write the assembly.
    pub async fn synthesize(&mut self, root: &ConstructNode) -> Result<SynthesisResult> {
        self.phases.clear();

        self.enter(Phase::Prepare);
        let collection = prepare(root).with_context(|| phase_failed(Phase::Prepare))?;

        self.enter(Phase::Transform);
        let transformed = transform(&collection).with_context(|| phase_failed(Phase::Transform))?;

        self.enter(Phase::SplitAndPackage);
        let (stacks, functions, build_stats) = self
            .split_and_package(&collection, transformed)
            .await
            .with_context(|| phase_failed(Phase::SplitAndPackage))?;

        let mut reports = BTreeMap::new();
        if self.options.skip_validation {
            tracing::info!("Skipping validation");
        } else {
            self.enter(Phase::Validate);
            reports = self.validate(&stacks).with_context(|| phase_failed(Phase::Validate))?;
        }

        self.enter(Phase::Assemble);
        let manifest = assembly::assemble(&self.options.outdir, &stacks, &functions, self.options.pretty_print)
            .await
            .with_context(|| phase_failed(Phase::Assemble))?;

        self.enter(Phase::Done);
        Ok(SynthesisResult {
            manifest,
            stacks,
            reports,
            functions,
            phases: self.phases.clone(),
            build_stats,
        })
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!("Entering {phase} phase");
        self.phases.push(phase);
    }

    async fn split_and_package(
        &mut self,
        collection: &StackCollection,
        transformed: Vec<(String, ArmTemplate)>,
    ) -> Result<(Vec<SynthesizedStack>, Vec<PackagedFunction>, Option<BuildStats>)> {
        let mut stacks = Vec::with_capacity(transformed.len());
        for (info, (id, template)) in collection.iter().zip(transformed) {
            let options = SplitOptions::new(&info.name)
                .with_max_template_size(self.options.max_template_size)
                .with_enabled(self.options.enable_linked_templates)
                .with_pretty(self.options.pretty_print);
            let resources = template.resources.clone();
            let templates = splitter::split(template, &options)?;
            if templates.is_split() {
                tracing::info!("Stack {} split into {} linked templates", info.name, templates.linked.len());
            }
            stacks.push(SynthesizedStack {
                id,
                name: info.name.clone(),
                scope: info.scope,
                resources,
                templates,
            });
        }

        let mut stack_of: HashMap<&str, &str> = HashMap::new();
        let mut descriptors: Vec<FunctionDescriptor> = Vec::new();
        for info in collection.iter() {
            for descriptor in &info.functions {
                stack_of.insert(descriptor.id.as_str(), info.name.as_str());
                descriptors.push(descriptor.clone());
            }
        }
        if descriptors.is_empty() {
            return Ok((stacks, Vec::new(), None));
        }

        let builder = self
            .builder
            .as_mut()
            .ok_or_else(|| anyhow!("App declares {} function(s) but no function builder is configured", descriptors.len()))?;
        let outcome = builder.build_all(&descriptors).await?;
        let build_stats = builder.stats();

        let mut functions = Vec::with_capacity(outcome.artifacts.len());
        for descriptor in &descriptors {
            let Some(built) = outcome.artifacts.get(&descriptor.id) else {
                continue;
            };
            let resolved = &built.descriptor;
            let mut package = package_for_strategy(
                &built.artifact,
                built.strategy,
                resolved.trigger.as_ref(),
                &resolved.inputs,
                &resolved.outputs,
            )?;
            package.app_settings = built.environment.clone();
            functions.push(PackagedFunction {
                stack: stack_of.get(descriptor.id.as_str()).map(|s| (*s).to_string()).unwrap_or_default(),
                package,
                cache_hit: built.cache_hit,
            });
        }

        Ok((stacks, functions, Some(build_stats)))
    }

    /// Validate every root template; blocking issues from all stacks are
    /// reported together.
    fn validate(&self, stacks: &[SynthesizedStack]) -> Result<BTreeMap<String, ValidationReport>> {
        let options = ValidationOptions {
            strict: self.options.strict,
            level: self.options.validation_level,
        };

        let mut reports = BTreeMap::new();
        let mut blocking = Vec::new();
        for stack in stacks {
            let input = ValidationInput::new(&stack.resources, &stack.templates.root, &stack.name)
                .with_scope(stack.scope);
            let report = self.pipeline.validate(&input, &options);
            for warning in &report.warnings {
                tracing::warn!("{}: {warning}", stack.name);
            }
            if report.is_blocking(options.strict) {
                blocking.push(stack.name.clone());
            }
            reports.insert(stack.name.clone(), report);
        }

        if blocking.is_empty() {
            return Ok(reports);
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for name in &blocking {
            let report = &reports[name];
            errors.extend(report.errors.iter().map(|issue| format!("{name}: {issue}")));
            warnings.extend(report.warnings.iter().map(|issue| format!("{name}: {issue}")));
        }
        Err(ArmforgeError::ValidationFailed {
            stack: blocking.join(", "),
            errors,
            warnings,
        }
        .into())
    }
}

fn phase_failed(phase: Phase) -> ArmforgeError {
    ArmforgeError::PhaseFailed {
        phase: phase.to_string(),
    }
}

fn prepare(root: &ConstructNode) -> Result<StackCollection> {
    let traversal = traverser::traverse(root);
    let collection = traverser::collect(&traversal)?;
    traverser::validate_resources(&collection)?;
    tracing::debug!(
        "Collected {} stack(s) from {} construct(s)",
        collection.len(),
        traversal.constructs.len()
    );
    Ok(collection)
}

/// Lower, wire and sort every stack. Returns `(stack id, template)` in stack
/// order.
fn transform(collection: &StackCollection) -> Result<Vec<(String, ArmTemplate)>> {
    let mut templates = Vec::with_capacity(collection.len());

    for stack in collection.iter() {
        let mut resources = ResourceTransformer::transform_all(&stack.resources)?;
        if let Some(location) = &stack.location {
            for resource in resources
                .iter_mut()
                .filter(|r| r.location.is_none() && !validation::is_global(&r.resource_type))
            {
                resource.location = Some(location.clone());
            }
        }

        let resolver = DependencyResolver::new(&stack.name);
        let resources = resolver.resolve(resources, &stack.resources)?;
        let resources = resolver.topological_sort(resources)?;

        let mut template = ArmTemplate::new(stack.scope);
        template.parameters = stack.parameters.clone();
        template.variables = stack.variables.clone();
        template.outputs = stack.outputs.clone();
        template.resources = resources;

        templates.push((stack.id.clone(), template));
    }

    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{GenericResource, StackProps};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn options(temp: &TempDir) -> SynthesisOptions {
        SynthesisOptions {
            outdir: temp.path().join("out"),
            ..SynthesisOptions::default()
        }
    }

    fn tree(resources: Vec<GenericResource>) -> ConstructNode {
        let mut props = StackProps::new("core", DeploymentScope::ResourceGroup);
        props.location = Some("westeurope".to_string());
        let mut stack = ConstructNode::stack("core", props);
        for resource in resources {
            stack.add_child(ConstructNode::resource(Arc::new(resource)));
        }
        ConstructNode::root("app").with_child(stack)
    }

    #[tokio::test]
    async fn test_synthesize_orders_resources_and_records_phases() {
        let temp = TempDir::new().unwrap();
        let root = tree(vec![
            GenericResource::new("Microsoft.Web/sites", "2023-01-01", "site").depends_on("plan"),
            GenericResource::new("Microsoft.Web/serverfarms", "2023-01-01", "plan"),
        ]);

        let mut synthesizer = Synthesizer::new(options(&temp));
        let result = synthesizer.synthesize(&root).await.unwrap();

        let names: Vec<&str> = result.stacks[0].templates.root.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["plan", "site"]);
        assert_eq!(
            result.phases,
            vec![
                Phase::Prepare,
                Phase::Transform,
                Phase::SplitAndPackage,
                Phase::Validate,
                Phase::Assemble,
                Phase::Done
            ]
        );
        assert_eq!(result.stacks[0].resources[0].location.as_deref(), Some("westeurope"));
        assert!(temp.path().join("out/core.json").is_file());
        assert!(temp.path().join("out/manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_cycle_fails_transform_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let root = tree(vec![
            GenericResource::new("Microsoft.Web/sites", "2023-01-01", "a").depends_on("b"),
            GenericResource::new("Microsoft.Web/sites", "2023-01-01", "b").depends_on("a"),
        ]);

        let err = Synthesizer::new(options(&temp)).synthesize(&root).await.unwrap_err();
        assert!(err.to_string().contains("transform phase"));
        assert!(matches!(
            err.downcast_ref::<ArmforgeError>(),
            Some(ArmforgeError::PhaseFailed { .. })
        ));
        assert!(format!("{err:#}").contains("a, b"));
        assert!(!temp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_strict_mode_blocks_on_warnings() {
        let temp = TempDir::new().unwrap();
        // functionapp without siteConfig only draws a warning
        let root = tree(vec![
            GenericResource::new("Microsoft.Web/sites", "2023-01-01", "api").with_kind("functionapp"),
        ]);

        let result = Synthesizer::new(options(&temp)).synthesize(&root).await.unwrap();
        assert!(!result.reports["core"].warnings.is_empty());
        assert!(result.reports["core"].errors.is_empty());

        let mut strict = options(&temp);
        strict.strict = true;
        strict.outdir = temp.path().join("strict");
        let err = Synthesizer::new(strict).synthesize(&root).await.unwrap_err();
        assert!(format!("{err:#}").contains("Validation failed for core"));
        assert!(!temp.path().join("strict").exists());
    }

    #[tokio::test]
    async fn test_skip_validation_skips_phase() {
        let temp = TempDir::new().unwrap();
        let mut options = options(&temp);
        options.skip_validation = true;
        options.strict = true;
        let root = tree(vec![
            GenericResource::new("Microsoft.Web/sites", "2023-01-01", "api").with_kind("functionapp"),
        ]);

        let result = Synthesizer::new(options).synthesize(&root).await.unwrap();
        assert!(!result.phases.contains(&Phase::Validate));
        assert!(result.reports.is_empty());
    }

    #[tokio::test]
    async fn test_functions_require_a_builder() {
        let temp = TempDir::new().unwrap();
        let mut root = tree(Vec::new());
        root.children[0].add_child(ConstructNode::function(FunctionDescriptor::new(
            "orders",
            "orders",
            temp.path().join("orders.ts"),
        )));

        let err = Synthesizer::new(options(&temp)).synthesize(&root).await.unwrap_err();
        assert!(err.to_string().contains("split-and-package phase"));
        assert!(format!("{err:#}").contains("no function builder"));
    }
}
