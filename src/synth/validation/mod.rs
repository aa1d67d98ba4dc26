//! Validation pipeline for synthesized templates.
//!
//! Validators are independent and run in registration order over the
//! generated template. Every validator always runs, so one pass reports every
//! problem. Issues carry a severity; in normal mode only errors block
//! synthesis, in strict mode warnings block as well.
//!
//! Default validators, in order:
//! 1. [`SchemaValidator`] - serialized shape of the template and its resources
//! 2. [`NamingValidator`] - resource naming conventions
//! 3. [`LimitsValidator`] - platform count and size limits
//! 4. [`ResourceRulesValidator`] - resource-specific recommendations
//!
//! # Examples
//!
//! ```rust
//! use armforge::core::DeploymentScope;
//! use armforge::synth::document::{ArmTemplate, TransformedResource};
//! use armforge::synth::validation::{ValidationInput, ValidationOptions, ValidationPipeline};
//!
//! let mut template = ArmTemplate::new(DeploymentScope::ResourceGroup);
//! template.resources.push(
//!     TransformedResource::new("Microsoft.Network/virtualNetworks", "2023-04-01", "vnet")
//!         .with_location("westeurope"),
//! );
//!
//! let report = ValidationPipeline::with_defaults().validate(
//!     &ValidationInput::new(&template.resources, &template, "core"),
//!     &ValidationOptions::default(),
//! );
//! assert!(report.errors.is_empty());
//! ```

mod limits;
mod naming;
mod rules;
mod schema;

pub use limits::LimitsValidator;
pub use naming::NamingValidator;
pub use rules::ResourceRulesValidator;
pub(crate) use rules::is_global;
pub use schema::SchemaValidator;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::document::{ArmTemplate, TransformedResource};
use crate::core::{ArmforgeError, DeploymentScope};

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single problem found by a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Name of the validator that raised the issue
    pub validator: String,
    pub message: String,
    /// Property path, e.g. `resources[2].apiVersion`
    pub path: String,
    pub severity: Severity,
    /// Actionable fix, when one is known
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(validator: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, path, message, Severity::Error)
    }

    pub fn warning(validator: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator, path, message, Severity::Warning)
    }

    fn new(
        validator: &str,
        path: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            validator: validator.to_string(),
            message: message.into(),
            path: path.into(),
            severity,
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.validator, self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

/// How thoroughly to validate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Schema conformance only
    Basic,
    /// Schema, naming and platform limits
    Standard,
    /// Everything, including resource-specific rules
    #[default]
    Full,
}

/// Options for a validation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Treat warnings as blocking
    pub strict: bool,
    pub level: ValidationLevel,
}

/// What validators look at.
pub struct ValidationInput<'a> {
    /// Every resource of the stack, in template form
    pub resources: &'a [TransformedResource],
    /// The generated (root) template
    pub template: &'a ArmTemplate,
    pub stack_name: &'a str,
    /// Deployment scope of the stack
    pub scope: DeploymentScope,
}

impl<'a> ValidationInput<'a> {
    pub fn new(
        resources: &'a [TransformedResource],
        template: &'a ArmTemplate,
        stack_name: &'a str,
    ) -> Self {
        Self {
            resources,
            template,
            stack_name,
            scope: DeploymentScope::ResourceGroup,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: DeploymentScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Pluggable validator contract.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowest level at which this validator runs.
    fn level(&self) -> ValidationLevel {
        ValidationLevel::Basic
    }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationIssue>;
}

/// Aggregated outcome of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether this report fails synthesis.
    pub fn is_blocking(&self, strict: bool) -> bool {
        !self.errors.is_empty() || (strict && !self.warnings.is_empty())
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Turn a blocking report into [`ArmforgeError::ValidationFailed`].
    pub fn into_result(self, stack: &str, strict: bool) -> Result<Self> {
        if !self.is_blocking(strict) {
            return Ok(self);
        }
        Err(ArmforgeError::ValidationFailed {
            stack: stack.to_string(),
            errors: self.errors.iter().map(ToString::to_string).collect(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
        .into())
    }
}

/// Ordered registry of validators.
pub struct ValidationPipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidationPipeline {
    /// Pipeline with no validators.
    pub fn empty() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Pipeline with the built-in validators in their fixed order.
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::empty();
        pipeline.register(Box::new(SchemaValidator));
        pipeline.register(Box::new(NamingValidator));
        pipeline.register(Box::new(LimitsValidator));
        pipeline.register(Box::new(ResourceRulesValidator));
        pipeline
    }

    /// Append a validator; it runs after every validator already registered.
    pub fn register(&mut self, validator: Box<dyn Validator>) -> &mut Self {
        self.validators.push(validator);
        self
    }

    pub fn validator_names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator enabled at `options.level`, sequentially.
    ///
    /// Issue order follows validator registration order.
    pub fn validate(
        &self,
        input: &ValidationInput<'_>,
        options: &ValidationOptions,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        for validator in self.validators.iter().filter(|v| v.level() <= options.level) {
            let issues = validator.validate(input);
            tracing::debug!(
                "Validator {} found {} issue(s) in stack {}",
                validator.name(),
                issues.len(),
                input.stack_name
            );
            for issue in issues {
                match issue.severity {
                    Severity::Error => report.errors.push(issue),
                    Severity::Warning => report.warnings.push(issue),
                }
            }
        }

        report
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Whether `value` is a template language expression such as
/// `[uniqueString(resourceGroup().id)]`. A leading `[[` escapes a literal
/// bracket.
pub(crate) fn is_expression(value: &str) -> bool {
    let value = value.trim();
    value.starts_with('[') && !value.starts_with("[[") && value.ends_with(']')
}
