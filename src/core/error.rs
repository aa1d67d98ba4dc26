//! Error handling for armforge
//!
//! This module provides the error taxonomy for the synthesis and function
//! build pipelines plus user-friendly error reporting for the CLI.
//!
//! # Architecture
//!
//! - [`ArmforgeError`] - Enumerated error kinds for every fatal failure
//! - [`ErrorContext`] - Wrapper that adds user-facing details and suggestions
//!
//! # Error Categories
//!
//! - **Structural**: [`ArmforgeError::HandlerNotFound`], [`ArmforgeError::InvalidConfig`],
//!   [`ArmforgeError::OrphanConstruct`], [`ArmforgeError::DuplicateName`], [`ArmforgeError::UnsafeName`]
//! - **Dependencies**: [`ArmforgeError::UnresolvedReference`], [`ArmforgeError::CircularDependency`]
//! - **Placement**: [`ArmforgeError::ScopeViolation`]
//! - **Validation**: [`ArmforgeError::ValidationFailed`]
//! - **Build**: [`ArmforgeError::BuildFailed`], [`ArmforgeError::BuildTimeout`],
//!   [`ArmforgeError::EmptyBundle`], [`ArmforgeError::BatchBuildFailed`]
//! - **Packaging**: [`ArmforgeError::PackagingFailed`]
//!
//! Cache failures are deliberately absent: the build cache logs them and
//! degrades to a miss or a skipped write.
//!
//! Application code returns [`anyhow::Result`] and attaches context as errors
//! propagate. Use [`user_friendly_error`] at the top level to turn any error
//! into a colored diagnostic.

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for armforge operations.
#[derive(Error, Debug, Clone)]
pub enum ArmforgeError {
    /// One or more function handler files are missing.
    ///
    /// Every missing path of a batch is listed together.
    #[error("Handler file(s) not found:\n{}", format_paths(paths))]
    HandlerNotFound {
        /// All missing handler paths
        paths: Vec<PathBuf>,
    },

    /// A configuration document has an invalid shape.
    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig {
        /// Path of the offending document
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Two constructs share a name where names must be unique.
    #[error("Duplicate {kind} name '{name}' in {scope}")]
    DuplicateName {
        /// What kind of thing is duplicated (stack, resource)
        kind: String,
        /// The duplicated name
        name: String,
        /// Where the duplicate was found
        scope: String,
    },

    /// A name that becomes part of an output path is not a plain file name.
    #[error("{kind} name '{name}' cannot be used as a file name")]
    UnsafeName {
        /// What kind of thing is named (stack, function)
        kind: String,
        /// The offending name
        name: String,
    },

    /// Resources or functions that have no enclosing stack.
    #[error("Construct(s) not contained in any stack: {}", paths.join(", "))]
    OrphanConstruct {
        /// Construct paths without a stack ancestor
        paths: Vec<String>,
    },

    /// A resource references a sibling that does not exist.
    #[error("Resource '{resource}' in stack '{stack}' references unknown resource '{target}'{}",
        suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnresolvedReference {
        /// Stack containing the resource
        stack: String,
        /// Resource holding the reference
        resource: String,
        /// Name that could not be resolved
        target: String,
        /// Closest sibling name, if any is similar
        suggestion: Option<String>,
    },

    /// The dependency graph of a stack contains a cycle.
    #[error("Circular dependency detected in stack '{stack}' between: {}", resources.join(", "))]
    CircularDependency {
        /// Stack containing the cycle
        stack: String,
        /// Every resource participating in a cycle
        resources: Vec<String>,
    },

    /// Resources placed in a stack whose scope is narrower than they require.
    #[error("{} scope violation(s):\n{}", violations.len(), format_lines(violations))]
    ScopeViolation {
        /// One message per misplaced resource
        violations: Vec<String>,
    },

    /// A resource failed to lower itself to the template representation.
    #[error("Failed to transform resource '{resource}'")]
    TransformFailed {
        /// Logical id of the resource
        resource: String,
    },

    /// Validation produced blocking issues.
    #[error("Validation failed for {stack}: {} error(s), {} warning(s)\n{}",
        errors.len(), warnings.len(), format_lines(&errors.iter().chain(warnings.iter()).cloned().collect::<Vec<_>>()))]
    ValidationFailed {
        /// Stack (or stacks) that failed validation
        stack: String,
        /// Error-severity issues
        errors: Vec<String>,
        /// Warning-severity issues
        warnings: Vec<String>,
    },

    /// A single resource cannot fit in any template under the size ceiling.
    #[error("Resource '{resource}' in stack '{stack}' needs {size} bytes, exceeding the {limit} byte template ceiling")]
    OversizedResource {
        /// Stack containing the resource
        stack: String,
        /// Resource name
        resource: String,
        /// Serialized size of the smallest document holding the resource
        size: usize,
        /// Configured ceiling
        limit: usize,
    },

    /// A synthesized document exceeds the size ceiling after splitting.
    #[error("Template '{name}' is {size} bytes, exceeding the {limit} byte ceiling")]
    TemplateTooLarge {
        /// Document name
        name: String,
        /// Serialized size
        size: usize,
        /// Configured ceiling
        limit: usize,
    },

    /// A function failed to build.
    #[error("Build failed for function '{function_name}' ({function_id}): {reason}")]
    BuildFailed {
        /// Function identifier
        function_id: String,
        /// Function display name
        function_name: String,
        /// Compiler or orchestration failure
        reason: String,
    },

    /// A function build exceeded its wall-clock limit.
    #[error("Build for function '{function_id}' timed out after {seconds}s")]
    BuildTimeout {
        /// Function identifier
        function_id: String,
        /// Configured limit in seconds
        seconds: u64,
    },

    /// The compiler produced no output for a function.
    #[error("Compiler produced an empty bundle for function '{function_id}'")]
    EmptyBundle {
        /// Function identifier
        function_id: String,
    },

    /// One or more builds of a batch failed.
    #[error("{} function build(s) failed:\n{}", failures.len(), format_lines(failures))]
    BatchBuildFailed {
        /// One message per failed function
        failures: Vec<String>,
    },

    /// The compiler executable could not be located.
    #[error("Compiler executable '{name}' not found")]
    CompilerNotFound {
        /// Executable name
        name: String,
    },

    /// Archive or deployment configuration construction failed.
    #[error("Failed to package function '{function_name}' with {strategy} strategy: {reason}")]
    PackagingFailed {
        /// Function display name
        function_name: String,
        /// Packaging strategy tag
        strategy: String,
        /// Underlying failure
        reason: String,
    },

    /// A synthesis phase failed; the cause is attached as the error source.
    #[error("Synthesis failed during {phase} phase")]
    PhaseFailed {
        /// Phase name
        phase: String,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| format!("  - {}", p.display())).collect::<Vec<_>>().join("\n")
}

fn format_lines(lines: &[String]) -> String {
    lines.iter().map(|l| format!("  - {l}")).collect::<Vec<_>>().join("\n")
}

/// Error wrapper that adds a suggestion and details for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// Rendered error chain
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Walks the error chain looking for the first [`ArmforgeError`] that has a
/// known remedy. The full chain is always kept in the message.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = format!("{error:#}");

    for cause in error.chain() {
        let Some(err) = cause.downcast_ref::<ArmforgeError>() else {
            continue;
        };
        let ctx = ErrorContext::new(message.clone());
        let ctx = match err {
            ArmforgeError::HandlerNotFound { .. } => ctx
                .with_suggestion("Check the handler paths in your app document; they are relative to the document's directory"),
            ArmforgeError::CircularDependency { .. } => ctx
                .with_details("Resources in a stack must form a directed acyclic graph")
                .with_suggestion("Remove one of the dependsOn or resourceId() references that close the cycle"),
            ArmforgeError::UnresolvedReference { .. } => ctx
                .with_suggestion("dependsOn entries must name a resource declared in the same stack"),
            ArmforgeError::UnsafeName { .. } => ctx
                .with_suggestion("Stack and function names may not contain '/', '\\' or control characters, or start with '.'"),
            ArmforgeError::ScopeViolation { .. } => ctx
                .with_details("A resource cannot be deployed from a stack with a narrower deployment scope")
                .with_suggestion("Move the resource into a stack with a matching scope"),
            ArmforgeError::ValidationFailed { .. } => ctx
                .with_suggestion("Fix the issues above, or re-run without --strict if only warnings were reported"),
            ArmforgeError::OversizedResource { .. } | ArmforgeError::TemplateTooLarge { .. } => ctx
                .with_suggestion("Raise --max-template-size or reduce the size of the resource definition"),
            ArmforgeError::CompilerNotFound { .. } => ctx
                .with_suggestion("Install esbuild (npm install -g esbuild) or set ARMFORGE_ESBUILD to its path"),
            ArmforgeError::BuildTimeout { .. } => ctx
                .with_details("The compiler did not finish within the configured build timeout"),
            _ => continue,
        };
        return ctx;
    }

    ErrorContext::new(message)
}
