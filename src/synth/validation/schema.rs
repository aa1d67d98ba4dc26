//! Serialized-shape checks for generated templates.

use regex::Regex;
use std::sync::LazyLock;

use super::{ValidationInput, ValidationIssue, Validator, is_expression};
use crate::synth::resolver::SiblingIndex;

static API_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(-(preview|beta|alpha|privatepreview))?$").expect("valid regex")
});
static RESOURCE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9.]*/[A-Za-z][A-Za-z0-9]*(/[A-Za-z][A-Za-z0-9]*)*$")
        .expect("valid regex")
});
static CONTENT_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+){3}$").expect("valid regex"));

const NAME: &str = "schema";

/// Checks the template envelope and every resource's required fields.
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationIssue> {
        let template = input.template;
        let mut issues = Vec::new();

        if !template.schema.starts_with("https://schema.management.azure.com/schemas/") {
            issues.push(
                ValidationIssue::error(NAME, "$schema", format!("Unrecognized schema URL '{}'", template.schema))
                    .with_suggestion("Use the deployment template schema matching the stack scope"),
            );
        }

        if !CONTENT_VERSION_RE.is_match(&template.content_version) {
            issues.push(
                ValidationIssue::error(
                    NAME,
                    "contentVersion",
                    format!("contentVersion '{}' is not of the form 'n.n.n.n'", template.content_version),
                )
                .with_suggestion("Use a version like 1.0.0.0"),
            );
        }

        let siblings = SiblingIndex::new(&template.resources);

        for (index, resource) in template.resources.iter().enumerate() {
            let path = |field: &str| format!("resources[{index}].{field}");

            if resource.resource_type.trim().is_empty() {
                issues.push(ValidationIssue::error(NAME, path("type"), "Resource type is required"));
            } else if !RESOURCE_TYPE_RE.is_match(&resource.resource_type) {
                issues.push(
                    ValidationIssue::error(
                        NAME,
                        path("type"),
                        format!("Resource type '{}' is malformed", resource.resource_type),
                    )
                    .with_suggestion("Expected 'Namespace.Provider/resourceType'"),
                );
            }

            if !API_VERSION_RE.is_match(&resource.api_version) {
                issues.push(
                    ValidationIssue::error(
                        NAME,
                        path("apiVersion"),
                        format!("apiVersion '{}' is not a valid date version", resource.api_version),
                    )
                    .with_suggestion("Expected YYYY-MM-DD with an optional -preview suffix"),
                );
            }

            if resource.name.is_empty() {
                issues.push(ValidationIssue::error(NAME, path("name"), "Resource name is required"));
            }

            if !resource.properties.is_object() {
                issues.push(ValidationIssue::error(NAME, path("properties"), "properties must be an object"));
            }

            for (dep_index, entry) in resource.depends_on.iter().enumerate() {
                if !is_expression(entry) && siblings.target_of(entry).is_none() {
                    issues.push(
                        ValidationIssue::error(
                            NAME,
                            format!("resources[{index}].dependsOn[{dep_index}]"),
                            format!("dependsOn entry '{entry}' does not match any resource in the template"),
                        )
                        .with_suggestion("Reference a resource declared in the same stack"),
                    );
                }
            }
        }

        issues
    }
}
