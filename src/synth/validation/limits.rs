//! Platform-imposed count and size limits.

use super::{ValidationInput, ValidationIssue, ValidationLevel, Validator, is_expression};
use crate::constants::{
    ARM_MAX_OUTPUTS, ARM_MAX_PARAMETERS, ARM_MAX_RESOURCE_NAME_LENGTH, ARM_MAX_RESOURCES,
    ARM_MAX_VARIABLES, ARM_TEMPLATE_SIZE_LIMIT,
};
use crate::synth::document::template_size;

const NAME: &str = "limits";

/// Share of the template size limit above which a warning is raised.
const SIZE_WARNING_RATIO: f64 = 0.8;

pub struct LimitsValidator;

impl LimitsValidator {
    fn count_issue(section: &str, count: usize, limit: usize) -> Option<ValidationIssue> {
        (count > limit).then(|| {
            ValidationIssue::error(
                NAME,
                section,
                format!("Template declares {count} {section}, the limit is {limit}"),
            )
            .with_suggestion("Split the stack into smaller stacks or enable linked templates")
        })
    }
}

impl Validator for LimitsValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Standard
    }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationIssue> {
        let template = input.template;
        let mut issues: Vec<ValidationIssue> = [
            ("resources", template.resources.len(), ARM_MAX_RESOURCES),
            ("parameters", template.parameters.len(), ARM_MAX_PARAMETERS),
            ("variables", template.variables.len(), ARM_MAX_VARIABLES),
            ("outputs", template.outputs.len(), ARM_MAX_OUTPUTS),
        ]
        .into_iter()
        .filter_map(|(section, count, limit)| Self::count_issue(section, count, limit))
        .collect();

        let size = template_size(template);
        if size > ARM_TEMPLATE_SIZE_LIMIT {
            issues.push(
                ValidationIssue::error(
                    NAME,
                    "$",
                    format!("Template is {size} bytes, the limit is {ARM_TEMPLATE_SIZE_LIMIT} bytes"),
                )
                .with_suggestion("Enable linked templates or lower the maximum template size"),
            );
        } else if size as f64 > ARM_TEMPLATE_SIZE_LIMIT as f64 * SIZE_WARNING_RATIO {
            issues.push(ValidationIssue::warning(
                NAME,
                "$",
                format!("Template is {size} bytes, close to the {ARM_TEMPLATE_SIZE_LIMIT} byte limit"),
            ));
        }

        for (index, resource) in template.resources.iter().enumerate() {
            if !is_expression(&resource.name) && resource.name.len() > ARM_MAX_RESOURCE_NAME_LENGTH {
                issues.push(ValidationIssue::error(
                    NAME,
                    format!("resources[{index}].name"),
                    format!(
                        "Name is {} characters long, the limit is {ARM_MAX_RESOURCE_NAME_LENGTH}",
                        resource.name.len()
                    ),
                ));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeploymentScope;
    use crate::synth::document::{ArmTemplate, TransformedResource};
    use crate::synth::validation::Severity;
    use serde_json::{Value, json};

    fn run(template: &ArmTemplate) -> Vec<ValidationIssue> {
        LimitsValidator.validate(&ValidationInput::new(&template.resources, template, "core"))
    }

    #[test]
    fn test_small_template_passes() {
        let mut template = ArmTemplate::new(DeploymentScope::ResourceGroup);
        template.resources.push(TransformedResource::new("Microsoft.Web/sites", "2022-09-01", "app"));
        assert!(run(&template).is_empty());
    }

    #[test]
    fn test_count_limits() {
        let mut template = ArmTemplate::new(DeploymentScope::ResourceGroup);
        for i in 0..=ARM_MAX_OUTPUTS {
            template.outputs.insert(format!("out{i}"), json!({"type": "string", "value": "x"}));
        }
        for i in 0..=ARM_MAX_RESOURCES {
            template
                .resources
                .push(TransformedResource::new("Microsoft.Web/sites", "2022-09-01", format!("app{i}")));
        }

        let paths: Vec<String> = run(&template).into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["resources", "outputs"]);
    }

    #[test]
    fn test_name_length_limit_ignores_expressions() {
        let long = "n".repeat(ARM_MAX_RESOURCE_NAME_LENGTH);
        let mut template = ArmTemplate::new(DeploymentScope::ResourceGroup);
        template.resources.push(TransformedResource::new(
            "Microsoft.Web/sites",
            "2022-09-01",
            format!("[concat('{long}', parameters('suffix'))]"),
        ));
        template
            .resources
            .push(TransformedResource::new("Microsoft.Web/sites", "2022-09-01", format!("{long}x")));

        let paths: Vec<String> = run(&template).into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["resources[1].name"]);
    }

    #[test]
    fn test_size_warning_and_error() {
        let mut template = ArmTemplate::new(DeploymentScope::ResourceGroup);
        let blob = "x".repeat((ARM_TEMPLATE_SIZE_LIMIT as f64 * 0.9) as usize);
        template.resources.push(
            TransformedResource::new("Microsoft.Web/sites", "2022-09-01", "app")
                .with_properties(json!({ "blob": blob })),
        );

        let issues = run(&template);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);

        template.resources[0].properties =
            json!({ "blob": Value::String("x".repeat(ARM_TEMPLATE_SIZE_LIMIT)) });
        let issues = run(&template);
        assert_eq!(issues[0].severity, Severity::Error);
    }
}
