//! Resource naming conventions.

use std::collections::HashMap;

use super::{ValidationInput, ValidationIssue, ValidationLevel, Validator, is_expression};
use crate::constants::RECOMMENDED_NAME_LENGTH;

const NAME: &str = "naming";
const FORBIDDEN_CHARS: &[char] = &['<', '>', '%', '&', '\\', '?'];

/// Character, length and uniqueness rules for resource names.
///
/// Child resources use `parent/child` names, so `/` is only rejected for
/// top-level types (types with a single segment after the namespace).
pub struct NamingValidator;

impl Validator for NamingValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Standard
    }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for (index, resource) in input.template.resources.iter().enumerate() {
            let path = format!("resources[{index}].name");
            let name = resource.name.as_str();
            if name.is_empty() {
                // reported by the schema validator
                continue;
            }

            if let Some(first) = seen.insert(name, index) {
                issues.push(
                    ValidationIssue::error(
                        NAME,
                        path.clone(),
                        format!("Duplicate resource name '{name}' (first declared at resources[{first}])"),
                    )
                    .with_suggestion("Resource names must be unique within a stack"),
                );
            }

            // evaluated at deployment time
            if is_expression(name) {
                continue;
            }

            if name.trim() != name {
                issues.push(
                    ValidationIssue::error(NAME, path.clone(), format!("Name '{name}' has leading or trailing whitespace"))
                        .with_suggestion("Trim the name"),
                );
            }

            let is_child_type = resource.resource_type.matches('/').count() > 1;
            let bad_char = name.chars().find(|c| {
                c.is_control() || FORBIDDEN_CHARS.contains(c) || (*c == '/' && !is_child_type)
            });
            if let Some(c) = bad_char {
                issues.push(
                    ValidationIssue::error(
                        NAME,
                        path.clone(),
                        format!("Name '{name}' contains forbidden character {c:?}"),
                    )
                    .with_suggestion("Use letters, digits, hyphens, underscores and periods"),
                );
            }

            if resource.resource_type.eq_ignore_ascii_case("Microsoft.Storage/storageAccounts") {
                let valid = (3..=24).contains(&name.len())
                    && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
                if !valid {
                    issues.push(
                        ValidationIssue::error(
                            NAME,
                            path.clone(),
                            format!("Storage account name '{name}' is invalid"),
                        )
                        .with_suggestion("Use 3-24 lowercase letters and digits"),
                    );
                }
            } else if name.len() > RECOMMENDED_NAME_LENGTH {
                issues.push(
                    ValidationIssue::warning(
                        NAME,
                        path,
                        format!("Name '{name}' is {} characters long", name.len()),
                    )
                    .with_suggestion(format!("Keep names at or under {RECOMMENDED_NAME_LENGTH} characters")),
                );
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

    fn run(resources: Vec<TransformedResource>) -> Vec<ValidationIssue> {
        let mut template = ArmTemplate::new(DeploymentScope::ResourceGroup);
        template.resources = resources;
        NamingValidator.validate(&ValidationInput::new(&template.resources, &template, "core"))
    }

    #[test]
    fn test_storage_account_name_rules() {
        let issues = run(vec![
            TransformedResource::new("Microsoft.Storage/storageAccounts", "2023-01-01", "goodname01"),
            TransformedResource::new("Microsoft.Storage/storageAccounts", "2023-01-01", "Bad-Name"),
        ]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "resources[1].name");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_duplicate_and_forbidden_characters() {
        let issues = run(vec![
            TransformedResource::new("Microsoft.Web/sites", "2022-09-01", "app"),
            TransformedResource::new("Microsoft.Web/sites", "2022-09-01", "app"),
            TransformedResource::new("Microsoft.Web/sites", "2022-09-01", "a/b"),
            TransformedResource::new("Microsoft.Web/sites/config", "2022-09-01", "app/web"),
        ]);
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(issues.len(), 2, "{messages:?}");
        assert!(messages[0].starts_with("Duplicate resource name 'app'"));
        assert!(messages[1].contains("forbidden character '/'"));
    }

    #[test]
    fn test_expression_names_skip_literal_rules() {
        let issues = run(vec![
            TransformedResource::new(
                "Microsoft.Storage/storageAccounts",
                "2023-01-01",
                "[format('st{0}', uniqueString(resourceGroup().id))]",
            ),
            TransformedResource::new(
                "Microsoft.Web/sites",
                "2022-09-01",
                format!("[concat('{}', parameters('suffix'))]", "x".repeat(RECOMMENDED_NAME_LENGTH)),
            ),
        ]);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn test_escaped_bracket_is_a_literal_name() {
        let issues = run(vec![TransformedResource::new(
            "Microsoft.Storage/storageAccounts",
            "2023-01-01",
            "[[literal]",
        )]);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Storage account name"));
    }

    #[test]
    fn test_long_name_is_a_warning() {
        let issues = run(vec![TransformedResource::new(
            "Microsoft.Web/sites",
            "2022-09-01",
            "x".repeat(RECOMMENDED_NAME_LENGTH + 1),
        )]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }
}
