//! Resource-specific best-practice rules.

use serde_json::Value;

use super::{ValidationInput, ValidationIssue, ValidationLevel, Validator};
use crate::core::DeploymentScope;

const NAME: &str = "resource-rules";

/// Types that are deployed globally and never take a location.
const GLOBAL_TYPES: &[&str] = &[
    "Microsoft.Resources/deployments",
    "Microsoft.Authorization/roleAssignments",
    "Microsoft.Authorization/roleDefinitions",
    "Microsoft.Authorization/policyAssignments",
    "Microsoft.Authorization/locks",
    "Microsoft.Network/dnsZones",
    "Microsoft.Network/privateDnsZones",
    "Microsoft.Network/frontDoors",
    "Microsoft.Cdn/profiles",
    "Microsoft.Insights/actionGroups",
];

pub struct ResourceRulesValidator;

pub(crate) fn is_global(resource_type: &str) -> bool {
    GLOBAL_TYPES.iter().any(|t| t.eq_ignore_ascii_case(resource_type))
        // child resources inherit their parent's location
        || resource_type.matches('/').count() > 1
}

impl Validator for ResourceRulesValidator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Full
    }

    fn validate(&self, input: &ValidationInput<'_>) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for (index, resource) in input.resources.iter().enumerate() {
            let resource_type = resource.resource_type.as_str();

            if input.scope == DeploymentScope::ResourceGroup
                && resource.location.is_none()
                && !is_global(resource_type)
            {
                issues.push(
                    ValidationIssue::warning(
                        NAME,
                        format!("resources[{index}].location"),
                        format!("Resource '{}' has no location", resource.name),
                    )
                    .with_suggestion("Set a location on the resource or a default location on the stack"),
                );
            }

            if resource_type.eq_ignore_ascii_case("Microsoft.Web/sites")
                && resource.kind.as_deref().is_some_and(|k| k.contains("functionapp"))
                && resource.properties.get("siteConfig").is_none()
            {
                issues.push(
                    ValidationIssue::warning(
                        NAME,
                        format!("resources[{index}].properties.siteConfig"),
                        format!("Function app '{}' does not declare siteConfig", resource.name),
                    )
                    .with_suggestion("Declare siteConfig with the runtime app settings"),
                );
            }

            if resource_type.eq_ignore_ascii_case("Microsoft.Storage/storageAccounts")
                && resource.properties.get("supportsHttpsTrafficOnly") == Some(&Value::Bool(false))
            {
                issues.push(
                    ValidationIssue::warning(
                        NAME,
                        format!("resources[{index}].properties.supportsHttpsTrafficOnly"),
                        format!("Storage account '{}' allows plain HTTP traffic", resource.name),
                    )
                    .with_suggestion("Set supportsHttpsTrafficOnly to true"),
                );
            }
        }

        issues
    }
}
