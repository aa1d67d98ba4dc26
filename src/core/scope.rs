//! Deployment scopes
//!
//! Every stack deploys at exactly one scope, and every resource requires a
//! minimum scope it can be deployed from. Scopes are totally ordered from the
//! narrowest (resource group) to the broadest (tenant).
//!
//! # Examples
//!
//! ```rust
//! use armforge::core::DeploymentScope;
//!
//! let scope: DeploymentScope = "subscription".parse().unwrap();
//! assert!(scope.is_broader_than(DeploymentScope::ResourceGroup));
//! assert_eq!(scope.to_string(), "subscription");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment scope of a stack or a resource.
///
/// The derived ordering runs from narrowest to broadest, so
/// `ResourceGroup < Subscription < ManagementGroup < Tenant`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentScope {
    /// Deployed into a resource group (the common case)
    #[default]
    ResourceGroup,
    /// Deployed at subscription level (resource groups, policies, role assignments)
    Subscription,
    /// Deployed at management group level
    ManagementGroup,
    /// Deployed at tenant level
    Tenant,
}

impl DeploymentScope {
    /// Returns true if `self` is strictly broader than `other`.
    #[must_use]
    pub fn is_broader_than(self, other: Self) -> bool {
        self > other
    }

    /// Template schema URL for documents deployed at this scope.
    #[must_use]
    pub const fn schema_url(self) -> &'static str {
        match self {
            Self::ResourceGroup => {
                "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#"
            }
            Self::Subscription => {
                "https://schema.management.azure.com/schemas/2018-05-01/subscriptionDeploymentTemplate.json#"
            }
            Self::ManagementGroup => {
                "https://schema.management.azure.com/schemas/2019-08-01/managementGroupDeploymentTemplate.json#"
            }
            Self::Tenant => {
                "https://schema.management.azure.com/schemas/2019-08-01/tenantDeploymentTemplate.json#"
            }
        }
    }

    /// All scopes, narrowest first.
    pub const ALL: [Self; 4] =
        [Self::ResourceGroup, Self::Subscription, Self::ManagementGroup, Self::Tenant];
}

impl fmt::Display for DeploymentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResourceGroup => "resourceGroup",
            Self::Subscription => "subscription",
            Self::ManagementGroup => "managementGroup",
            Self::Tenant => "tenant",
        };
        f.write_str(name)
    }
}

impl FromStr for DeploymentScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "resourcegroup" => Ok(Self::ResourceGroup),
            "subscription" => Ok(Self::Subscription),
            "managementgroup" => Ok(Self::ManagementGroup),
            "tenant" => Ok(Self::Tenant),
            other => Err(format!("unknown deployment scope '{other}'")),
        }
    }
}
