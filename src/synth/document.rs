//! Target document model: transformed resources, templates and linked sets.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::TEMPLATE_CONTENT_VERSION;
use crate::core::DeploymentScope;

/// A resource lowered to its flat template representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedResource {
    /// Fully qualified resource type, e.g. `Microsoft.Storage/storageAccounts`
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource provider API version
    pub api_version: String,
    /// Resource name, unique within its stack
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
    /// Resource-specific properties
    #[serde(default = "empty_object")]
    pub properties: Value,
    /// Sibling resources that must deploy first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl TransformedResource {
    /// Create a resource with empty properties and no dependencies.
    pub fn new(
        resource_type: impl Into<String>,
        api_version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            api_version: api_version.into(),
            name: name.into(),
            location: None,
            kind: None,
            sku: None,
            tags: None,
            properties: empty_object(),
            depends_on: Vec::new(),
        }
    }

    /// Builder-style setter for `properties`.
    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Builder-style setter for `location`.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder-style append to `dependsOn`.
    #[must_use]
    pub fn depending_on(mut self, target: impl Into<String>) -> Self {
        self.depends_on.push(target.into());
        self
    }
}

/// A deployment template document. One is produced per stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmTemplate {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub content_version: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub variables: Map<String, Value>,
    /// Resources in dependency order
    pub resources: Vec<TransformedResource>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub outputs: Map<String, Value>,
}

impl ArmTemplate {
    /// Empty template for the given deployment scope.
    pub fn new(scope: DeploymentScope) -> Self {
        Self {
            schema: scope.schema_url().to_string(),
            content_version: TEMPLATE_CONTENT_VERSION.to_string(),
            parameters: Map::new(),
            variables: Map::new(),
            resources: Vec::new(),
            outputs: Map::new(),
        }
    }

    /// Empty template sharing this template's schema, parameters and variables.
    pub fn empty_like(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            content_version: self.content_version.clone(),
            parameters: self.parameters.clone(),
            variables: self.variables.clone(),
            resources: Vec::new(),
            outputs: Map::new(),
        }
    }

    /// Serialize the template, pretty (2-space indent) or compact.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<Vec<u8>> {
        if pretty { serde_json::to_vec_pretty(self) } else { serde_json::to_vec(self) }
    }
}

/// Compact serialized size of a template in bytes.
pub fn template_size(template: &ArmTemplate) -> usize {
    document_size(template, false)
}

/// Serialized size of a template in bytes, pretty or compact.
pub fn document_size(template: &ArmTemplate, pretty: bool) -> usize {
    template.to_json(pretty).map(|v| v.len()).unwrap_or(usize::MAX)
}

/// A root template plus the linked child templates it deploys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedTemplateSet {
    pub root: ArmTemplate,
    pub linked: BTreeMap<String, ArmTemplate>,
    /// Linked template name -> linked templates it depends on
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
    /// Every linked template name exactly once, dependencies first
    pub deployment_order: Vec<String>,
}

impl LinkedTemplateSet {
    /// A set holding a single, unsplit template.
    pub fn single(root: ArmTemplate) -> Self {
        Self {
            root,
            linked: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            deployment_order: Vec::new(),
        }
    }

    pub fn is_split(&self) -> bool {
        !self.linked.is_empty()
    }

    /// Number of deployable resources across root and linked templates,
    /// not counting the deployments that link them.
    pub fn resource_count(&self) -> usize {
        if self.is_split() {
            self.linked.values().map(|t| t.resources.len()).sum()
        } else {
            self.root.resources.len()
        }
    }
}
