//! Declarative resource construct.

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};

use super::ResourceNode;
use crate::core::DeploymentScope;
use crate::synth::document::TransformedResource;

/// A resource described entirely by data: type, API version, name and
/// properties. Explicit `depends_on` entries are reported as cross-references
/// so the resolver can check them against the stack.
#[derive(Debug, Clone)]
pub struct GenericResource {
    pub logical_id: String,
    pub resource_type: String,
    pub api_version: String,
    pub name: String,
    pub location: Option<String>,
    pub kind: Option<String>,
    pub sku: Option<Value>,
    pub tags: Option<Map<String, Value>>,
    pub properties: Value,
    pub depends_on: Vec<String>,
    pub scope: DeploymentScope,
}

impl GenericResource {
    /// Resource whose logical id equals its name.
    pub fn new(
        resource_type: impl Into<String>,
        api_version: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            logical_id: name.clone(),
            resource_type: resource_type.into(),
            api_version: api_version.into(),
            name,
            location: None,
            kind: None,
            sku: None,
            tags: None,
            properties: Value::Object(Map::new()),
            depends_on: Vec::new(),
            scope: DeploymentScope::ResourceGroup,
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: DeploymentScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.depends_on.push(target.into());
        self
    }

    #[must_use]
    pub fn with_logical_id(mut self, id: impl Into<String>) -> Self {
        self.logical_id = id.into();
        self
    }
}

impl ResourceNode for GenericResource {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }

    fn required_scope(&self) -> DeploymentScope {
        self.scope
    }

    fn to_arm(&self) -> Result<TransformedResource> {
        for (field, value) in
            [("type", &self.resource_type), ("apiVersion", &self.api_version), ("name", &self.name)]
        {
            if value.trim().is_empty() {
                return Err(anyhow!("required field '{field}' is empty"));
            }
        }
        if !self.properties.is_object() {
            return Err(anyhow!("'properties' must be an object"));
        }

        Ok(TransformedResource {
            resource_type: self.resource_type.clone(),
            api_version: self.api_version.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            kind: self.kind.clone(),
            sku: self.sku.clone(),
            tags: self.tags.clone(),
            properties: self.properties.clone(),
            depends_on: Vec::new(),
        })
    }

    fn references(&self) -> Vec<String> {
        self.depends_on.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_arm_copies_fields() {
        let resource = GenericResource::new("Microsoft.Web/sites", "2023-01-01", "web")
            .with_location("westeurope")
            .with_properties(json!({"httpsOnly": true}))
            .depends_on("plan");

        let arm = resource.to_arm().unwrap();
        assert_eq!(arm.resource_type, "Microsoft.Web/sites");
        assert_eq!(arm.location.as_deref(), Some("westeurope"));
        assert_eq!(arm.properties["httpsOnly"], true);
        // explicit references are wired later by the resolver
        assert!(arm.depends_on.is_empty());
        assert_eq!(resource.references(), vec!["plan".to_string()]);
    }

    #[test]
    fn test_to_arm_rejects_missing_type() {
        let resource = GenericResource::new("", "2023-01-01", "web");
        let err = resource.to_arm().unwrap_err();
        assert!(err.to_string().contains("required field 'type'"));
    }

    #[test]
    fn test_to_arm_rejects_non_object_properties() {
        let resource =
            GenericResource::new("A/b", "2023-01-01", "web").with_properties(json!(["not", "object"]));
        assert!(resource.to_arm().is_err());
    }
}
