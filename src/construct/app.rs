//! Declarative app documents
//!
//! Instead of executing application code to build the construct tree, the
//! CLI reads a YAML or JSON app document and builds the tree from it:
//!
//! ```yaml
//! name: shop
//! stacks:
//!   - name: shop-core
//!     scope: resourceGroup
//!     location: westeurope
//!     resources:
//!       - type: Microsoft.Storage/storageAccounts
//!         apiVersion: "2023-01-01"
//!         name: shopdata
//!         kind: StorageV2
//!         sku: { name: Standard_LRS }
//!     functions:
//!       - name: orders
//!         handler: src/orders/handler.ts
//!         resourceConfig: src/orders/resource.yaml
//! ```
//!
//! Relative handler and resource-config paths are resolved against the
//! directory containing the app document.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ConstructNode, GenericResource, StackProps};
use crate::core::{ArmforgeError, DeploymentScope};
use crate::functions::{BuildOptions, FunctionDescriptor, InputBinding, OutputBinding, Trigger};

/// Top-level app document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AppDocument {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub stacks: Vec<StackSpec>,
}

fn default_app_name() -> String {
    "app".to_string()
}

/// One stack of an app document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StackSpec {
    /// Construct id; defaults to `name`
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub scope: DeploymentScope,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
}

/// One resource of a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResourceSpec {
    /// Logical id; defaults to `name`
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub api_version: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sku: Option<Value>,
    #[serde(default)]
    pub tags: Option<Map<String, Value>>,
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Required deployment scope; defaults to resource group
    #[serde(default)]
    pub scope: Option<DeploymentScope>,
}

/// One function of a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionSpec {
    /// Function id; defaults to `name`
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub handler: PathBuf,
    #[serde(default)]
    pub resource_config: Option<PathBuf>,
    #[serde(default)]
    pub options: BuildOptions,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    #[serde(default)]
    pub outputs: Vec<OutputBinding>,
}

impl AppDocument {
    /// Parse an app document from text. JSON is detected by a leading `{`,
    /// anything else is read as YAML.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim_start().starts_with('{') {
            serde_json::from_str(content).context("Failed to parse app document as JSON")
        } else {
            serde_yaml::from_str(content).context("Failed to parse app document as YAML")
        }
    }

    /// Build the construct tree, resolving relative paths against `base_dir`.
    pub fn into_tree(self, base_dir: &Path) -> ConstructNode {
        let mut root = ConstructNode::root(self.name);

        for stack in self.stacks {
            let stack_id = stack.id.clone().unwrap_or_else(|| stack.name.clone());
            let mut node = ConstructNode::stack(
                stack_id,
                StackProps {
                    name: stack.name,
                    scope: stack.scope,
                    location: stack.location,
                    parameters: stack.parameters,
                    variables: stack.variables,
                    outputs: stack.outputs,
                },
            );

            for spec in stack.resources {
                node.add_child(ConstructNode::resource(Arc::new(spec.into_resource())));
            }
            for spec in stack.functions {
                node.add_child(ConstructNode::function(spec.into_descriptor(base_dir)));
            }

            root.add_child(node);
        }

        root
    }
}

impl ResourceSpec {
    fn into_resource(self) -> GenericResource {
        let logical_id = self.id.unwrap_or_else(|| self.name.clone());
        GenericResource {
            logical_id,
            resource_type: self.resource_type,
            api_version: self.api_version,
            name: self.name,
            location: self.location,
            kind: self.kind,
            sku: self.sku,
            tags: self.tags,
            properties: self.properties.unwrap_or_else(|| Value::Object(Map::new())),
            depends_on: self.depends_on,
            scope: self.scope.unwrap_or_default(),
        }
    }
}

impl FunctionSpec {
    fn into_descriptor(self, base_dir: &Path) -> FunctionDescriptor {
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base_dir.join(p) };
        FunctionDescriptor {
            id: self.id.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            handler: resolve(self.handler),
            resource_config: self.resource_config.map(resolve),
            options: self.options,
            trigger: self.trigger,
            inputs: self.inputs,
            outputs: self.outputs,
        }
    }
}

/// Load an app document from disk and build its construct tree.
pub async fn load_app(path: &Path) -> Result<ConstructNode> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read app document: {}", path.display()))?;

    let document = AppDocument::parse(&content).map_err(|e| {
        anyhow::Error::new(ArmforgeError::InvalidConfig {
            path: path.display().to_string(),
            reason: format!("{e:#}"),
        })
    })?;

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    Ok(document.into_tree(&base_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::ConstructKind;

    const APP_YAML: &str = r#"
name: shop
stacks:
  - name: shop-core
    location: westeurope
    resources:
      - type: Microsoft.Storage/storageAccounts
        apiVersion: "2023-01-01"
        name: shopdata
      - id: site
        type: Microsoft.Web/sites
        apiVersion: "2023-01-01"
        name: shop-site
        dependsOn: [shopdata]
    functions:
      - name: orders
        handler: src/orders.ts
  - name: shop-governance
    scope: subscription
"#;

    #[test]
    fn test_parse_yaml_into_tree() {
        let doc = AppDocument::parse(APP_YAML).unwrap();
        let tree = doc.into_tree(Path::new("/project"));

        assert_eq!(tree.id, "shop");
        assert_eq!(tree.children.len(), 2);

        let core = &tree.children[0];
        assert!(core.is_stack());
        assert_eq!(core.children.len(), 3);
        assert_eq!(core.children[1].id, "site");

        match &core.children[2].kind {
            ConstructKind::Function(f) => {
                assert_eq!(f.id, "orders");
                assert_eq!(f.handler, PathBuf::from("/project/src/orders.ts"));
            }
            other => panic!("expected function, got {other:?}"),
        }

        match &tree.children[1].kind {
            ConstructKind::Stack(props) => assert_eq!(props.scope, DeploymentScope::Subscription),
            other => panic!("expected stack, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_json() {
        let doc = AppDocument::parse(r#"{"name": "x", "stacks": [{"name": "s"}]}"#).unwrap();
        assert_eq!(doc.stacks.len(), 1);
        assert_eq!(doc.stacks[0].scope, DeploymentScope::ResourceGroup);
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        assert!(AppDocument::parse("name: x\nstackz: []\n").is_err());
    }

    #[tokio::test]
    async fn test_load_app_reports_invalid_config_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("app.yaml");
        std::fs::write(&path, "stacks: 12").unwrap();

        let err = load_app(&path).await.unwrap_err();
        let typed = err.downcast_ref::<ArmforgeError>().unwrap();
        assert!(matches!(typed, ArmforgeError::InvalidConfig { .. }));
        assert!(err.to_string().contains("app.yaml"));
    }
}
