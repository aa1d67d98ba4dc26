//! Construct tree read API
//!
//! The synthesis pipeline consumes a tree of constructs. Stacks group
//! resources into one deployment unit each; resources lower themselves to
//! [`TransformedResource`]s; function constructs describe handlers that the
//! function builder compiles and packages.
//!
//! The tree is built by application code (or loaded from a declarative app
//! document with [`load_app`]) and is never mutated by the pipeline.
//!
//! ```text
//! app (Root)
//! ├── core (Stack, resourceGroup)
//! │   ├── storage (Resource)
//! │   └── api (Function)
//! └── governance (Stack, subscription)
//!     └── policy (Resource, requires subscription)
//! ```

mod app;
mod generic;

pub use app::{AppDocument, FunctionSpec, ResourceSpec, StackSpec, load_app};
pub use generic::GenericResource;

use anyhow::Result;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::core::DeploymentScope;
use crate::functions::FunctionDescriptor;
use crate::synth::document::TransformedResource;

/// A resource that can lower itself to the template representation.
pub trait ResourceNode: Send + Sync + fmt::Debug {
    /// Construct id of the resource within its parent.
    fn logical_id(&self) -> &str;

    /// Narrowest scope this resource can be deployed from.
    fn required_scope(&self) -> DeploymentScope {
        DeploymentScope::ResourceGroup
    }

    /// Lower the resource to its flat template form.
    fn to_arm(&self) -> Result<TransformedResource>;

    /// Explicit cross-references to sibling resources (names or logical ids).
    ///
    /// References embedded in properties are discovered separately by the
    /// dependency resolver.
    fn references(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Properties of a stack construct.
#[derive(Debug, Clone, Default)]
pub struct StackProps {
    /// Deployment name; also the template file name
    pub name: String,
    pub scope: DeploymentScope,
    /// Default location applied to resources that declare none
    pub location: Option<String>,
    pub parameters: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub outputs: Map<String, Value>,
}

impl StackProps {
    pub fn new(name: impl Into<String>, scope: DeploymentScope) -> Self {
        Self {
            name: name.into(),
            scope,
            ..Self::default()
        }
    }
}

/// What a construct node represents.
#[derive(Debug, Clone)]
pub enum ConstructKind {
    Root,
    /// Organizational node with no deployment meaning of its own
    Group,
    Stack(StackProps),
    Resource(Arc<dyn ResourceNode>),
    Function(FunctionDescriptor),
}

/// A node of the construct tree.
#[derive(Debug, Clone)]
pub struct ConstructNode {
    pub id: String,
    pub kind: ConstructKind,
    pub children: Vec<ConstructNode>,
}

impl ConstructNode {
    pub fn root(id: impl Into<String>) -> Self {
        Self::with_kind(id, ConstructKind::Root)
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::with_kind(id, ConstructKind::Group)
    }

    pub fn stack(id: impl Into<String>, props: StackProps) -> Self {
        Self::with_kind(id, ConstructKind::Stack(props))
    }

    /// Resource construct; its id is the resource's logical id.
    pub fn resource(node: Arc<dyn ResourceNode>) -> Self {
        Self::with_kind(node.logical_id().to_string(), ConstructKind::Resource(node))
    }

    /// Function construct; its id is the function id.
    pub fn function(descriptor: FunctionDescriptor) -> Self {
        Self::with_kind(descriptor.id.clone(), ConstructKind::Function(descriptor))
    }

    fn with_kind(id: impl Into<String>, kind: ConstructKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Append a child, builder style.
    #[must_use]
    pub fn with_child(mut self, child: ConstructNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: ConstructNode) {
        self.children.push(child);
    }

    pub fn is_stack(&self) -> bool {
        matches!(self.kind, ConstructKind::Stack(_))
    }
}
