//! Construct tree traversal and per-stack resource collection.
//!
//! Traversal is depth-first pre-order so a stack is always visited before
//! any of its descendants. Collection groups every resource and function by
//! its nearest enclosing stack, and [`validate_resources`] rejects resources
//! whose required scope is broader than the scope of their stack.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::construct::{ConstructKind, ConstructNode, ResourceNode};
use crate::core::{ArmforgeError, DeploymentScope};
use crate::functions::FunctionDescriptor;
use crate::utils::is_safe_file_name;

/// A construct visited during traversal.
#[derive(Debug, Clone)]
pub struct VisitedConstruct<'a> {
    /// Slash-separated path from the root (the root itself has an empty path)
    pub path: String,
    pub depth: usize,
    /// Path of the nearest enclosing stack, excluding the node itself
    pub stack: Option<String>,
    pub node: &'a ConstructNode,
}

/// Result of [`traverse`].
#[derive(Debug, Default)]
pub struct Traversal<'a> {
    /// Every construct in pre-order
    pub constructs: Vec<VisitedConstruct<'a>>,
    /// Just the stacks, in pre-order
    pub stacks: Vec<VisitedConstruct<'a>>,
}

/// Walk the tree depth-first, pre-order.
pub fn traverse(root: &ConstructNode) -> Traversal<'_> {
    let mut traversal = Traversal::default();
    let mut pending: Vec<(&ConstructNode, String, usize, Option<String>)> =
        vec![(root, String::new(), 0, None)];

    while let Some((node, path, depth, stack)) = pending.pop() {
        let child_stack = if node.is_stack() { Some(path.clone()) } else { stack.clone() };

        for child in node.children.iter().rev() {
            let child_path =
                if path.is_empty() { child.id.clone() } else { format!("{path}/{}", child.id) };
            pending.push((child, child_path, depth + 1, child_stack.clone()));
        }

        let visited = VisitedConstruct {
            path,
            depth,
            stack,
            node,
        };
        if node.is_stack() {
            traversal.stacks.push(visited.clone());
        }
        traversal.constructs.push(visited);
    }

    traversal
}

/// Everything that deploys as one stack.
#[derive(Debug, Clone)]
pub struct StackInfo {
    /// Construct path of the stack
    pub id: String,
    pub name: String,
    pub scope: DeploymentScope,
    pub location: Option<String>,
    pub parameters: Map<String, Value>,
    pub variables: Map<String, Value>,
    pub outputs: Map<String, Value>,
    pub resources: Vec<Arc<dyn ResourceNode>>,
    /// Construct paths, index-aligned with `resources`
    pub resource_paths: Vec<String>,
    pub functions: Vec<FunctionDescriptor>,
}

/// Stacks keyed by construct path, kept in traversal order.
#[derive(Debug, Default)]
pub struct StackCollection {
    stacks: Vec<StackInfo>,
    index: HashMap<String, usize>,
}

impl StackCollection {
    pub fn get(&self, id: &str) -> Option<&StackInfo> {
        self.index.get(id).map(|&i| &self.stacks[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StackInfo> {
        self.stacks.iter()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut StackInfo> {
        self.index.get(id).map(|&i| &mut self.stacks[i])
    }
}

/// Group resources and functions by their nearest enclosing stack.
///
/// Constructs with no stack ancestor are collected and reported together as
/// an [`ArmforgeError::OrphanConstruct`]. Stack names and function names
/// must each be unique across the app and usable as file names, since both
/// name files in the assembly.
pub fn collect(traversal: &Traversal<'_>) -> Result<StackCollection> {
    let mut collection = StackCollection::default();
    let mut names = BTreeSet::new();

    for visited in &traversal.stacks {
        let ConstructKind::Stack(props) = &visited.node.kind else {
            continue;
        };
        if !is_safe_file_name(&props.name) {
            return Err(ArmforgeError::UnsafeName {
                kind: "Stack".to_string(),
                name: props.name.clone(),
            }
            .into());
        }
        if !names.insert(props.name.clone()) {
            return Err(ArmforgeError::DuplicateName {
                kind: "stack".to_string(),
                name: props.name.clone(),
                scope: "app".to_string(),
            }
            .into());
        }
        collection.index.insert(visited.path.clone(), collection.stacks.len());
        collection.stacks.push(StackInfo {
            id: visited.path.clone(),
            name: props.name.clone(),
            scope: props.scope,
            location: props.location.clone(),
            parameters: props.parameters.clone(),
            variables: props.variables.clone(),
            outputs: props.outputs.clone(),
            resources: Vec::new(),
            resource_paths: Vec::new(),
            functions: Vec::new(),
        });
    }

    let mut orphans = Vec::new();
    for visited in &traversal.constructs {
        let stack = visited.stack.as_deref().and_then(|id| collection.get_mut(id));
        match (&visited.node.kind, stack) {
            (ConstructKind::Resource(node), Some(stack)) => {
                stack.resources.push(Arc::clone(node));
                stack.resource_paths.push(visited.path.clone());
            }
            (ConstructKind::Function(descriptor), Some(stack)) => {
                stack.functions.push(descriptor.clone());
            }
            (ConstructKind::Resource(_) | ConstructKind::Function(_), None) => {
                orphans.push(visited.path.clone());
            }
            _ => {}
        }
    }

    if !orphans.is_empty() {
        return Err(ArmforgeError::OrphanConstruct {
            paths: orphans,
        }
        .into());
    }

    let mut function_names = BTreeSet::new();
    for descriptor in collection.stacks.iter().flat_map(|s| &s.functions) {
        if !is_safe_file_name(&descriptor.name) {
            return Err(ArmforgeError::UnsafeName {
                kind: "Function".to_string(),
                name: descriptor.name.clone(),
            }
            .into());
        }
        if !function_names.insert(descriptor.name.as_str()) {
            return Err(ArmforgeError::DuplicateName {
                kind: "function".to_string(),
                name: descriptor.name.clone(),
                scope: "app".to_string(),
            }
            .into());
        }
    }

    Ok(collection)
}

/// Check that every resource can be deployed from its stack's scope.
///
/// All violations are reported together.
pub fn validate_resources(stacks: &StackCollection) -> Result<()> {
    let mut violations = Vec::new();

    for stack in stacks.iter() {
        for (resource, path) in stack.resources.iter().zip(&stack.resource_paths) {
            let required = resource.required_scope();
            if required.is_broader_than(stack.scope) {
                violations.push(format!(
                    "{path}: requires {required} scope but stack '{}' deploys at {} scope",
                    stack.name, stack.scope
                ));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ArmforgeError::ScopeViolation {
            violations,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{GenericResource, StackProps};

    fn resource(name: &str) -> ConstructNode {
        ConstructNode::resource(Arc::new(GenericResource::new("T/r", "2020-01-01", name)))
    }

    fn sample_tree() -> ConstructNode {
        ConstructNode::root("app")
            .with_child(
                ConstructNode::stack("core", StackProps::new("core", DeploymentScope::ResourceGroup))
                    .with_child(resource("storage"))
                    .with_child(ConstructNode::group("network").with_child(resource("vnet"))),
            )
            .with_child(
                ConstructNode::stack("gov", StackProps::new("gov", DeploymentScope::Subscription))
                    .with_child(resource("policy")),
            )
    }

    #[test]
    fn test_traverse_is_preorder() {
        let tree = sample_tree();
        let traversal = traverse(&tree);

        let paths: Vec<&str> = traversal.constructs.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["", "core", "core/storage", "core/network", "core/network/vnet", "gov", "gov/policy"]
        );
        assert_eq!(traversal.stacks.len(), 2);
        assert_eq!(traversal.constructs[4].stack.as_deref(), Some("core"));
        assert_eq!(traversal.constructs[4].depth, 3);
        assert_eq!(traversal.constructs[1].stack, None);
    }

    #[test]
    fn test_collect_groups_by_nearest_stack() {
        let tree = sample_tree();
        let stacks = collect(&traverse(&tree)).unwrap();

        assert_eq!(stacks.len(), 2);
        let core = stacks.get("core").unwrap();
        assert_eq!(core.resource_paths, vec!["core/storage", "core/network/vnet"]);
        assert_eq!(stacks.get("gov").unwrap().resources.len(), 1);
    }

    #[test]
    fn test_nested_stack_owns_its_resources() {
        let tree = ConstructNode::root("app").with_child(
            ConstructNode::stack("outer", StackProps::new("outer", DeploymentScope::Subscription))
                .with_child(resource("a"))
                .with_child(
                    ConstructNode::stack("inner", StackProps::new("inner", DeploymentScope::ResourceGroup))
                        .with_child(resource("b")),
                ),
        );
        let stacks = collect(&traverse(&tree)).unwrap();
        assert_eq!(stacks.get("outer").unwrap().resource_paths, vec!["outer/a"]);
        assert_eq!(stacks.get("outer/inner").unwrap().resource_paths, vec!["outer/inner/b"]);
    }

    #[test]
    fn test_collect_reports_all_orphans() {
        let tree = ConstructNode::root("app")
            .with_child(resource("loose1"))
            .with_child(ConstructNode::group("g").with_child(resource("loose2")));
        let err = collect(&traverse(&tree)).unwrap_err();
        match err.downcast_ref::<ArmforgeError>() {
            Some(ArmforgeError::OrphanConstruct { paths }) => {
                assert_eq!(paths, &vec!["loose1".to_string(), "g/loose2".to_string()]);
            }
            other => panic!("expected orphan error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_stack_names_rejected() {
        let tree = ConstructNode::root("app")
            .with_child(ConstructNode::stack("a", StackProps::new("same", DeploymentScope::ResourceGroup)))
            .with_child(ConstructNode::stack("b", StackProps::new("same", DeploymentScope::ResourceGroup)));
        assert!(collect(&traverse(&tree)).is_err());
    }

    #[test]
    fn test_stack_name_must_be_a_file_name() {
        let tree = ConstructNode::root("app").with_child(ConstructNode::stack(
            "escape",
            StackProps::new("../escaped", DeploymentScope::ResourceGroup),
        ));
        let err = collect(&traverse(&tree)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArmforgeError>(),
            Some(ArmforgeError::UnsafeName { name, .. }) if name == "../escaped"
        ));
    }

    fn function(id: &str, name: &str) -> ConstructNode {
        ConstructNode::function(FunctionDescriptor::new(id, name, format!("/src/{name}.ts")))
    }

    #[test]
    fn test_function_names_unique_across_stacks() {
        let tree = ConstructNode::root("app")
            .with_child(
                ConstructNode::stack("a", StackProps::new("a", DeploymentScope::ResourceGroup))
                    .with_child(function("a-id", "api")),
            )
            .with_child(
                ConstructNode::stack("b", StackProps::new("b", DeploymentScope::ResourceGroup))
                    .with_child(function("b-id", "api")),
            );
        let err = collect(&traverse(&tree)).unwrap_err();
        match err.downcast_ref::<ArmforgeError>() {
            Some(ArmforgeError::DuplicateName { kind, name, .. }) => {
                assert_eq!(kind, "function");
                assert_eq!(name, "api");
            }
            other => panic!("expected duplicate name, got {other:?}"),
        }
    }

    #[test]
    fn test_function_name_must_be_a_file_name() {
        let tree = ConstructNode::root("app").with_child(
            ConstructNode::stack("a", StackProps::new("a", DeploymentScope::ResourceGroup))
                .with_child(function("fn-1", "nested/api")),
        );
        let err = collect(&traverse(&tree)).unwrap_err();
        assert!(matches!(err.downcast_ref::<ArmforgeError>(), Some(ArmforgeError::UnsafeName { .. })));
    }

    #[test]
    fn test_subscription_resource_in_resource_group_stack_fails() {
        let tree = ConstructNode::root("app").with_child(
            ConstructNode::stack("core", StackProps::new("core", DeploymentScope::ResourceGroup))
                .with_child(ConstructNode::resource(Arc::new(
                    GenericResource::new("Microsoft.Resources/resourceGroups", "2022-09-01", "rg")
                        .with_scope(DeploymentScope::Subscription),
                ))),
        );
        let stacks = collect(&traverse(&tree)).unwrap();

        let err = validate_resources(&stacks).unwrap_err();
        match err.downcast_ref::<ArmforgeError>() {
            Some(ArmforgeError::ScopeViolation { violations }) => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("core/rg"));
                assert!(violations[0].contains("subscription"));
            }
            other => panic!("expected scope violation, got {other:?}"),
        }
    }

    #[test]
    fn test_narrower_resource_in_broader_stack_is_allowed() {
        let tree = sample_tree();
        let stacks = collect(&traverse(&tree)).unwrap();
        assert!(validate_resources(&stacks).is_ok());
    }
}
