//! Lowers resource nodes to their template representation.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::document::TransformedResource;
use crate::construct::ResourceNode;
use crate::core::ArmforgeError;

/// One-to-one mapping from resource nodes to [`TransformedResource`]s.
///
/// No cross-resource logic lives here; dependency wiring is done afterwards
/// by the resolver.
pub struct ResourceTransformer;

impl ResourceTransformer {
    /// Transform every resource in declaration order.
    ///
    /// The first failing resource aborts the whole batch; no partial output
    /// is returned.
    pub fn transform_all(resources: &[Arc<dyn ResourceNode>]) -> Result<Vec<TransformedResource>> {
        resources
            .iter()
            .map(|node| {
                node.to_arm().with_context(|| ArmforgeError::TransformFailed {
                    resource: node.logical_id().to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::GenericResource;

    #[test]
    fn test_transform_all_preserves_order() {
        let nodes: Vec<Arc<dyn ResourceNode>> = vec![
            Arc::new(GenericResource::new("T/a", "2020-01-01", "a")),
            Arc::new(GenericResource::new("T/b", "2020-01-01", "b")),
        ];
        let out = ResourceTransformer::transform_all(&nodes).unwrap();
        assert_eq!(out.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_transform_all_aborts_on_first_error() {
        let nodes: Vec<Arc<dyn ResourceNode>> = vec![
            Arc::new(GenericResource::new("T/a", "2020-01-01", "a")),
            Arc::new(GenericResource::new("T/b", "", "broken")),
        ];
        let err = ResourceTransformer::transform_all(&nodes).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArmforgeError>(),
            Some(ArmforgeError::TransformFailed { resource }) if resource == "broken"
        ));
        assert!(format!("{err:#}").contains("apiVersion"));
    }
}
