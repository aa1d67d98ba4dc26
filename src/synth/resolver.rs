//! Dependency discovery and ordering within a stack.
//!
//! [`DependencyResolver::resolve`] wires `dependsOn` from two sources:
//! - the explicit cross-reference list reported by the source node, which
//!   must name a sibling (by name or logical id)
//! - `resourceId(...)` and `reference(...)` expressions embedded in string
//!   property values that name a sibling; expressions naming anything else
//!   are treated as external and ignored
//!
//! [`DependencyResolver::topological_sort`] then orders the resources with
//! [`stable_topological_order`], failing on any cycle.

use anyhow::{Result, anyhow};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock};

use super::document::TransformedResource;
use super::graph::stable_topological_order;
use crate::construct::ResourceNode;
use crate::core::ArmforgeError;

static RESOURCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"resourceId\(([^()]*)\)").expect("valid regex"));
static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reference\(\s*'([^']+)'").expect("valid regex"));
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("valid regex"));

/// Lookup of sibling resources by name and logical id.
pub(crate) struct SiblingIndex {
    by_name: HashMap<String, usize>,
    types: Vec<String>,
}

impl SiblingIndex {
    pub(crate) fn new(resources: &[TransformedResource]) -> Self {
        Self {
            by_name: resources.iter().enumerate().map(|(i, r)| (r.name.clone(), i)).collect(),
            types: resources.iter().map(|r| r.resource_type.to_ascii_lowercase()).collect(),
        }
    }

    fn by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Map a `dependsOn` entry to a sibling index.
    ///
    /// Plain entries are matched by name; expression entries (`[...]`) are
    /// matched through the `resourceId(...)` call they contain, honoring the
    /// resource type when one is given.
    pub(crate) fn target_of(&self, entry: &str) -> Option<usize> {
        let trimmed = entry.trim();
        if trimmed.starts_with('[') {
            return self.expression_targets(trimmed).into_iter().next();
        }
        self.by_name(trimmed)
    }

    /// Siblings named by any expression string nested in `value`.
    pub(crate) fn value_targets(&self, value: &Value) -> BTreeSet<usize> {
        let mut strings = Vec::new();
        collect_strings(value, &mut strings);
        strings
            .iter()
            .filter(|s| s.trim_start().starts_with('['))
            .flat_map(|s| self.expression_targets(s))
            .collect()
    }

    /// Every sibling named by `resourceId(...)` or `reference(...)` in `text`.
    fn expression_targets(&self, text: &str) -> Vec<usize> {
        let mut targets = Vec::new();

        for captures in RESOURCE_ID_RE.captures_iter(text) {
            let args: Vec<&str> = QUOTED_RE
                .captures_iter(&captures[1])
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect();
            let resource_type = args.iter().find(|a| a.contains('/'));
            let Some(name) = args.last() else {
                continue;
            };
            if let Some(index) = self.by_name(name) {
                let type_matches =
                    resource_type.is_none_or(|t| t.eq_ignore_ascii_case(&self.types[index]));
                if type_matches {
                    targets.push(index);
                }
            }
        }

        for captures in REFERENCE_RE.captures_iter(text) {
            if let Some(index) = self.by_name(&captures[1]) {
                targets.push(index);
            }
        }

        targets
    }
}

/// Resolves and orders the resources of one stack.
pub struct DependencyResolver {
    stack_name: String,
}

impl DependencyResolver {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
        }
    }

    /// Populate `dependsOn` for every resource.
    ///
    /// `sources` must be index-aligned with `resources`. Existing `dependsOn`
    /// entries are kept first; discovered targets are appended by name, once,
    /// and self-references are dropped. Running `resolve` again on its own
    /// output adds nothing.
    pub fn resolve(
        &self,
        mut resources: Vec<TransformedResource>,
        sources: &[Arc<dyn ResourceNode>],
    ) -> Result<Vec<TransformedResource>> {
        if sources.len() != resources.len() {
            return Err(anyhow!(
                "Stack '{}': {} source nodes for {} resources",
                self.stack_name,
                sources.len(),
                resources.len()
            ));
        }

        self.check_unique_names(&resources)?;
        let index = SiblingIndex::new(&resources);
        let logical_ids: HashMap<&str, usize> =
            sources.iter().enumerate().map(|(i, s)| (s.logical_id(), i)).collect();
        let names: Vec<String> = resources.iter().map(|r| r.name.clone()).collect();

        for (i, source) in sources.iter().enumerate() {
            let mut present: BTreeSet<usize> =
                resources[i].depends_on.iter().filter_map(|d| index.target_of(d)).collect();
            let mut discovered = Vec::new();

            for reference in source.references() {
                let target = index
                    .by_name(&reference)
                    .or_else(|| logical_ids.get(reference.as_str()).copied())
                    .ok_or_else(|| self.unresolved(&names[i], &reference, &names))?;
                discovered.push(target);
            }

            let mut strings = Vec::new();
            collect_strings(&resources[i].properties, &mut strings);
            for text in strings.iter().filter(|s| s.trim_start().starts_with('[')) {
                discovered.extend(index.expression_targets(text));
            }

            for target in discovered {
                if target != i && present.insert(target) {
                    resources[i].depends_on.push(names[target].clone());
                }
            }
        }

        Ok(resources)
    }

    /// Order resources so every dependency precedes its dependents.
    ///
    /// Ties are broken by declaration order. A plain `dependsOn` entry that
    /// names no sibling is an [`ArmforgeError::UnresolvedReference`];
    /// expression entries that name no sibling are external and ignored. Any
    /// cycle fails with [`ArmforgeError::CircularDependency`] naming every
    /// participant.
    pub fn topological_sort(
        &self,
        resources: Vec<TransformedResource>,
    ) -> Result<Vec<TransformedResource>> {
        self.check_unique_names(&resources)?;
        let index = SiblingIndex::new(&resources);
        let names: Vec<String> = resources.iter().map(|r| r.name.clone()).collect();

        let mut edges = Vec::new();
        for (i, resource) in resources.iter().enumerate() {
            for entry in &resource.depends_on {
                match index.target_of(entry) {
                    Some(target) => edges.push((i, target)),
                    None if entry.trim_start().starts_with('[') => {}
                    None => return Err(self.unresolved(&resource.name, entry, &names).into()),
                }
            }
        }

        let order = stable_topological_order(&names, &edges).map_err(|cycle| {
            anyhow::Error::new(ArmforgeError::CircularDependency {
                stack: self.stack_name.clone(),
                resources: cycle,
            })
        })?;

        let mut slots: Vec<Option<TransformedResource>> = resources.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    fn check_unique_names(&self, resources: &[TransformedResource]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for resource in resources {
            if !seen.insert(resource.name.as_str()) {
                return Err(ArmforgeError::DuplicateName {
                    kind: "resource".to_string(),
                    name: resource.name.clone(),
                    scope: format!("stack '{}'", self.stack_name),
                }
                .into());
            }
        }
        Ok(())
    }

    fn unresolved(&self, resource: &str, target: &str, names: &[String]) -> ArmforgeError {
        let suggestion = names
            .iter()
            .map(|n| (strsim::jaro_winkler(target, n), n))
            .filter(|(score, _)| *score > 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, n)| n.clone());

        ArmforgeError::UnresolvedReference {
            stack: self.stack_name.clone(),
            resource: resource.to_string(),
            target: target.to_string(),
            suggestion,
        }
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::GenericResource;
    use serde_json::json;

    fn lower(nodes: &[GenericResource]) -> (Vec<TransformedResource>, Vec<Arc<dyn ResourceNode>>) {
        let sources: Vec<Arc<dyn ResourceNode>> =
            nodes.iter().map(|n| Arc::new(n.clone()) as Arc<dyn ResourceNode>).collect();
        let resources = sources.iter().map(|s| s.to_arm().unwrap()).collect();
        (resources, sources)
    }

    fn order_of(resources: &[TransformedResource]) -> Vec<&str> {
        resources.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_chain_sorts_dependencies_first() {
        let (resources, sources) = lower(&[
            GenericResource::new("T/a", "2020-01-01", "A").depends_on("B"),
            GenericResource::new("T/b", "2020-01-01", "B").depends_on("C"),
            GenericResource::new("T/c", "2020-01-01", "C"),
        ]);
        let resolver = DependencyResolver::new("core");

        let resolved = resolver.resolve(resources, &sources).unwrap();
        let sorted = resolver.topological_sort(resolved).unwrap();

        assert_eq!(order_of(&sorted), vec!["C", "B", "A"]);
        assert_eq!(sorted[2].depends_on, vec!["B".to_string()]);
    }

    #[test]
    fn test_cycle_names_both_resources() {
        let (resources, sources) = lower(&[
            GenericResource::new("T/a", "2020-01-01", "A").depends_on("B"),
            GenericResource::new("T/b", "2020-01-01", "B").depends_on("A"),
        ]);
        let resolver = DependencyResolver::new("core");
        let resolved = resolver.resolve(resources, &sources).unwrap();

        let err = resolver.topological_sort(resolved).unwrap_err();
        match err.downcast_ref::<ArmforgeError>() {
            Some(ArmforgeError::CircularDependency { stack, resources }) => {
                assert_eq!(stack, "core");
                assert_eq!(resources, &vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected circular dependency, got {other:?}"),
        }
    }

    #[test]
    fn test_property_expressions_create_dependencies() {
        let (resources, sources) = lower(&[
            GenericResource::new("Microsoft.Web/sites", "2023-01-01", "site").with_properties(json!({
                "serverFarmId": "[resourceId('Microsoft.Web/serverfarms', 'plan')]",
                "siteConfig": {
                    "appSettings": [
                        {"name": "KEY", "value": "[reference('insights').InstrumentationKey]"},
                        {"name": "EXT", "value": "[resourceId('Microsoft.Web/sites', 'elsewhere')]"}
                    ]
                }
            })),
            GenericResource::new("Microsoft.Web/serverfarms", "2023-01-01", "plan"),
            GenericResource::new("Microsoft.Insights/components", "2020-02-02", "insights"),
        ]);
        let resolver = DependencyResolver::new("core");

        let resolved = resolver.resolve(resources, &sources).unwrap();
        let site = &resolved[0];
        assert_eq!(site.depends_on, vec!["plan".to_string(), "insights".to_string()]);

        let sorted = resolver.topological_sort(resolved).unwrap();
        assert_eq!(order_of(&sorted), vec!["plan", "insights", "site"]);
    }

    #[test]
    fn test_resource_id_type_mismatch_is_ignored() {
        let (resources, sources) = lower(&[
            GenericResource::new("T/a", "2020-01-01", "a")
                .with_properties(json!({"ref": "[resourceId('Other/type', 'b')]"})),
            GenericResource::new("T/b", "2020-01-01", "b"),
        ]);
        let resolved = DependencyResolver::new("core").resolve(resources, &sources).unwrap();
        assert!(resolved[0].depends_on.is_empty());
    }

    #[test]
    fn test_explicit_reference_by_logical_id() {
        let (resources, sources) = lower(&[
            GenericResource::new("T/a", "2020-01-01", "a-name").depends_on("bee"),
            GenericResource::new("T/b", "2020-01-01", "b-name").with_logical_id("bee"),
        ]);
        let resolved = DependencyResolver::new("core").resolve(resources, &sources).unwrap();
        assert_eq!(resolved[0].depends_on, vec!["b-name".to_string()]);
    }

    #[test]
    fn test_unknown_explicit_reference_suggests_sibling() {
        let (resources, sources) = lower(&[
            GenericResource::new("T/a", "2020-01-01", "app").depends_on("storag"),
            GenericResource::new("T/b", "2020-01-01", "storage"),
        ]);
        let err = DependencyResolver::new("core").resolve(resources, &sources).unwrap_err();
        match err.downcast_ref::<ArmforgeError>() {
            Some(ArmforgeError::UnresolvedReference { suggestion, target, .. }) => {
                assert_eq!(target, "storag");
                assert_eq!(suggestion.as_deref(), Some("storage"));
            }
            other => panic!("expected unresolved reference, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_and_sort_are_idempotent() {
        let nodes = [
            GenericResource::new("T/x", "2020-01-01", "x").depends_on("z"),
            GenericResource::new("T/y", "2020-01-01", "y"),
            GenericResource::new("T/z", "2020-01-01", "z")
                .with_properties(json!({"p": "[resourceId('T/y', 'y')]"})),
        ];
        let resolver = DependencyResolver::new("core");

        let (resources, sources) = lower(&nodes);
        let first = resolver.topological_sort(resolver.resolve(resources, &sources).unwrap()).unwrap();
        let (resources, sources) = lower(&nodes);
        let second = resolver.topological_sort(resolver.resolve(resources, &sources).unwrap()).unwrap();

        assert_eq!(first, second);
        assert_eq!(order_of(&first), vec!["y", "z", "x"]);

        // resolving already-resolved output adds nothing
        let again = resolver.resolve(first.clone(), &reorder(&sources, &first)).unwrap();
        assert_eq!(again, first);
    }

    fn reorder(
        sources: &[Arc<dyn ResourceNode>],
        resources: &[TransformedResource],
    ) -> Vec<Arc<dyn ResourceNode>> {
        resources
            .iter()
            .map(|r| sources.iter().find(|s| s.to_arm().unwrap().name == r.name).unwrap().clone())
            .collect()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (resources, sources) = lower(&[
            GenericResource::new("T/a", "2020-01-01", "dup"),
            GenericResource::new("T/b", "2020-01-01", "dup"),
        ]);
        let err = DependencyResolver::new("core").resolve(resources, &sources).unwrap_err();
        assert!(err.to_string().contains("Duplicate resource name 'dup'"));
    }

    #[test]
    fn test_plain_dependency_on_unknown_sibling_fails_sort() {
        let resource = TransformedResource::new("T/a", "2020-01-01", "a").depending_on("ghost");
        let err = DependencyResolver::new("core").topological_sort(vec![resource]).unwrap_err();
        assert!(err.to_string().contains("unknown resource 'ghost'"));
    }

    #[test]
    fn test_external_expression_dependency_is_ignored_by_sort() {
        let resource = TransformedResource::new("T/a", "2020-01-01", "a")
            .depending_on("[resourceId('T/b', 'external')]");
        let sorted = DependencyResolver::new("core").topological_sort(vec![resource]).unwrap();
        assert_eq!(sorted.len(), 1);
    }
}
