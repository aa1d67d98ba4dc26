//! Partitioning of oversized templates into a root plus linked templates.
//!
//! Resources arrive in dependency order and are packed greedily: each one is
//! appended to the current group while the group's document stays under the
//! ceiling, otherwise a new group starts. Because groups are contiguous runs
//! of a topological order, a resource only ever depends on resources in its
//! own or an earlier group.
//!
//! Documents are measured in the format they are written in, so a pretty
//! printed assembly is split against its pretty printed size.
//!
//! Root outputs that read resources of one linked template move into that
//! template and are forwarded through the deployment's outputs.

use anyhow::Result;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

use super::document::{ArmTemplate, LinkedTemplateSet, TransformedResource, document_size};
use super::graph::stable_topological_order;
use super::resolver::SiblingIndex;
use crate::constants::{DEFAULT_MAX_TEMPLATE_SIZE, DEPLOYMENTS_API_VERSION};
use crate::core::{ArmforgeError, DeploymentScope};

const DEPLOYMENTS_TYPE: &str = "Microsoft.Resources/deployments";

/// Options for [`split`].
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub stack_name: String,
    /// Ceiling for any single emitted document, in bytes
    pub max_template_size: usize,
    /// When false the template is returned unchanged
    pub enabled: bool,
    /// Measure documents as pretty printed JSON
    pub pretty: bool,
}

impl SplitOptions {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            max_template_size: DEFAULT_MAX_TEMPLATE_SIZE,
            enabled: true,
            pretty: false,
        }
    }

    #[must_use]
    pub fn with_max_template_size(mut self, max_template_size: usize) -> Self {
        self.max_template_size = max_template_size;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn measure(&self, template: &ArmTemplate) -> usize {
        document_size(template, self.pretty)
    }
}

/// Name of the `n`th (1-based) linked template of a stack.
pub fn linked_template_name(stack_name: &str, n: usize) -> String {
    format!("{stack_name}-linked-{n}")
}

/// Split `template` so that no document exceeds `options.max_template_size`.
///
/// A template that already fits, or splitting being disabled, yields the
/// input as `root` with no linked templates.
pub fn split(template: ArmTemplate, options: &SplitOptions) -> Result<LinkedTemplateSet> {
    let limit = options.max_template_size;
    if !options.enabled || options.measure(&template) <= limit {
        return Ok(LinkedTemplateSet::single(template));
    }

    let shell = template.empty_like();
    let groups = partition(&template.resources, &shell, options)?;

    tracing::debug!(
        "Splitting stack {} ({} resources) into {} linked templates",
        options.stack_name,
        template.resources.len(),
        groups.len()
    );

    let names: Vec<String> = (1..=groups.len())
        .map(|n| linked_template_name(&options.stack_name, n))
        .collect();
    let mut group_of = vec![0usize; template.resources.len()];
    for (group, members) in groups.iter().enumerate() {
        for &index in members {
            group_of[index] = group;
        }
    }

    // Drop cross-group dependsOn entries and lift them to the document level.
    let siblings = SiblingIndex::new(&template.resources);
    let mut edges = BTreeSet::new();
    let mut resources = template.resources.clone();
    for (index, resource) in resources.iter_mut().enumerate() {
        let own = group_of[index];
        resource.depends_on.retain(|entry| match siblings.target_of(entry) {
            Some(target) if group_of[target] != own => {
                edges.insert((own, group_of[target]));
                false
            }
            _ => true,
        });
    }

    let edge_list: Vec<(usize, usize)> = edges.iter().copied().collect();
    let order = stable_topological_order(&names, &edge_list).map_err(|cycle| {
        ArmforgeError::CircularDependency {
            stack: options.stack_name.clone(),
            resources: cycle,
        }
    })?;

    let mut dependencies: BTreeMap<String, BTreeSet<String>> =
        names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();
    for &(dependent, dependency) in &edges {
        if let Some(set) = dependencies.get_mut(&names[dependent]) {
            set.insert(names[dependency].clone());
        }
    }

    let mut slots: Vec<Option<TransformedResource>> = resources.into_iter().map(Some).collect();
    let mut linked = BTreeMap::new();
    for (group, members) in groups.iter().enumerate() {
        let mut document = shell.clone();
        document.resources = members.iter().filter_map(|&i| slots[i].take()).collect();
        linked.insert(names[group].clone(), document);
    }

    let deployment_order: Vec<String> = order.iter().map(|&i| names[i].clone()).collect();

    let mut root = shell;
    root.outputs = relocate_outputs(
        template.outputs,
        &siblings,
        &group_of,
        &names,
        &mut linked,
        &options.stack_name,
    );
    for (name, document) in &linked {
        let size = options.measure(document);
        if size > limit {
            return Err(ArmforgeError::TemplateTooLarge {
                name: name.clone(),
                size,
                limit,
            }
            .into());
        }
    }
    let nested_location = root.schema != DeploymentScope::ResourceGroup.schema_url();
    root.resources = deployment_order
        .iter()
        .map(|name| {
            deployment_resource(
                name,
                &root.parameters,
                &root.content_version,
                &dependencies[name],
                nested_location,
            )
        })
        .collect();

    let root_size = options.measure(&root);
    if root_size > limit {
        return Err(ArmforgeError::TemplateTooLarge {
            name: options.stack_name.clone(),
            size: root_size,
            limit,
        }
        .into());
    }

    Ok(LinkedTemplateSet {
        root,
        linked,
        dependencies,
        deployment_order,
    })
}

/// Move every output whose expressions read resources of a single linked
/// template into that template. The root keeps a forwarding output of the
/// same name. Outputs reading several linked templates stay in the root and
/// are reported, since the root cannot resolve them.
fn relocate_outputs(
    outputs: Map<String, Value>,
    siblings: &SiblingIndex,
    group_of: &[usize],
    names: &[String],
    linked: &mut BTreeMap<String, ArmTemplate>,
    stack_name: &str,
) -> Map<String, Value> {
    let mut root_outputs = Map::new();
    for (key, output) in outputs {
        let groups: BTreeSet<usize> = siblings.value_targets(&output).into_iter().map(|t| group_of[t]).collect();
        if groups.len() > 1 {
            tracing::warn!(
                "Output '{key}' of stack {stack_name} reads resources from {} linked templates and cannot be forwarded",
                groups.len()
            );
        }
        let single = if groups.len() == 1 { groups.first().copied() } else { None };
        let Some((deployment, document)) =
            single.and_then(|group| linked.get_mut(&names[group]).map(|d| (&names[group], d)))
        else {
            root_outputs.insert(key, output);
            continue;
        };

        let output_type = output.get("type").cloned().unwrap_or_else(|| json!("string"));
        document.outputs.insert(key.clone(), output);
        root_outputs.insert(
            key.clone(),
            json!({
                "type": output_type,
                "value": format!("[reference('{deployment}').outputs.{key}.value]"),
            }),
        );
    }
    root_outputs
}

/// Bytes `resource` adds to a document built on `shell`, as `(first, next)`.
///
/// The first element of the resource array also pays for the array's
/// framing, every later one for its separator. Elements sit at the same
/// depth, so their text does not depend on position and both costs are
/// exact.
fn element_costs(shell: &ArmTemplate, resource: &TransformedResource, options: &SplitOptions) -> (usize, usize) {
    let mut document = shell.clone();
    let empty = options.measure(&document);
    document.resources.push(resource.clone());
    let one = options.measure(&document);
    document.resources.push(resource.clone());
    let two = options.measure(&document);
    (one.saturating_sub(empty), two.saturating_sub(one))
}

/// Greedy first-fit grouping of resource indices, preserving order.
fn partition(
    resources: &[TransformedResource],
    shell: &ArmTemplate,
    options: &SplitOptions,
) -> Result<Vec<Vec<usize>>> {
    let limit = options.max_template_size;
    let base_size = options.measure(shell);
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_size = base_size;

    for (index, resource) in resources.iter().enumerate() {
        let (first, next) = element_costs(shell, resource, options);
        if base_size + first > limit {
            return Err(ArmforgeError::OversizedResource {
                stack: options.stack_name.clone(),
                resource: resource.name.clone(),
                size: base_size + first,
                limit,
            }
            .into());
        }

        if current.is_empty() {
            current_size = base_size + first;
        } else if current_size + next > limit {
            groups.push(std::mem::take(&mut current));
            current_size = base_size + first;
        } else {
            current_size += next;
        }
        current.push(index);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    Ok(groups)
}

/// The root-template resource that deploys one linked template.
fn deployment_resource(
    name: &str,
    parameters: &Map<String, Value>,
    content_version: &str,
    depends_on: &BTreeSet<String>,
    with_location: bool,
) -> TransformedResource {
    let pass_through: Map<String, Value> = parameters
        .keys()
        .map(|p| (p.clone(), json!({ "value": format!("[parameters('{p}')]") })))
        .collect();

    let mut resource = TransformedResource::new(DEPLOYMENTS_TYPE, DEPLOYMENTS_API_VERSION, name)
        .with_properties(json!({
            "mode": "Incremental",
            "templateLink": {
                "relativePath": format!("{name}.json"),
                "contentVersion": content_version,
            },
            "parameters": pass_through,
        }));
    if with_location {
        resource = resource.with_location("[deployment().location]");
    }
    resource.depends_on = depends_on.iter().cloned().collect();
    resource
}
