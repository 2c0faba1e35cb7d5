//! Resource dependency graph
//!
//! Every provisioned unit is a [`ResourceNode`]. Edges point from producer to
//! consumer and come from two sources: ownership (parent → child) and
//! explicit depends-on declarations. Creation follows a topological order of
//! these edges; teardown is the exact reverse, minus nodes flagged
//! retain-on-teardown, which are only dropped from tracking.

use crate::deferred::{DeferredValue, Input, Resolver};
use crate::error::{CloudError, Result};
use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Property values passed into and returned from provisioning calls
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Reference to a node registered in a specific [`DependencyGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    graph: u64,
    index: NodeIndex,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/{}", self.graph, self.index.index())
    }
}

/// Why an edge exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Ownership,
    DependsOn,
}

/// Declaration of a node before it is registered
pub struct NodeSpec {
    kind: String,
    name: String,
    parent: Option<NodeRef>,
    dependencies: Vec<NodeRef>,
    inputs: BTreeMap<String, DeferredValue<serde_json::Value>>,
    retain_on_teardown: bool,
    logical: bool,
}

impl NodeSpec {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            parent: None,
            dependencies: Vec::new(),
            inputs: BTreeMap::new(),
            retain_on_teardown: false,
            logical: false,
        }
    }

    pub fn with_parent(mut self, parent: NodeRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_dependency(mut self, producer: NodeRef) -> Self {
        if !self.dependencies.contains(&producer) {
            self.dependencies.push(producer);
        }
        self
    }

    /// Declares an input the provisioning call needs resolved first
    pub fn with_input<T>(mut self, key: impl Into<String>, value: impl Into<Input<T>>) -> Self
    where
        T: Serialize + Clone + Send + 'static,
    {
        self.inputs
            .insert(key.into(), value.into().into_deferred().to_json());
        self
    }

    /// Teardown drops the node from tracking without a live deletion call
    pub fn retain_on_teardown(mut self) -> Self {
        self.retain_on_teardown = true;
        self
    }

    /// Grouping node with no external counterpart (component roots)
    pub fn logical(mut self) -> Self {
        self.logical = true;
        self
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    pub fn dependencies(&self) -> &[NodeRef] {
        &self.dependencies
    }
}

/// One unit to be provisioned
pub struct ResourceNode {
    id: String,
    kind: String,
    name: String,
    parent: Option<NodeRef>,
    extra_dependencies: Vec<NodeRef>,
    retain_on_teardown: bool,
    logical: bool,
    inputs: BTreeMap<String, DeferredValue<serde_json::Value>>,
    outputs: DeferredValue<PropertyMap>,
    resolver: Option<Resolver<PropertyMap>>,
}

impl ResourceNode {
    /// Stable identifier derived from the ownership chain, kind and name
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    pub fn extra_dependencies(&self) -> &[NodeRef] {
        &self.extra_dependencies
    }

    pub fn retain_on_teardown(&self) -> bool {
        self.retain_on_teardown
    }

    pub fn is_logical(&self) -> bool {
        self.logical
    }

    pub fn inputs(&self) -> &BTreeMap<String, DeferredValue<serde_json::Value>> {
        &self.inputs
    }

    /// Pending until the provisioning call for this node completes
    pub fn outputs(&self) -> &DeferredValue<PropertyMap> {
        &self.outputs
    }
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("extra_dependencies", &self.extra_dependencies)
            .field("retain_on_teardown", &self.retain_on_teardown)
            .field("logical", &self.logical)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Single step of a teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    /// Issue a live deletion call
    Destroy(NodeRef),
    /// Drop from tracking only
    Forget(NodeRef),
}

impl TeardownStep {
    pub fn node(&self) -> NodeRef {
        match self {
            TeardownStep::Destroy(node) | TeardownStep::Forget(node) => *node,
        }
    }
}

/// Reverse creation order split by how each node is removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownPlan {
    pub steps: Vec<TeardownStep>,
}

impl TeardownPlan {
    /// Nodes receiving a live deletion call, in order
    pub fn deletions(&self) -> Vec<NodeRef> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                TeardownStep::Destroy(node) => Some(*node),
                TeardownStep::Forget(_) => None,
            })
            .collect()
    }

    /// Retain-on-teardown nodes, in order
    pub fn retained(&self) -> Vec<NodeRef> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                TeardownStep::Forget(node) => Some(*node),
                TeardownStep::Destroy(_) => None,
            })
            .collect()
    }
}

/// All registered nodes plus ownership and depends-on edges. Always acyclic.
pub struct DependencyGraph {
    id: u64,
    graph: DiGraph<ResourceNode, EdgeKind>,
    ids: HashMap<String, NodeIndex>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            graph: DiGraph::new(),
            ids: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn index_of(&self, node: NodeRef) -> Option<NodeIndex> {
        (node.graph == self.id && node.index.index() < self.graph.node_count())
            .then_some(node.index)
    }

    fn node_ref(&self, index: NodeIndex) -> NodeRef {
        NodeRef {
            graph: self.id,
            index,
        }
    }

    /// Registers a node. The parent and every declared dependency must
    /// already be registered in this graph.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeRef> {
        let parent = match spec.parent {
            Some(parent) => Some(self.index_of(parent).ok_or_else(|| {
                CloudError::UnknownParent(format!("{}::{}", spec.kind, spec.name))
            })?),
            None => None,
        };

        let mut dependencies = Vec::with_capacity(spec.dependencies.len());
        for dependency in &spec.dependencies {
            let index = self
                .index_of(*dependency)
                .ok_or_else(|| CloudError::UnknownResource(dependency.to_string()))?;
            dependencies.push(index);
        }

        let id = match parent {
            Some(parent) => format!("{}${}::{}", self.graph[parent].id, spec.kind, spec.name),
            None => format!("{}::{}", spec.kind, spec.name),
        };
        if self.ids.contains_key(&id) {
            return Err(CloudError::DuplicateResource(id));
        }

        let (outputs, resolver) = DeferredValue::pending();
        let index = self.graph.add_node(ResourceNode {
            id: id.clone(),
            kind: spec.kind,
            name: spec.name,
            parent: spec.parent,
            extra_dependencies: spec.dependencies,
            retain_on_teardown: spec.retain_on_teardown,
            logical: spec.logical,
            inputs: spec.inputs,
            outputs,
            resolver: Some(resolver),
        });

        if let Some(parent) = parent {
            self.graph.add_edge(parent, index, EdgeKind::Ownership);
        }
        for producer in dependencies {
            if !self.graph.contains_edge(producer, index) {
                self.graph.add_edge(producer, index, EdgeKind::DependsOn);
            }
        }

        tracing::debug!(resource = %id, "registered resource");
        self.ids.insert(id, index);
        Ok(self.node_ref(index))
    }

    /// Records that `consumer` may only be created after `producer` (and is
    /// destroyed before it). Fails without modifying the graph when the edge
    /// would close a cycle.
    pub fn add_dependency(&mut self, consumer: NodeRef, producer: NodeRef) -> Result<()> {
        let consumer_index = self
            .index_of(consumer)
            .ok_or_else(|| CloudError::UnknownResource(consumer.to_string()))?;
        let producer_index = self
            .index_of(producer)
            .ok_or_else(|| CloudError::UnknownResource(producer.to_string()))?;

        if consumer_index == producer_index
            || has_path_connecting(&self.graph, consumer_index, producer_index, None)
        {
            return Err(CloudError::Cycle {
                consumer: self.graph[consumer_index].id.clone(),
                producer: self.graph[producer_index].id.clone(),
            });
        }

        if !self.graph.contains_edge(producer_index, consumer_index) {
            self.graph
                .add_edge(producer_index, consumer_index, EdgeKind::DependsOn);
            self.graph[consumer_index].extra_dependencies.push(producer);
        }
        Ok(())
    }

    pub fn node(&self, node: NodeRef) -> Option<&ResourceNode> {
        self.index_of(node).map(|index| &self.graph[index])
    }

    pub fn find(&self, id: &str) -> Option<NodeRef> {
        self.ids.get(id).map(|index| self.node_ref(*index))
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeRef, &ResourceNode)> + '_ {
        self.graph
            .node_indices()
            .map(move |index| (self.node_ref(index), &self.graph[index]))
    }

    /// Direct producers of a node: its parent and its explicit dependencies
    pub fn dependencies_of(&self, node: NodeRef) -> Vec<NodeRef> {
        let Some(index) = self.index_of(node) else {
            return Vec::new();
        };
        let mut producers: Vec<NodeRef> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| self.node_ref(edge.source()))
            .collect();
        producers.sort();
        producers
    }

    /// Edges as (producer, consumer, kind)
    pub fn edges(&self) -> Vec<(NodeRef, NodeRef, EdgeKind)> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    self.node_ref(edge.source()),
                    self.node_ref(edge.target()),
                    *edge.weight(),
                )
            })
            .collect()
    }

    /// Topological order over ownership and depends-on edges. Ties are
    /// broken by declaration order so the result is reproducible.
    pub fn creation_order(&self) -> Vec<NodeRef> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| self.graph.edges_directed(index, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| Reverse(position))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(position)) = ready.pop() {
            let index = NodeIndex::new(position);
            order.push(self.node_ref(index));
            for edge in self.graph.edges_directed(index, Direction::Outgoing) {
                let target = edge.target().index();
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }
        order
    }

    /// Reverse of [`creation_order`](Self::creation_order). Logical nodes
    /// have nothing to delete and are left out.
    pub fn teardown_order(&self) -> TeardownPlan {
        let steps = self
            .creation_order()
            .into_iter()
            .rev()
            .filter_map(|node| {
                let resource = &self.graph[node.index];
                if resource.logical {
                    None
                } else if resource.retain_on_teardown {
                    Some(TeardownStep::Forget(node))
                } else {
                    Some(TeardownStep::Destroy(node))
                }
            })
            .collect();
        TeardownPlan { steps }
    }

    /// Pending outputs of a node; failed when the node is not in this graph
    pub fn outputs_of(&self, node: NodeRef) -> DeferredValue<PropertyMap> {
        match self.node(node) {
            Some(resource) => resource.outputs.clone(),
            None => DeferredValue::failed(CloudError::UnknownResource(node.to_string())),
        }
    }

    /// Typed view of a single output of a node
    pub fn output<T>(&self, node: NodeRef, key: &str) -> DeferredValue<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        let Some(resource) = self.node(node) else {
            return DeferredValue::failed(CloudError::UnknownResource(node.to_string()));
        };
        let id = resource.id.clone();
        let key = key.to_string();
        resource.outputs.and_then(move |outputs| match outputs.get(&key) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(typed) => DeferredValue::resolved(typed),
                Err(e) => DeferredValue::failed(CloudError::Json(e)),
            },
            None => DeferredValue::failed(CloudError::MissingOutput { resource: id, key }),
        })
    }

    /// True once resolution of this graph's nodes has been handed out
    pub fn is_provisioned(&self) -> bool {
        self.graph.node_weights().any(|node| node.resolver.is_none())
    }

    pub(crate) fn take_resolver(&mut self, node: NodeRef) -> Option<Resolver<PropertyMap>> {
        let index = self.index_of(node)?;
        self.graph[index].resolver.take()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("id", &self.id)
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}
