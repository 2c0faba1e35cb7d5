//! Component resources
//!
//! A component groups the nodes one provider contributes to a stack and
//! exposes a fixed set of named deferred outputs. Those outputs are the only
//! way other components can depend on it; node references never leave the
//! builder.

use crate::deferred::{DeferredValue, Outcome};
use crate::error::{CloudError, Result};
use crate::graph::{DependencyGraph, NodeRef, NodeSpec};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Lifecycle of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Nodes are still being registered
    Building,
    /// Outputs are fixed; waiting for provisioning
    Sealed,
    /// Every node and output resolved
    Resolved,
    /// At least one node or output failed
    Failed,
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentState::Building => write!(f, "building"),
            ComponentState::Sealed => write!(f, "sealed"),
            ComponentState::Resolved => write!(f, "resolved"),
            ComponentState::Failed => write!(f, "failed"),
        }
    }
}

/// Registers a component's nodes into a shared graph
pub struct ComponentBuilder<'g> {
    graph: &'g mut DependencyGraph,
    type_token: String,
    name: String,
    root: NodeRef,
    members: Vec<NodeRef>,
}

impl<'g> ComponentBuilder<'g> {
    /// Registers the logical root node, e.g. `omnicloud:aws:AwsInfra`
    pub fn new(
        graph: &'g mut DependencyGraph,
        type_token: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let type_token = type_token.into();
        let name = name.into();
        let root = graph.add_node(NodeSpec::new(type_token.clone(), name.clone()).logical())?;
        Ok(Self {
            graph,
            type_token,
            name,
            root,
            members: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ComponentState {
        ComponentState::Building
    }

    fn owns(&self, node: NodeRef) -> bool {
        node == self.root || self.members.contains(&node)
    }

    fn foreign(&self, node: NodeRef) -> CloudError {
        CloudError::ForeignResource {
            component: self.name.clone(),
            resource: self
                .graph
                .node(node)
                .map(|n| n.id().to_string())
                .unwrap_or_else(|| node.to_string()),
        }
    }

    /// Registers a node owned by this component. Without an explicit parent
    /// the node is parented to the component root.
    pub fn child(&mut self, spec: NodeSpec) -> Result<NodeRef> {
        let spec = match spec.parent() {
            Some(parent) if !self.owns(parent) => return Err(self.foreign(parent)),
            Some(_) => spec,
            None => spec.with_parent(self.root),
        };
        if let Some(dependency) = spec.dependencies().iter().find(|d| !self.owns(**d)) {
            return Err(self.foreign(*dependency));
        }

        let node = self.graph.add_node(spec)?;
        self.members.push(node);
        Ok(node)
    }

    /// Adds an ordering edge between two nodes of this component
    pub fn depends_on(&mut self, consumer: NodeRef, producer: NodeRef) -> Result<()> {
        for node in [consumer, producer] {
            if !self.owns(node) {
                return Err(self.foreign(node));
            }
        }
        self.graph.add_dependency(consumer, producer)
    }

    /// Typed deferred view of one output of a member node
    pub fn output<T>(&self, node: NodeRef, key: &str) -> DeferredValue<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        if !self.owns(node) {
            return DeferredValue::failed(self.foreign(node));
        }
        self.graph.output(node, key)
    }

    /// Fixes the named outputs. The component counts as resolved once every
    /// member node and every output has resolved.
    pub fn seal<I, K>(self, outputs: I) -> Component
    where
        I: IntoIterator<Item = (K, DeferredValue<serde_json::Value>)>,
        K: Into<String>,
    {
        let outputs: BTreeMap<String, DeferredValue<serde_json::Value>> = outputs
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();

        let members = self
            .members
            .iter()
            .map(|node| self.graph.outputs_of(*node).map(|_| ()));
        let exported = outputs.values().map(|value| value.map(|_| ()));
        let settled = DeferredValue::all(members.chain(exported).collect::<Vec<_>>()).map(|_| ());

        tracing::debug!(
            component = %self.name,
            members = self.members.len(),
            outputs = outputs.len(),
            "sealed component"
        );

        Component {
            type_token: self.type_token,
            name: self.name,
            outputs,
            settled,
        }
    }
}

/// A sealed component: a name plus its named deferred outputs
#[derive(Debug, Clone)]
pub struct Component {
    type_token: String,
    name: String,
    outputs: BTreeMap<String, DeferredValue<serde_json::Value>>,
    settled: DeferredValue<()>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_token(&self) -> &str {
        &self.type_token
    }

    pub fn output(&self, name: &str) -> Option<&DeferredValue<serde_json::Value>> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> &BTreeMap<String, DeferredValue<serde_json::Value>> {
        &self.outputs
    }

    /// Derived from deferred resolution only
    pub fn state(&self) -> ComponentState {
        match self.settled.peek() {
            None => ComponentState::Sealed,
            Some(Ok(())) => ComponentState::Resolved,
            Some(Err(_)) => ComponentState::Failed,
        }
    }

    /// Waits until every member node and output has settled
    pub async fn wait(&self) -> Outcome<()> {
        self.settled.get().await
    }
}
