//! Graph evaluation
//!
//! [`Engine::provision`] makes a single pass over a [`DependencyGraph`]. Each
//! node gets one continuation gated on the outputs of its producers and on
//! its own inputs; when the gate resolves the provisioning call is spawned
//! on the runtime, so independent nodes run concurrently while dependent
//! ones wait on deferred resolution alone. A failed gate fails the node's
//! outputs with the same error and the call is never issued. A node is
//! reported before it is settled, so a creation is recorded even when a
//! downstream continuation misbehaves; the pass then waits for every node
//! to settle before returning.
//!
//! Teardown is sequential and follows [`DependencyGraph::teardown_order`].

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::deferred::{DeferredValue, Outcome};
use crate::error::{CloudError, Result};
use crate::graph::{DependencyGraph, PropertyMap, TeardownStep};
use crate::provider::{CreateRequest, Provisioner};
use crate::state::{GlobalState, ResourceState, ResourceStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// What happened to one node during a provisioning pass
#[derive(Debug)]
enum NodeReport {
    Created {
        id: String,
        kind: String,
        handle: String,
        outputs: PropertyMap,
        retain_on_teardown: bool,
    },
    Reused {
        id: String,
    },
    Logical {
        id: String,
    },
    Failed {
        id: String,
        error: Arc<CloudError>,
    },
    Skipped {
        id: String,
        error: Arc<CloudError>,
    },
}

impl NodeReport {
    fn id(&self) -> &str {
        match self {
            NodeReport::Created { id, .. }
            | NodeReport::Reused { id }
            | NodeReport::Logical { id }
            | NodeReport::Failed { id, .. }
            | NodeReport::Skipped { id, .. } => id,
        }
    }
}

/// Drives provisioning and teardown of a graph through a [`Provisioner`]
pub struct Engine {
    provisioner: Arc<dyn Provisioner>,
}

impl Engine {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self { provisioner }
    }

    pub fn provisioner_name(&self) -> &str {
        self.provisioner.name()
    }

    /// Actions a provisioning pass would take, in creation order
    pub fn plan(&self, graph: &DependencyGraph, state: &GlobalState) -> Plan {
        let actions = graph
            .creation_order()
            .into_iter()
            .filter_map(|node_ref| {
                let node = graph.node(node_ref)?;
                if node.is_logical() {
                    return None;
                }
                let depends_on: Vec<String> = graph
                    .dependencies_of(node_ref)
                    .into_iter()
                    .filter_map(|producer| graph.node(producer))
                    .filter(|producer| !producer.is_logical())
                    .map(|producer| producer.id().to_string())
                    .collect();

                let action = match state.get_resource(node.id()) {
                    Some(tracked) => {
                        Action::new(node.id(), ActionType::NoOp, node.kind(), node.name())
                            .with_description(format!(
                                "{} '{}' is already provisioned ({})",
                                node.kind(),
                                node.name(),
                                tracked.id
                            ))
                    }
                    None => Action::new(node.id(), ActionType::Create, node.kind(), node.name()),
                };
                let mut action = action.with_detail("depends_on", serde_json::json!(depends_on));
                if node.retain_on_teardown() {
                    action = action.with_detail("retain_on_teardown", serde_json::json!(true));
                }
                Some(action)
            })
            .collect();
        Plan::new(actions)
    }

    /// Provisions every node of the graph once.
    ///
    /// Nodes already tracked in `state` are not created again; their stored
    /// outputs resolve the node. Successful creations are recorded in
    /// `state` even when other nodes fail.
    pub async fn provision(
        &self,
        graph: &mut DependencyGraph,
        state: &mut GlobalState,
    ) -> Result<ApplyResult> {
        if graph.is_provisioned() {
            return Err(CloudError::AlreadyProvisioned);
        }

        let start = Instant::now();
        let runtime = tokio::runtime::Handle::current();
        let order = graph.creation_order();
        let (tx, mut rx) = mpsc::unbounded_channel::<NodeReport>();

        tracing::info!(
            provisioner = self.provisioner.name(),
            resources = order.len(),
            "provisioning graph"
        );

        for node_ref in &order {
            let Some(resolver) = graph.take_resolver(*node_ref) else {
                continue;
            };
            let Some(node) = graph.node(*node_ref) else {
                continue;
            };

            let upstream = DeferredValue::all(
                graph
                    .dependencies_of(*node_ref)
                    .into_iter()
                    .map(|producer| graph.outputs_of(producer).map(|_| ()))
                    .collect::<Vec<_>>(),
            );
            let keys: Vec<String> = node.inputs().keys().cloned().collect();
            let values = DeferredValue::all(node.inputs().values().cloned().collect::<Vec<_>>());
            let gate = upstream.zip(&values);

            let id = node.id().to_string();
            let kind = node.kind().to_string();
            let name = node.name().to_string();
            let retain_on_teardown = node.retain_on_teardown();
            let logical = node.is_logical();
            let tracked = state
                .get_resource(node.id())
                .map(|resource| resource.attributes.clone());
            let provisioner = Arc::clone(&self.provisioner);
            let runtime = runtime.clone();
            let tx = tx.clone();

            gate.on_settled(move |outcome: Outcome<(Vec<()>, Vec<serde_json::Value>)>| {
                let values = match outcome {
                    Ok((_, values)) => values,
                    Err(error) => {
                        tracing::debug!(resource = %id, "skipped: {}", error);
                        let _ = tx.send(NodeReport::Skipped {
                            id,
                            error: Arc::clone(&error),
                        });
                        resolver.settle(Err(error));
                        return;
                    }
                };

                if logical {
                    let _ = tx.send(NodeReport::Logical { id });
                    resolver.resolve(PropertyMap::new());
                    return;
                }

                if let Some(attributes) = tracked {
                    tracing::debug!(resource = %id, "already provisioned");
                    let _ = tx.send(NodeReport::Reused { id });
                    resolver.resolve(attributes);
                    return;
                }

                let request = CreateRequest {
                    id,
                    kind,
                    name,
                    inputs: keys.into_iter().zip(values).collect(),
                };
                runtime.spawn(async move {
                    tracing::info!(resource = %request.id, "creating {}", request.kind);
                    match provisioner.create(&request).await {
                        Ok(provisioned) => {
                            let _ = tx.send(NodeReport::Created {
                                id: request.id,
                                kind: request.kind,
                                handle: provisioned.handle,
                                outputs: provisioned.outputs.clone(),
                                retain_on_teardown,
                            });
                            resolver.resolve(provisioned.outputs);
                        }
                        Err(error) => {
                            tracing::error!(resource = %request.id, "create failed: {}", error);
                            let error = Arc::new(error);
                            let _ = tx.send(NodeReport::Failed {
                                id: request.id,
                                error: Arc::clone(&error),
                            });
                            resolver.settle(Err(error));
                        }
                    }
                });
            });
        }
        drop(tx);

        let mut reports: Vec<NodeReport> = Vec::with_capacity(order.len());
        while reports.len() < order.len() {
            match rx.recv().await {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        for node_ref in &order {
            let _ = graph.outputs_of(*node_ref).get().await;
        }

        let mut result = ApplyResult::new();
        for report in &reports {
            if let NodeReport::Failed { id, error } = report {
                result.add_failure(id.clone(), error.to_string());
            }
        }

        let mut by_id: HashMap<String, NodeReport> = reports
            .into_iter()
            .map(|report| (report.id().to_string(), report))
            .collect();
        for node_ref in &order {
            let Some(node) = graph.node(*node_ref) else {
                continue;
            };
            match by_id.remove(node.id()) {
                Some(NodeReport::Created {
                    id,
                    kind,
                    handle,
                    outputs,
                    retain_on_teardown,
                }) => {
                    state.set_resource(
                        id.clone(),
                        ResourceState::new(handle.clone(), kind)
                            .with_status(ResourceStatus::Running)
                            .with_attributes(outputs)
                            .with_retain_on_teardown(retain_on_teardown),
                    );
                    result.add_success(id, format!("created ({})", handle));
                }
                Some(NodeReport::Reused { id }) => {
                    result.add_success(id, "already provisioned".to_string());
                }
                Some(NodeReport::Skipped { id, .. }) => result.add_skipped(id),
                Some(NodeReport::Logical { .. }) | Some(NodeReport::Failed { .. }) => {}
                None => {
                    tracing::warn!(resource = %node.id(), "resource never settled");
                    result.add_skipped(node.id().to_string());
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "provisioning finished"
        );
        Ok(result)
    }

    /// Actions a teardown would take, in teardown order
    pub fn teardown_plan(&self, graph: &DependencyGraph, state: &GlobalState) -> Plan {
        let mut actions: Vec<Action> = graph
            .teardown_order()
            .steps
            .into_iter()
            .filter_map(|step| {
                let node = graph.node(step.node())?;
                let tracked = state.get_resource(node.id())?;
                let action = match step {
                    TeardownStep::Destroy(_) if !tracked.retain_on_teardown => {
                        Action::new(node.id(), ActionType::Delete, node.kind(), node.name())
                    }
                    _ => Action::new(node.id(), ActionType::Retain, node.kind(), node.name())
                        .with_description(format!(
                            "{} '{}' is dropped from tracking and left in place",
                            node.kind(),
                            node.name()
                        )),
                };
                Some(action.with_detail("handle", serde_json::json!(tracked.id)))
            })
            .collect();

        for (id, resource) in &state.resources {
            if graph.find(id).is_none() {
                actions.push(
                    Action::new(id.clone(), ActionType::NoOp, &resource.resource_type, id.clone())
                        .with_description(format!("{} is not part of this stack", id)),
                );
            }
        }
        Plan::new(actions)
    }

    /// Tears the graph down one resource at a time, halting at the first
    /// failed deletion. Resources left tracked stay in `state`.
    pub async fn teardown(
        &self,
        graph: &DependencyGraph,
        state: &mut GlobalState,
    ) -> Result<ApplyResult> {
        let start = Instant::now();
        let mut result = ApplyResult::new();
        let mut halted = false;

        for step in graph.teardown_order().steps {
            let Some(node) = graph.node(step.node()) else {
                continue;
            };
            let Some(tracked) = state.get_resource(node.id()).cloned() else {
                continue;
            };
            let id = node.id().to_string();

            if halted {
                result.add_skipped(id);
                continue;
            }

            let retain = matches!(step, TeardownStep::Forget(_)) || tracked.retain_on_teardown;
            if retain {
                tracing::warn!(resource = %id, handle = %tracked.id, "retained on teardown, not deleted");
                state.remove_resource(&id);
                result.add_success(id, format!("retained ({})", tracked.id));
                continue;
            }

            tracing::info!(resource = %id, handle = %tracked.id, "deleting {}", tracked.resource_type);
            match self.provisioner.destroy(&tracked).await {
                Ok(()) => {
                    state.remove_resource(&id);
                    result.add_success(id, format!("deleted ({})", tracked.id));
                }
                Err(error) => {
                    tracing::error!(resource = %id, "delete failed: {}", error);
                    if let Some(resource) = state.resources.get_mut(&id) {
                        resource.status = ResourceStatus::Error;
                    }
                    result.add_failure(id, error.to_string());
                    halted = true;
                }
            }
        }

        for id in state.resources.keys() {
            if graph.find(id).is_none() {
                tracing::warn!(resource = %id, "tracked resource is not part of this stack, left in place");
            }
        }
        if state.resources.is_empty() {
            state.outputs.clear();
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}
