//! In-process provisioner
//!
//! Issues deterministic handles and outputs without talking to any cloud.
//! Used for dry runs of the CLI and by tests, which inspect the call log to
//! check ordering.

use crate::error::{CloudError, Result};
use crate::graph::PropertyMap;
use crate::provider::{CreateRequest, Provisioned, Provisioner};
use crate::state::ResourceState;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Computes kind-specific outputs from a request and the issued handle
pub type OutputProfile = Arc<dyn Fn(&CreateRequest, &str) -> PropertyMap + Send + Sync>;

/// One entry of the call log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    /// A create call was issued
    Create { id: String, kind: String },
    /// A create call returned successfully
    Completed { id: String, handle: String },
    /// A destroy call was issued
    Destroy { handle: String, kind: String },
}

/// Deterministic [`Provisioner`] backed by memory
pub struct SimulatedProvisioner {
    profiles: HashMap<String, OutputProfile>,
    fail_on: HashSet<String>,
    fail_destroy_on: HashSet<String>,
    latency: Duration,
    next_handle: AtomicU64,
    calls: Mutex<Vec<ProvisionCall>>,
}

impl Default for SimulatedProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvisioner {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            fail_on: HashSet::new(),
            fail_destroy_on: HashSet::new(),
            latency: Duration::ZERO,
            next_handle: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Registers the outputs returned for a resource kind
    pub fn with_profile<F>(mut self, kind: impl Into<String>, profile: F) -> Self
    where
        F: Fn(&CreateRequest, &str) -> PropertyMap + Send + Sync + 'static,
    {
        self.profiles.insert(kind.into(), Arc::new(profile));
        self
    }

    /// Makes create calls fail for a resource kind or graph identifier
    pub fn fail_on(mut self, kind_or_id: impl Into<String>) -> Self {
        self.fail_on.insert(kind_or_id.into());
        self
    }

    /// Makes destroy calls fail for a resource kind or handle
    pub fn fail_destroy_on(mut self, kind_or_handle: impl Into<String>) -> Self {
        self.fail_destroy_on.insert(kind_or_handle.into());
        self
    }

    /// Delays every create call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls made so far, in the order they were observed
    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.log().clone()
    }

    /// Graph identifiers of issued create calls, in order
    pub fn created(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|call| match call {
                ProvisionCall::Create { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Handles of issued destroy calls, in order
    pub fn destroyed(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|call| match call {
                ProvisionCall::Destroy { handle, .. } => Some(handle.clone()),
                _ => None,
            })
            .collect()
    }

    fn log(&self) -> MutexGuard<'_, Vec<ProvisionCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ProvisionCall) {
        self.log().push(call);
    }

    fn issue_handle(&self, kind: &str) -> String {
        let n = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let short = kind.rsplit(':').next().unwrap_or(kind).to_lowercase();
        format!("sim-{}-{:04}", short, n)
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn create(&self, request: &CreateRequest) -> Result<Provisioned> {
        self.record(ProvisionCall::Create {
            id: request.id.clone(),
            kind: request.kind.clone(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.fail_on.contains(&request.kind) || self.fail_on.contains(&request.id) {
            return Err(CloudError::provisioning(
                &request.id,
                "simulated create failure",
            ));
        }

        let handle = self.issue_handle(&request.kind);
        let mut outputs = request.inputs.clone();
        outputs.insert("id".to_string(), serde_json::json!(handle));
        if let Some(profile) = self.profiles.get(&request.kind) {
            outputs.extend(profile(request, &handle));
        }

        tracing::debug!(resource = %request.id, handle = %handle, "simulated create");
        self.record(ProvisionCall::Completed {
            id: request.id.clone(),
            handle: handle.clone(),
        });

        Ok(Provisioned { handle, outputs })
    }

    async fn destroy(&self, resource: &ResourceState) -> Result<()> {
        self.record(ProvisionCall::Destroy {
            handle: resource.id.clone(),
            kind: resource.resource_type.clone(),
        });

        if self.fail_destroy_on.contains(&resource.resource_type)
            || self.fail_destroy_on.contains(&resource.id)
        {
            return Err(CloudError::teardown(
                &resource.id,
                "simulated destroy failure",
            ));
        }

        tracing::debug!(handle = %resource.id, "simulated destroy");
        Ok(())
    }
}
