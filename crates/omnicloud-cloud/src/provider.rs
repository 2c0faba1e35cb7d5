//! Provisioner trait definition

use crate::error::Result;
use crate::graph::PropertyMap;
use crate::state::ResourceState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Boundary to the systems that actually create and delete cloud resources.
///
/// `create` is invoked once per resource node, only after every input of that
/// node has resolved. The engine never retries; a provisioner may be retried
/// by the caller, so implementations should tolerate re-creation of an
/// existing resource.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the provisioner name (e.g., "simulated")
    fn name(&self) -> &str;

    /// Create a resource from its resolved inputs
    async fn create(&self, request: &CreateRequest) -> Result<Provisioned>;

    /// Delete a tracked resource. Never called for retain-on-teardown nodes.
    async fn destroy(&self, resource: &ResourceState) -> Result<()>;
}

/// A resource to create, with every input resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Graph identifier of the resource
    pub id: String,

    /// Provider resource type (e.g., "aws:s3:Bucket")
    pub kind: String,

    /// Logical name given by the component
    pub name: String,

    /// Resolved inputs
    pub inputs: PropertyMap,
}

impl CreateRequest {
    /// Get an input value as a specific type
    pub fn get_input<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inputs
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Result of a successful create call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provisioned {
    /// Provider-side handle used for deletion
    pub handle: String,

    /// Outputs exposed to dependent resources
    pub outputs: PropertyMap,
}

impl Provisioned {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            outputs: PropertyMap::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_input() {
        let request = CreateRequest {
            id: "aws:s3:Bucket::site".to_string(),
            kind: "aws:s3:Bucket".to_string(),
            name: "site".to_string(),
            inputs: PropertyMap::from([
                ("bucket".to_string(), serde_json::json!("omnicloud-dev-site")),
                ("force_destroy".to_string(), serde_json::json!(true)),
            ]),
        };

        assert_eq!(
            request.get_input::<String>("bucket").as_deref(),
            Some("omnicloud-dev-site")
        );
        assert_eq!(request.get_input::<bool>("force_destroy"), Some(true));
        assert_eq!(request.get_input::<u32>("bucket"), None);
        assert_eq!(request.get_input::<String>("region"), None);
    }

    #[test]
    fn test_provisioned_builder() {
        let provisioned = Provisioned::new("E2ABCDEF")
            .with_output("domain_name", serde_json::json!("d123.cloudfront.net"));
        assert_eq!(provisioned.handle, "E2ABCDEF");
        assert_eq!(
            provisioned.outputs["domain_name"],
            serde_json::json!("d123.cloudfront.net")
        );
    }
}
