//! Cloud engine error types

use thiserror::Error;

/// Errors raised while building, provisioning or tearing down a stack
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Dependency cycle: {consumer} cannot depend on {producer}")]
    Cycle { consumer: String, producer: String },

    #[error("Parent of {0} is not registered in this graph")]
    UnknownParent(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Resource already registered: {0}")]
    DuplicateResource(String),

    #[error("Resource {resource} does not belong to component {component}")]
    ForeignResource { component: String, resource: String },

    #[error("Provisioning failed for {resource}: {message}")]
    Provisioning { resource: String, message: String },

    #[error("Teardown failed for {resource}: {message}")]
    Teardown { resource: String, message: String },

    #[error("Output '{key}' not found on {resource}")]
    MissingOutput { resource: String, key: String },

    #[error("Output transform failed: {0}")]
    Transform(anyhow::Error),

    #[error("Deferred value was dropped before it resolved")]
    Abandoned,

    #[error("Graph has already been provisioned")]
    AlreadyProvisioned,

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn provisioning(resource: impl Into<String>, message: impl ToString) -> Self {
        CloudError::Provisioning {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    pub fn teardown(resource: impl Into<String>, message: impl ToString) -> Self {
        CloudError::Teardown {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    /// Errors detected synchronously while the graph is being built.
    /// These always abort before any provisioning call is issued.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            CloudError::Cycle { .. }
                | CloudError::UnknownParent(_)
                | CloudError::UnknownResource(_)
                | CloudError::DuplicateResource(_)
                | CloudError::ForeignResource { .. }
        )
    }

    /// Errors reported by an external create/destroy call
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            CloudError::Provisioning { .. } | CloudError::Teardown { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cycle = CloudError::Cycle {
            consumer: "a".into(),
            producer: "b".into(),
        };
        assert!(cycle.is_construction());
        assert!(!cycle.is_provisioning());

        let failed = CloudError::provisioning("bucket", "409 conflict");
        assert!(failed.is_provisioning());
        assert!(!failed.is_construction());
        assert_eq!(
            failed.to_string(),
            "Provisioning failed for bucket: 409 conflict"
        );
    }
}
