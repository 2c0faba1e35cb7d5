//! Action types for provisioning and teardown reports

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents a planned action for one resource node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Graph identifier of the resource
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource type (e.g., "aws:s3:Bucket", "gcp:dns:RecordSet")
    pub resource_type: String,

    /// Logical resource name
    pub resource_name: String,

    /// Description of the action
    pub description: String,

    /// Additional details about the action
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        action_type: ActionType,
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_name = resource_name.into();
        let description = format!("{} {} '{}'", action_type, resource_type, resource_name);
        Self {
            id: id.into(),
            action_type,
            resource_type,
            resource_name,
            description,
            details: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Delete a resource
    Delete,
    /// Drop a resource from tracking without deleting it
    Retain,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Retain => write!(f, "retain"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions, in the order the failures were observed
    pub failed: Vec<ActionResult>,

    /// Actions never attempted because something they depend on failed
    pub skipped: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, message: String) {
        self.succeeded.push(ActionResult {
            action_id,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: String, error: String) {
        self.failed.push(ActionResult {
            action_id,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }

    pub fn add_skipped(&mut self, action_id: String) {
        self.skipped.push(action_id);
    }

    /// The failure observed first
    pub fn first_failure(&self) -> Option<&ActionResult> {
        self.failed.first()
    }
}

impl Default for ApplyResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// ID of the action
    pub action_id: String,

    /// Whether the action succeeded
    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Plan containing all actions to be applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// List of actions to perform
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            retain: self.actions_by_type(ActionType::Retain).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub delete: usize,
    pub retain: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to delete, {} to retain, {} unchanged",
            self.create, self.delete, self.retain, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_summary() {
        let plan = Plan::new(vec![
            Action::new("a", ActionType::Create, "aws:s3:Bucket", "site"),
            Action::new("b", ActionType::Retain, "aws:cloudfront:OriginAccessControl", "oac"),
            Action::new("c", ActionType::NoOp, "gcp:dns:ManagedZone", "zone"),
        ]);

        assert!(plan.has_changes);
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to delete, 1 to retain, 1 unchanged"
        );
        assert_eq!(plan.actions[0].description, "create aws:s3:Bucket 'site'");
    }

    #[test]
    fn test_noop_plan_has_no_changes() {
        let plan = Plan::new(vec![Action::new(
            "a",
            ActionType::NoOp,
            "aws:s3:Bucket",
            "site",
        )]);
        assert!(!plan.has_changes);
        assert!(!Plan::empty().has_changes);
    }

    #[test]
    fn test_apply_result_first_failure() {
        let mut result = ApplyResult::new();
        assert!(result.is_success());
        assert!(result.first_failure().is_none());

        result.add_success("a".into(), "created".into());
        result.add_failure("b".into(), "denied".into());
        result.add_failure("c".into(), "timeout".into());
        result.add_skipped("d".into());

        assert!(!result.is_success());
        assert_eq!(result.first_failure().unwrap().action_id, "b");
        assert_eq!(result.skipped, vec!["d".to_string()]);
    }
}
