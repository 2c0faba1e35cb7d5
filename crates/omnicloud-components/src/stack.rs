//! The multi-cloud stack
//!
//! AWS serves as the primary origin and Azure as the backup origin. GCP
//! Cloud DNS points `www` at the CloudFront domain and `backup` at the host
//! of the Azure endpoint, both known only after provisioning.

use crate::aws::{AwsArgs, AwsInfra};
use crate::azure::{AzureArgs, AzureInfra};
use crate::error::{ComponentError, Result};
use crate::gcp::{GcpArgs, GcpInfra};
use omnicloud_cloud::normalize::{component_name, extract_host};
use omnicloud_cloud::{Component, DeferredValue, DependencyGraph, Input};
use omnicloud_config::StackConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every component and its outputs, wired together
pub struct Stack {
    pub aws: AwsInfra,
    pub azure: AzureInfra,
    pub gcp: GcpInfra,
    /// Host part of the Azure endpoint, used as the backup CNAME target
    pub backup_host: DeferredValue<String>,
}

impl Stack {
    /// Registers every component into `graph`. Nothing is provisioned.
    pub fn build(graph: &mut DependencyGraph, config: &StackConfig) -> Result<Self> {
        let name = |prefix: &str| component_name(prefix, &config.project_name, &config.environment);

        let aws = AwsInfra::new(
            graph,
            &name("aws"),
            AwsArgs {
                bucket_name: Input::Literal(config.aws_bucket_name.clone()),
                enable_public_access_block: config.enable_public_access_block,
            },
        )?;

        let azure = AzureInfra::new(
            graph,
            &name("azure"),
            AzureArgs {
                enable_backup: config.enable_azure_backup,
                backup_retention_days: config.backup_retention_days,
            },
        )?;

        let backup_host = azure.primary_endpoint.map(|url| extract_host(&url));

        let gcp = GcpInfra::new(
            graph,
            &name("gcp"),
            GcpArgs {
                domain_name: config.domain_name.clone(),
                primary_target: Input::from(&aws.cloudfront_domain_name),
                backup_target: Some(Input::from(&backup_host)),
                primary_ttl: config.gcp_primary_ttl,
                backup_ttl: config.gcp_backup_ttl,
            },
        )?;

        tracing::debug!(resources = graph.len(), "stack built");

        Ok(Self {
            aws,
            azure,
            gcp,
            backup_host,
        })
    }

    pub fn components(&self) -> [&Component; 3] {
        [
            self.aws.component(),
            self.azure.component(),
            self.gcp.component(),
        ]
    }

    /// Exported outputs, in export order
    pub fn outputs(&self) -> Vec<(&'static str, DeferredValue<serde_json::Value>)> {
        vec![
            ("aws_cloudfront_url", self.aws.cloudfront_url.to_json()),
            (
                "aws_cloudfront_domain",
                self.aws.cloudfront_domain_name.to_json(),
            ),
            (
                "azure_primary_endpoint",
                self.azure.primary_endpoint.to_json(),
            ),
            ("gcp_name_servers", self.gcp.name_servers.to_json()),
        ]
    }
}

/// Resolved stack outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackOutputs(BTreeMap<String, serde_json::Value>);

impl StackOutputs {
    /// Waits for every output. Fails with the first failed output in export
    /// order.
    pub async fn collect<I, K>(outputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, DeferredValue<serde_json::Value>)>,
        K: Into<String>,
    {
        let mut values = BTreeMap::new();
        for (key, value) in outputs {
            let key = key.into();
            match value.get().await {
                Ok(resolved) => {
                    values.insert(key, resolved);
                }
                Err(error) => return Err(ComponentError::Output { output: key, error }),
            }
        }
        Ok(Self(values))
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, serde_json::Value> {
        self.0
    }
}

impl From<BTreeMap<String, serde_json::Value>> for StackOutputs {
    fn from(values: BTreeMap<String, serde_json::Value>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::DISTRIBUTION;
    use crate::azure::STORAGE_ACCOUNT;
    use crate::gcp::RECORD_SET;
    use crate::simulated::simulated_provisioner;
    use omnicloud_cloud::{ComponentState, Engine, GlobalState, PropertyMap};
    use omnicloud_config::ConfigValue;
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> StackConfig {
        let raw: BTreeMap<String, ConfigValue> = [
            ("omnicloud:domain_name", ConfigValue::from("example.com")),
            ("omnicloud:environment", "dev".into()),
            ("omnicloud:aws_bucket_name", "site-dev-bucket".into()),
            ("omnicloud:enable_azure_backup", true.into()),
            ("omnicloud:project_name", "site".into()),
            ("omnicloud:enable_public_access_block", true.into()),
            ("omnicloud:backup_retention_days", 7.into()),
            ("omnicloud:gcp_primary_ttl", 300.into()),
            ("omnicloud:gcp_backup_ttl", 60.into()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        StackConfig::from_map(&raw).unwrap()
    }

    #[test]
    fn test_build_registers_every_component() {
        let mut graph = DependencyGraph::new();
        let stack = Stack::build(&mut graph, &config()).unwrap();

        let names: Vec<&str> = stack.components().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["aws-site-dev", "azure-site-dev", "gcp-site-dev"]);
        assert!(
            stack
                .components()
                .iter()
                .all(|c| c.state() == ComponentState::Sealed)
        );

        // 3 roots, 4 aws, 4 azure, zone + 2 records
        assert_eq!(graph.len(), 14);
        let keys: Vec<&str> = stack.outputs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "aws_cloudfront_url",
                "aws_cloudfront_domain",
                "azure_primary_endpoint",
                "gcp_name_servers",
            ]
        );
    }

    #[tokio::test]
    async fn test_end_to_end_failover_records() {
        let provisioner = simulated_provisioner()
            .with_profile(DISTRIBUTION, |_, _| {
                PropertyMap::from([
                    ("domain_name".to_string(), json!("d123.cdn.example.net")),
                    ("hosted_zone_id".to_string(), json!("Z2FDTNDATAQYW2")),
                ])
            })
            .with_profile(STORAGE_ACCOUNT, |_, _| {
                PropertyMap::from([("account_name".to_string(), json!("acctsa"))])
            });
        let engine = Engine::new(Arc::new(provisioner));

        let mut graph = DependencyGraph::new();
        let stack = Stack::build(&mut graph, &config()).unwrap();
        let mut state = GlobalState::new();

        let result = engine.provision(&mut graph, &mut state).await.unwrap();
        assert!(result.is_success(), "{:?}", result.failed);

        assert_eq!(stack.backup_host.get().await.unwrap(), "acctsa.blob.core.windows.net");

        let primary = stack.gcp.primary_record.get().await.unwrap();
        assert_eq!(primary.name, "www.example.com.");
        assert_eq!(primary.rrdatas, vec!["d123.cdn.example.net."]);
        let backup = stack.gcp.backup_record.as_ref().unwrap().get().await.unwrap();
        assert_eq!(backup.name, "backup.example.com.");
        assert_eq!(backup.rrdatas, vec!["acctsa.blob.core.windows.net."]);

        // record sets were created with the resolved data
        let records: Vec<_> = state.resources_of_kind(RECORD_SET);
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|(_, r)| {
            r.get_attribute::<Vec<String>>("rrdatas")
                == Some(vec!["acctsa.blob.core.windows.net.".to_string()])
        }));

        let outputs = StackOutputs::collect(stack.outputs()).await.unwrap();
        assert_eq!(
            outputs.get("aws_cloudfront_url"),
            Some(&json!("https://d123.cdn.example.net"))
        );
        assert_eq!(
            outputs.get("azure_primary_endpoint"),
            Some(&json!("https://acctsa.blob.core.windows.net/"))
        );
        assert_eq!(outputs.len(), 4);

        for component in stack.components() {
            component.wait().await.unwrap();
            assert_eq!(component.state(), ComponentState::Resolved);
        }
    }

    #[tokio::test]
    async fn test_failed_origin_stops_dns_record() {
        let provisioner = simulated_provisioner().fail_on(DISTRIBUTION);
        let engine = Engine::new(Arc::new(provisioner));

        let mut graph = DependencyGraph::new();
        let stack = Stack::build(&mut graph, &config()).unwrap();
        let mut state = GlobalState::new();

        let result = engine.provision(&mut graph, &mut state).await.unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.skipped.len(), 1);

        // the backup record does not depend on AWS and is still created
        assert_eq!(state.resources_of_kind(RECORD_SET).len(), 1);

        let err = StackOutputs::collect(stack.outputs()).await.unwrap_err();
        match err {
            ComponentError::Output { output, error } => {
                assert_eq!(output, "aws_cloudfront_url");
                assert!(error.is_provisioning());
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(stack.aws.component().state(), ComponentState::Failed);
        assert_eq!(stack.azure.component().state(), ComponentState::Resolved);
    }
}
