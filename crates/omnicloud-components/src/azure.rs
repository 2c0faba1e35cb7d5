//! Backup origin on Azure: storage account static website

use crate::error::Result;
use omnicloud_cloud::normalize::{STORAGE_ACCOUNT_MAX_LEN, sanitize_account_name};
use omnicloud_cloud::{Component, ComponentBuilder, DeferredValue, DependencyGraph, NodeSpec};
use serde_json::json;

pub const AZURE_INFRA_TYPE: &str = "omnicloud:azure:AzureInfra";

pub const RESOURCE_GROUP: &str = "azure-native:resources:ResourceGroup";
pub const STORAGE_ACCOUNT: &str = "azure-native:storage:StorageAccount";
pub const STATIC_WEBSITE: &str = "azure-native:storage:StorageAccountStaticWebsite";
pub const BLOB_SERVICE_PROPERTIES: &str = "azure-native:storage:BlobServiceProperties";

/// Arguments of [`AzureInfra::new`]
#[derive(Debug, Clone, Copy)]
pub struct AzureArgs {
    /// Enables blob and container soft delete
    pub enable_backup: bool,
    pub backup_retention_days: i64,
}

/// Resource group, storage account, static website and optional soft delete
pub struct AzureInfra {
    component: Component,
    pub primary_endpoint: DeferredValue<String>,
}

impl AzureInfra {
    pub fn new(graph: &mut DependencyGraph, name: &str, args: AzureArgs) -> Result<Self> {
        let mut builder = ComponentBuilder::new(graph, AZURE_INFRA_TYPE, name)?;

        let group_name = format!("{}-rg", name);
        let rg = builder.child(
            NodeSpec::new(RESOURCE_GROUP, group_name.clone())
                .with_input("resource_group_name", group_name.as_str()),
        )?;
        let resource_group_name = builder.output::<String>(rg, "resource_group_name");

        let account = builder.child(
            NodeSpec::new(STORAGE_ACCOUNT, format!("{}sa", name))
                .with_dependency(rg)
                .with_input("resource_group_name", &resource_group_name)
                .with_input(
                    "account_name",
                    sanitize_account_name(name, STORAGE_ACCOUNT_MAX_LEN),
                )
                .with_input("sku", json!({ "name": "Standard_LRS" }))
                .with_input("kind", "StorageV2")
                .with_input("enable_https_traffic_only", true)
                .with_input("minimum_tls_version", "TLS1_2")
                .with_input("allow_blob_public_access", false),
        )?;
        let account_name = builder.output::<String>(account, "account_name");

        builder.child(
            NodeSpec::new(STATIC_WEBSITE, format!("{}-static", name))
                .with_dependency(account)
                .with_input("account_name", &account_name)
                .with_input("resource_group_name", &resource_group_name)
                .with_input("index_document", "index.html")
                .with_input("error404_document", "404.html"),
        )?;

        if args.enable_backup {
            let retention = json!({ "enabled": true, "days": args.backup_retention_days });
            builder.child(
                NodeSpec::new(BLOB_SERVICE_PROPERTIES, format!("{}-backup", name))
                    .with_dependency(account)
                    .with_input("account_name", &account_name)
                    .with_input("resource_group_name", &resource_group_name)
                    .with_input("blob_services_name", "default")
                    .with_input("delete_retention_policy", retention.clone())
                    .with_input("container_delete_retention_policy", retention),
            )?;
        }

        let primary_endpoint =
            account_name.map(|account| format!("https://{}.blob.core.windows.net/", account));

        let component = builder.seal([("primary_endpoint", primary_endpoint.to_json())]);

        Ok(Self {
            component,
            primary_endpoint,
        })
    }

    pub fn component(&self) -> &Component {
        &self.component
    }
}
