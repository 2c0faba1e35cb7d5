//! DNS failover on GCP Cloud DNS
//!
//! A managed zone for the domain with a `www` CNAME pointing at the primary
//! origin and an optional `backup` CNAME pointing at the backup origin. The
//! backup record gets a short TTL so switching over propagates quickly.
//! Once created, the domain has to be delegated to the zone's name servers
//! at the registrar.

use crate::error::Result;
use omnicloud_cloud::normalize::{ensure_trailing_dot, fqdn, record_data};
use omnicloud_cloud::{
    Component, ComponentBuilder, DeferredValue, DependencyGraph, Input, NodeRef, NodeSpec,
};
use serde::{Deserialize, Serialize};

pub const GCP_INFRA_TYPE: &str = "omnicloud:gcp:GcpInfra";

pub const MANAGED_ZONE: &str = "gcp:dns:ManagedZone";
pub const RECORD_SET: &str = "gcp:dns:RecordSet";

const CNAME: &str = "CNAME";

/// A DNS record as submitted to Cloud DNS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: i64,
    pub rrdatas: Vec<String>,
}

impl RecordDefinition {
    /// CNAME `label.domain.` pointing at `target`
    pub fn cname(domain: &str, label: &str, target: &str, ttl: i64) -> Self {
        Self {
            name: fqdn(domain, label),
            record_type: CNAME.to_string(),
            ttl,
            rrdatas: record_data(target),
        }
    }
}

/// Arguments of [`GcpInfra::new`]
#[derive(Debug, Clone)]
pub struct GcpArgs {
    pub domain_name: String,
    /// Target of `www.<domain>`
    pub primary_target: Input<String>,
    /// Target of `backup.<domain>`; no backup record when absent
    pub backup_target: Option<Input<String>>,
    pub primary_ttl: i64,
    pub backup_ttl: i64,
}

/// Managed zone plus primary and optional backup CNAME records
pub struct GcpInfra {
    component: Component,
    pub name_servers: DeferredValue<Vec<String>>,
    pub primary_record: DeferredValue<RecordDefinition>,
    pub backup_record: Option<DeferredValue<RecordDefinition>>,
}

fn record_node(
    builder: &mut ComponentBuilder<'_>,
    zone: NodeRef,
    zone_name: &DeferredValue<String>,
    name: String,
    record: &DeferredValue<RecordDefinition>,
) -> Result<NodeRef> {
    Ok(builder.child(
        NodeSpec::new(RECORD_SET, name)
            .with_dependency(zone)
            .with_input("managed_zone", zone_name)
            .with_input("name", record.map(|r| r.name))
            .with_input("type", record.map(|r| r.record_type))
            .with_input("ttl", record.map(|r| r.ttl))
            .with_input("rrdatas", record.map(|r| r.rrdatas)),
    )?)
}

impl GcpInfra {
    pub fn new(graph: &mut DependencyGraph, name: &str, args: GcpArgs) -> Result<Self> {
        let mut builder = ComponentBuilder::new(graph, GCP_INFRA_TYPE, name)?;

        let zone_name = format!("{}-zone", name);
        let zone = builder.child(
            NodeSpec::new(MANAGED_ZONE, zone_name.clone())
                .with_input("name", zone_name.as_str())
                .with_input("dns_name", ensure_trailing_dot(&args.domain_name))
                .with_input("description", format!("Managed zone for {} (failover)", name)),
        )?;
        let managed_zone = builder.output::<String>(zone, "name");

        let domain = args.domain_name.clone();
        let primary_ttl = args.primary_ttl;
        let primary_record = args.primary_target.into_deferred().map(move |target| {
            RecordDefinition::cname(&domain, "www", &target, primary_ttl)
        });
        record_node(
            &mut builder,
            zone,
            &managed_zone,
            format!("{}-www", name),
            &primary_record,
        )?;

        let backup_record = match args.backup_target {
            Some(target) => {
                let domain = args.domain_name.clone();
                let backup_ttl = args.backup_ttl;
                let record = target.into_deferred().map(move |target| {
                    RecordDefinition::cname(&domain, "backup", &target, backup_ttl)
                });
                record_node(
                    &mut builder,
                    zone,
                    &managed_zone,
                    format!("{}-backup", name),
                    &record,
                )?;
                Some(record)
            }
            None => None,
        };

        let name_servers = builder.output::<Vec<String>>(zone, "name_servers");

        let mut outputs = vec![
            ("name_servers", name_servers.to_json()),
            ("primary_record", primary_record.to_json()),
        ];
        if let Some(record) = &backup_record {
            outputs.push(("backup_record", record.to_json()));
        }
        let component = builder.seal(outputs);

        Ok(Self {
            component,
            name_servers,
            primary_record,
            backup_record,
        })
    }

    pub fn component(&self) -> &Component {
        &self.component
    }
}
