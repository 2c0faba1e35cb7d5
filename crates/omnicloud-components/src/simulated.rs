//! Simulated outputs for the resource kinds of this stack

use crate::aws::{BUCKET, DISTRIBUTION};
use crate::azure::{RESOURCE_GROUP, STORAGE_ACCOUNT};
use crate::gcp::MANAGED_ZONE;
use omnicloud_cloud::{CreateRequest, PropertyMap, SimulatedProvisioner};
use serde_json::json;

/// Hosted zone id shared by every CloudFront distribution
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

const SIMULATED_REGION: &str = "us-east-1";
const SIMULATED_LOCATION: &str = "eastus";

/// FNV-1a, stable across runs and platforms
fn stable_hash(value: &str) -> u64 {
    value.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn input(request: &CreateRequest, key: &str) -> String {
    request
        .get_input::<String>(key)
        .unwrap_or_else(|| request.name.clone())
}

/// Provisioner returning realistic looking outputs for every kind the
/// stack registers
pub fn simulated_provisioner() -> SimulatedProvisioner {
    SimulatedProvisioner::new()
        .with_profile(BUCKET, |request, _| {
            let bucket = input(request, "bucket");
            PropertyMap::from([
                ("arn".to_string(), json!(format!("arn:aws:s3:::{}", bucket))),
                (
                    "bucket_regional_domain_name".to_string(),
                    json!(format!("{}.s3.{}.amazonaws.com", bucket, SIMULATED_REGION)),
                ),
            ])
        })
        .with_profile(DISTRIBUTION, |request, _| {
            let domain = format!("d{:013x}.cloudfront.net", stable_hash(&request.id) >> 12);
            PropertyMap::from([
                ("domain_name".to_string(), json!(domain)),
                (
                    "hosted_zone_id".to_string(),
                    json!(CLOUDFRONT_HOSTED_ZONE_ID),
                ),
            ])
        })
        .with_profile(RESOURCE_GROUP, |_, _| {
            PropertyMap::from([("location".to_string(), json!(SIMULATED_LOCATION))])
        })
        .with_profile(STORAGE_ACCOUNT, |request, _| {
            let account = input(request, "account_name");
            PropertyMap::from([(
                "primary_endpoints".to_string(),
                json!({
                    "blob": format!("https://{}.blob.core.windows.net/", account),
                    "web": format!("https://{}.z13.web.core.windows.net/", account),
                }),
            )])
        })
        .with_profile(MANAGED_ZONE, |request, _| {
            let shard = stable_hash(&request.id) % 4 + 1;
            let name_servers: Vec<String> = ["a", "b", "c", "d"]
                .iter()
                .map(|letter| format!("ns-cloud-{}{}.googledomains.com.", letter, shard))
                .collect();
            PropertyMap::from([("name_servers".to_string(), json!(name_servers))])
        })
}
