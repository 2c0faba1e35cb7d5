//! Primary origin on AWS: S3 bucket served through CloudFront
//!
//! The bucket is never public. CloudFront reaches it through an origin access
//! control with signed requests, and the distribution redirects viewers to
//! HTTPS using the default CloudFront certificate.

use crate::error::Result;
use omnicloud_cloud::{
    Component, ComponentBuilder, DeferredValue, DependencyGraph, Input, NodeSpec,
};
use serde_json::json;

pub const AWS_INFRA_TYPE: &str = "omnicloud:aws:AwsInfra";

pub const BUCKET: &str = "aws:s3:Bucket";
pub const BUCKET_PUBLIC_ACCESS_BLOCK: &str = "aws:s3:BucketPublicAccessBlock";
pub const ORIGIN_ACCESS_CONTROL: &str = "aws:cloudfront:OriginAccessControl";
pub const DISTRIBUTION: &str = "aws:cloudfront:Distribution";

/// Flags applied when the public access block is enabled
pub const S3_BLOCK_PUBLIC_ACCESS: [(&str, bool); 4] = [
    ("block_public_acls", true),
    ("block_public_policy", true),
    ("ignore_public_acls", true),
    ("restrict_public_buckets", true),
];

const ORIGIN_ID: &str = "s3-origin";

/// Arguments of [`AwsInfra::new`]
#[derive(Debug, Clone)]
pub struct AwsArgs {
    pub bucket_name: Input<String>,
    pub enable_public_access_block: bool,
}

/// Bucket, optional public access block, origin access control and
/// distribution
pub struct AwsInfra {
    component: Component,
    pub cloudfront_domain_name: DeferredValue<String>,
    pub cloudfront_hosted_zone_id: DeferredValue<String>,
    pub cloudfront_url: DeferredValue<String>,
}

impl AwsInfra {
    pub fn new(graph: &mut DependencyGraph, name: &str, args: AwsArgs) -> Result<Self> {
        let mut builder = ComponentBuilder::new(graph, AWS_INFRA_TYPE, name)?;

        let bucket =
            builder.child(NodeSpec::new(BUCKET, name).with_input("bucket", args.bucket_name))?;

        if args.enable_public_access_block {
            let mut spec =
                NodeSpec::new(BUCKET_PUBLIC_ACCESS_BLOCK, format!("{}-block-public", name))
                    .with_dependency(bucket)
                    .with_input("bucket", builder.output::<String>(bucket, "id"));
            for (flag, enabled) in S3_BLOCK_PUBLIC_ACCESS {
                spec = spec.with_input(flag, enabled);
            }
            builder.child(spec)?;
        }

        // Deleting the OAC right after the distribution is rejected as still
        // in use, so teardown only drops it from tracking.
        let oac = builder.child(
            NodeSpec::new(ORIGIN_ACCESS_CONTROL, format!("{}-oac", name))
                .with_input("origin_access_control_origin_type", "s3")
                .with_input("signing_behavior", "always")
                .with_input("signing_protocol", "sigv4")
                .retain_on_teardown(),
        )?;

        let cdn = builder.child(
            NodeSpec::new(DISTRIBUTION, format!("{}-cdn", name))
                .with_dependency(oac)
                .with_dependency(bucket)
                .with_input("enabled", true)
                .with_input(
                    "origin_domain_name",
                    builder.output::<String>(bucket, "bucket_regional_domain_name"),
                )
                .with_input("origin_id", ORIGIN_ID)
                .with_input(
                    "origin_access_control_id",
                    builder.output::<String>(oac, "id"),
                )
                .with_input(
                    "default_cache_behavior",
                    json!({
                        "target_origin_id": ORIGIN_ID,
                        "viewer_protocol_policy": "redirect-to-https",
                        "allowed_methods": ["GET", "HEAD", "OPTIONS"],
                        "cached_methods": ["GET", "HEAD"],
                        "compress": true,
                        "forwarded_values": {
                            "query_string": false,
                            "cookies": { "forward": "none" },
                        },
                    }),
                )
                .with_input(
                    "restrictions",
                    json!({ "geo_restriction": { "restriction_type": "none" } }),
                )
                .with_input(
                    "viewer_certificate",
                    json!({ "cloudfront_default_certificate": true }),
                ),
        )?;

        let cloudfront_domain_name = builder.output::<String>(cdn, "domain_name");
        let cloudfront_hosted_zone_id = builder.output::<String>(cdn, "hosted_zone_id");
        let cloudfront_url = cloudfront_domain_name.map(|domain| format!("https://{}", domain));

        let component = builder.seal([
            ("cloudfront_domain_name", cloudfront_domain_name.to_json()),
            ("cloudfront_hosted_zone_id", cloudfront_hosted_zone_id.to_json()),
            ("cloudfront_url", cloudfront_url.to_json()),
        ]);

        Ok(Self {
            component,
            cloudfront_domain_name,
            cloudfront_hosted_zone_id,
            cloudfront_url,
        })
    }

    pub fn component(&self) -> &Component {
        &self.component
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(enable_public_access_block: bool) -> AwsArgs {
        AwsArgs {
            bucket_name: Input::Literal("site-dev".to_string()),
            enable_public_access_block,
        }
    }

    fn kinds(graph: &DependencyGraph) -> Vec<String> {
        graph
            .creation_order()
            .into_iter()
            .map(|node| graph.node(node).unwrap().kind().to_string())
            .collect()
    }

    #[test]
    fn test_resources_and_order() {
        let mut graph = DependencyGraph::new();
        let aws = AwsInfra::new(&mut graph, "aws-site-dev", args(true)).unwrap();

        assert_eq!(
            kinds(&graph),
            vec![
                AWS_INFRA_TYPE,
                BUCKET,
                BUCKET_PUBLIC_ACCESS_BLOCK,
                ORIGIN_ACCESS_CONTROL,
                DISTRIBUTION,
            ]
        );
        assert_eq!(aws.component().name(), "aws-site-dev");
        assert!(aws.cloudfront_url.is_pending());

        let block = graph
            .find("omnicloud:aws:AwsInfra::aws-site-dev$aws:s3:BucketPublicAccessBlock::aws-site-dev-block-public")
            .unwrap();
        let inputs = graph.node(block).unwrap().inputs();
        for (flag, _) in S3_BLOCK_PUBLIC_ACCESS {
            assert_eq!(inputs[flag].peek().unwrap().unwrap(), json!(true));
        }
    }

    #[test]
    fn test_public_access_block_is_optional() {
        let mut graph = DependencyGraph::new();
        AwsInfra::new(&mut graph, "aws-site-dev", args(false)).unwrap();
        assert!(!kinds(&graph).iter().any(|k| k == BUCKET_PUBLIC_ACCESS_BLOCK));
    }

    #[test]
    fn test_only_oac_is_retained() {
        let mut graph = DependencyGraph::new();
        AwsInfra::new(&mut graph, "aws-site-dev", args(true)).unwrap();

        let retained: Vec<String> = graph
            .teardown_order()
            .retained()
            .into_iter()
            .map(|node| graph.node(node).unwrap().kind().to_string())
            .collect();
        assert_eq!(retained, vec![ORIGIN_ACCESS_CONTROL]);

        // distribution goes first, bucket last
        let deletions = graph.teardown_order().deletions();
        assert_eq!(graph.node(deletions[0]).unwrap().kind(), DISTRIBUTION);
        assert_eq!(graph.node(*deletions.last().unwrap()).unwrap().kind(), BUCKET);
    }

    #[test]
    fn test_duplicate_component_name_rejected() {
        let mut graph = DependencyGraph::new();
        AwsInfra::new(&mut graph, "aws-site-dev", args(true)).unwrap();
        let err = AwsInfra::new(&mut graph, "aws-site-dev", args(true)).err().unwrap();
        assert!(err.cloud_error().unwrap().is_construction());
    }
}
