//! Omnicloud components
//!
//! The three provider components of the stack and the orchestrator wiring
//! them together:
//!
//! - **AwsInfra**: S3 bucket + CloudFront; exposes `cloudfront_domain_name`
//!   as the primary DNS target.
//! - **AzureInfra**: storage account static website; exposes
//!   `primary_endpoint`, whose host is the backup DNS target.
//! - **GcpInfra**: Cloud DNS zone with `www` and `backup` CNAME records.
//!
//! # Example
//!
//! ```ignore
//! use omnicloud_cloud::{DependencyGraph, Engine, GlobalState};
//! use omnicloud_components::{Stack, StackOutputs, simulated_provisioner};
//! use std::sync::Arc;
//!
//! let config = omnicloud_config::load_stack_config(root, "dev")?;
//! let mut graph = DependencyGraph::new();
//! let stack = Stack::build(&mut graph, &config)?;
//!
//! let engine = Engine::new(Arc::new(simulated_provisioner()));
//! let mut state = GlobalState::new();
//! engine.provision(&mut graph, &mut state).await?;
//!
//! let outputs = StackOutputs::collect(stack.outputs()).await?;
//! ```

pub mod aws;
pub mod azure;
pub mod error;
pub mod gcp;
pub mod simulated;
pub mod stack;

pub use aws::{AwsArgs, AwsInfra, S3_BLOCK_PUBLIC_ACCESS};
pub use azure::{AzureArgs, AzureInfra};
pub use error::{ComponentError, Result};
pub use gcp::{GcpArgs, GcpInfra, RecordDefinition};
pub use simulated::simulated_provisioner;
pub use stack::{Stack, StackOutputs};
