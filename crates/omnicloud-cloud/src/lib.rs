//! Omnicloud core
//!
//! Deferred values, the resource dependency graph and the engine that
//! provisions and tears down a graph through a [`Provisioner`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  Omnicloud CLI                   │
//! │                 (omni up/down)                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │             omnicloud-components                 │
//! │     AwsInfra / AzureInfra / GcpInfra / Stack     │
//! └─────────────────┬───────────────────────────────┘
//!                   │ registers nodes, threads
//!                   │ DeferredValue outputs
//! ┌─────────────────▼───────────────────────────────┐
//! │               omnicloud-cloud                    │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │ Deferred     │  │ DependencyGraph          │ │
//! │  │ Values       │  │ (creation / teardown)    │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Engine     │  │  State Mgmt  │            │
//! │  └──────┬───────┘  └──────────────┘            │
//! └─────────┼───────────────────────────────────────┘
//!           │
//! ┌─────────▼───────────────────────────────────────┐
//! │         trait Provisioner { create, destroy }    │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod component;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod graph;
pub mod normalize;
pub mod provider;
pub mod simulated;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use component::{Component, ComponentBuilder, ComponentState};
pub use deferred::{DeferredValue, Input, Outcome, Resolver};
pub use engine::Engine;
pub use error::{CloudError, Result};
pub use graph::{
    DependencyGraph, EdgeKind, NodeRef, NodeSpec, PropertyMap, ResourceNode, TeardownPlan,
    TeardownStep,
};
pub use provider::{CreateRequest, Provisioned, Provisioner};
pub use simulated::{OutputProfile, ProvisionCall, SimulatedProvisioner};
pub use state::{GlobalState, ResourceState, ResourceStatus, StateLock, StateManager};
