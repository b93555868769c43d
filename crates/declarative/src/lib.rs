//! # Declarative
//!
//! Declarative provisioning of network and compute topologies.
//!
//! A stack is declared as a [`Topology`] of typed resources (networks,
//! subnets, security groups, instances, load balancers, auto-scaling groups,
//! IAM roles, gateway endpoints). The planner orders them by dependency, and
//! the applier converges a [`Provider`] to the declared state.
//!
//! ## Core Concepts
//!
//! - **Topology**: declared resources plus their dependency edges
//! - **Plan**: operations in dependency order, built by [`build_plan`]
//! - **Provider**: CRUD per resource kind, behind the [`Capability`] trait
//! - **Applier**: [`apply`] runs a plan in parallel waves, skipping the
//!   dependents of anything that fails
//! - **Outputs**: named attributes read from applied state by [`collect`]
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{
//!     ApplyOptions, NoProgress, StackContext, Topology, apply, build_plan,
//! };
//!
//! let mut topology = Topology::new(StackContext::new("demo", "us-east-1", "123456789012"));
//! topology.add_resource("vpc", network_spec, &[])?;
//! topology.add_resource("web", instance_spec, &[])?;
//! topology.validate()?;
//!
//! let plan = build_plan(&topology)?;
//! let report = apply(&plan, &provider, &ApplyOptions::default(), &mut NoProgress)?;
//! println!("{:?}", report.summary());
//! ```

pub mod cidr;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod outputs;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod topology;
pub mod types;

pub use cidr::{Cidr, CidrError};
pub use context::{NoProgress, ProgressCallback, StackContext};
pub use diff::{Change, DiffSummary, PlanDiff, PlannedChange, change_for, group_by_kind, reconcile};
pub use error::{ConfigError, CycleError, Error, ErrorCategory, ProviderError, Result};
pub use executor::{ApplyOptions, ApplyReport, ApplySummary, OperationReport, Outcome, apply};
pub use outputs::{CollectedOutputs, OutputSpec, collect};
pub use planner::{Action, Operation, Plan, build_destroy_plan, build_plan};
pub use provider::{Capability, Provider, ProviderRegistry};
pub use resource::Resource;
pub use retry::{Attempted, RetryConfig, with_retry};
pub use topology::Topology;
pub use types::{
    AppliedState, AutoScalingGroupConfig, Capacity, Fingerprint, GatewayEndpointConfig,
    IamRoleConfig, IngressRule, InstanceConfig, InstanceProfileConfig, LaunchTemplateConfig,
    Listener, ListenerProtocol, LoadBalancerConfig, NetworkConfig, ObservedResource, Protocol,
    Reference, ResourceId, ResourceKind, ResourceSpec, RuleSource, ScalingMetric, ScalingPolicy,
    SecurityGroupConfig, SubnetConfig, SubnetTier, TargetGroupConfig, UserData,
};
