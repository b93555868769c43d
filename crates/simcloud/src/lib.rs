//! # Simcloud
//!
//! A deterministic local cloud for the `declarative` engine.
//!
//! [`LocalCloud`] implements the provider capability interface for every
//! resource kind. Identifiers and addresses are derived from the stack name,
//! region and resource name, so repeated runs agree with each other. State can
//! live in memory (tests) or in a JSON file (the CLI), and failures can be
//! injected per resource with a [`FaultPlan`].
//!
//! ```ignore
//! use simcloud::{FaultPlan, LocalCloud};
//! use std::sync::Arc;
//!
//! let cloud = Arc::new(LocalCloud::open("demo.cloud.json")?.with_faults(FaultPlan::from_env()?));
//! let provider = cloud.registry();
//! ```

mod attributes;
pub mod cloud;
pub mod faults;

pub use cloud::{KindHandler, LocalCloud, StoreError};
pub use faults::{FAIL_ENV, FLAKY_ENV, FaultError, FaultPlan};
