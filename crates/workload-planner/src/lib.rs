//! Resolves a layered workload inventory into a deployment plan.
//!
//! An inventory describes cluster variables, a catalog of workload kinds (each with a `default` and optionally named
//! variants) and a set of hosts, which may override any workload kind. [`resolve`] deep-merges these layers for every
//! host and workload kind, validates the result and returns a [`DeploymentPlan`], or every [`Violation`] it found.
//!
//! ```
//! use workload_planner::{resolve, value::Value};
//!
//! let inventory: Value = serde_json::from_str(r#"{
//!     "workloads": {"redis_rpc_perf": {"default": {"resources": {"cpu": 1}}}},
//!     "hosts": {"10.0.0.1": {"env_uniq_id": 1, "workloads": {"redis_rpc_perf": {"count": 2}}}}
//! }"#).unwrap();
//!
//! let plan = resolve(&inventory).unwrap();
//! let instance = plan.hosts["10.0.0.1"].workload("redis_rpc_perf").unwrap();
//! assert_eq!(instance.count, 2);
//! assert_eq!(instance.env_namespace, "redis-rpc-perf-1");
//! ```
//!
//! [`Violation`]: validation::Violation
pub mod catalog;
pub mod config;
pub mod diff;
pub mod inventory;
pub mod overrides;
pub mod plan;
pub mod resources;
pub mod validation;
pub mod value;
pub mod workload;

pub use plan::{DeploymentPlan, resolve};
pub use validation::{Violation, Violations};
