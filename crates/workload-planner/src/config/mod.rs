//! Layered, typed workload configuration.
//!
//! A workload kind is configured in several places, and every place only says part of the story:
//!
//! ```yaml
//! vars:
//!   default_resources: {cpu: 1, ram: 1}   # every workload, every host
//!   workload_defaults: {count: 1}
//! workloads:
//!   redis_rpc_perf:
//!     default: {slo: 1000}                # every host running the kind
//!     big: {resources: {cpu: 4}}          # hosts that select the `big` variant
//! hosts:
//!   10.0.0.1:
//!     env_uniq_id: 1
//!     workloads:
//!       redis_rpc_perf: {variant: big, count: 2}   # this host only
//! ```
//!
//! Only the leaves (one workload kind on one host) are ever realized, and each leaf inherits everything above it
//! unless it says otherwise. Validation only makes sense once the leaf is fully assembled.
//!
//! The system is split into two halves, mirroring that flow:
//!
//! - [`fragment`]: `#[derive(Fragment)]` generates a `{Name}Fragment` mirror type where every field is partial
//!   ([`Option`] for [`Atomic`] leaves, the nested fragment for composite fields). [`validate`] turns a fully merged
//!   fragment back into the validated type, reporting the path of the first offending field.
//! - [`merge`]: `#[derive(Merge)]` merges fragments field by field, deeply. The receiver holds the overrides, the argument
//!   the defaults. Defaults are just another (lower) layer.
//!
//! Usage rules:
//! - Apply `#[derive(Fragment)] #[fragment_attrs(derive(Merge))]`, never `#[derive(Fragment, Merge)]`.
//! - Implement [`Atomic`] for leaves that must be replaced as a whole.
//! - Validate as soon as the last layer has been merged; code outside of resolution never reads fragments.

pub mod fragment;
pub mod merge;

#[cfg(doc)]
use fragment::{FromFragment, validate};
#[cfg(doc)]
use merge::{Atomic, Merge};
