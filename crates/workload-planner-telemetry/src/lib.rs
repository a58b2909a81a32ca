//! Logging primitives shared by the workload planner binaries.
//!
//! Log events go to the console (stderr, so that plans written to stdout stay parseable) and optionally to rolling
//! JSON log files.
pub mod tracing;

pub use tracing::Tracing;
