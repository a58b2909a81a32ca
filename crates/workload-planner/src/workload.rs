//! Typed workload specifications and the partial layers they are assembled from.
//!
//! A layer (built-in defaults, `workload_defaults`, a variant or a host override) is a mapping with a few well-known
//! keys (`count`, `slo`, `communication_port`, `resources`). Every other key is either a sub-component block (if it
//! is a mapping) or a free parameter passed through to the executor (scalars and sequences).
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::{
        fragment::Fragment,
        merge::{self, Merge},
    },
    resources::{ResourceSpec, ResourceSpecFragment},
    validation::Report,
    value::{Mapping, Scalar, Value},
};

/// Instances of a workload kind started per host unless a layer says otherwise
pub const DEFAULT_COUNT: u32 = 1;

/// Key selecting a named variant, only allowed in host overrides
pub const VARIANT_KEY: &str = "variant";

const COUNT_KEY: &str = "count";
const SLO_KEY: &str = "slo";
const COMMUNICATION_PORT_KEY: &str = "communication_port";
const RESOURCES_KEY: &str = "resources";
const IMAGE_NAME_KEY: &str = "image_name";
const IMAGE_TAG_KEY: &str = "image_tag";
const REPLICA_COUNT_KEY: &str = "replica_count";

/// The fully merged specification of one workload kind.
#[derive(Clone, Debug, Fragment, PartialEq, Serialize, Deserialize)]
#[fragment(path_overrides(fragment = "crate::config::fragment"))]
#[fragment_attrs(
    derive(Clone, Debug, Default, Merge, PartialEq),
    merge(path_overrides(merge = "crate::config::merge"))
)]
pub struct WorkloadSpec {
    /// Number of instances, `0` disables the kind
    pub count: u32,
    /// Service level objective, for example a latency bound
    pub slo: Option<f64>,
    pub communication_port: Option<u16>,
    #[serde(default, skip_serializing_if = "ResourceSpec::is_empty")]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, ComponentSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

/// A sub-component of a workload, such as the server or the load generator of a benchmark.
#[derive(Clone, Debug, Fragment, PartialEq, Serialize, Deserialize)]
#[fragment(path_overrides(fragment = "crate::config::fragment"))]
#[fragment_attrs(
    derive(Clone, Debug, Default, Merge, PartialEq),
    merge(path_overrides(merge = "crate::config::merge"))
)]
pub struct ComponentSpec {
    #[serde(default, skip_serializing_if = "ResourceSpec::is_empty")]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_count: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

/// The lowest layer of every workload kind.
pub fn built_in_defaults() -> WorkloadSpecFragment {
    WorkloadSpecFragment {
        count: Some(DEFAULT_COUNT),
        ..WorkloadSpecFragment::default()
    }
}

impl WorkloadSpecFragment {
    /// Reads one layer from the tree.
    ///
    /// Problems are recorded in `report` and the offending keys are skipped, so that a single pass finds every
    /// problem of the layer. [`VARIANT_KEY`] must be removed by the caller if it is allowed at all.
    pub fn from_mapping(mapping: &Mapping, report: &mut Report) -> Self {
        let mut fragment = Self::default();
        for (key, value) in mapping {
            if value.is_null() {
                continue;
            }
            let mut report = report.field(key);
            match key.as_str() {
                COUNT_KEY => fragment.count = read_count(value, &mut report),
                SLO_KEY => fragment.slo = read_slo(value, &mut report),
                COMMUNICATION_PORT_KEY => fragment.communication_port = read_port(value, &mut report),
                RESOURCES_KEY => {
                    fragment.resources = ResourceSpecFragment::from_value(value, &mut report);
                }
                VARIANT_KEY => report.invalid_field("a variant can only be selected by a host override"),
                _ => match value {
                    Value::Mapping(component) => {
                        fragment.components.insert(
                            key.clone(),
                            ComponentSpecFragment::from_mapping(component, &mut report),
                        );
                    }
                    value => {
                        fragment.params.insert(key.clone(), value.clone());
                    }
                },
            }
        }
        fragment
    }
}

impl ComponentSpecFragment {
    pub fn from_mapping(mapping: &Mapping, report: &mut Report) -> Self {
        let mut fragment = Self::default();
        for (key, value) in mapping {
            if value.is_null() {
                continue;
            }
            let mut report = report.field(key);
            match key.as_str() {
                RESOURCES_KEY => {
                    fragment.resources = ResourceSpecFragment::from_value(value, &mut report);
                }
                IMAGE_NAME_KEY => fragment.image_name = read_string(value, &mut report),
                IMAGE_TAG_KEY => fragment.image_tag = read_string(value, &mut report),
                REPLICA_COUNT_KEY => fragment.replica_count = read_replica_count(value, &mut report),
                _ => {
                    fragment.params.insert(key.clone(), value.clone());
                }
            }
        }
        fragment
    }
}

fn read_count(value: &Value, report: &mut Report) -> Option<u32> {
    let count = value.as_u64().and_then(|count| u32::try_from(count).ok());
    if count.is_none() {
        report.invalid_count(value);
    }
    count
}

fn read_slo(value: &Value, report: &mut Report) -> Option<f64> {
    match value.as_f64() {
        Some(slo) if slo.is_finite() && slo > 0.0 => Some(slo),
        _ => {
            report.invalid_field(format!("slo must be a positive number, got {value}"));
            None
        }
    }
}

fn read_port(value: &Value, report: &mut Report) -> Option<u16> {
    match value.as_u64().and_then(|port| u16::try_from(port).ok()) {
        Some(port) if port > 0 => Some(port),
        _ => {
            report.invalid_field(format!(
                "communication_port must be an integer between 1 and 65535, got {value}"
            ));
            None
        }
    }
}

fn read_replica_count(value: &Value, report: &mut Report) -> Option<u32> {
    let replicas = value.as_u64().and_then(|replicas| u32::try_from(replicas).ok());
    if replicas.is_none() {
        report.invalid_field(format!(
            "replica_count must be a non-negative integer, got {value}"
        ));
    }
    replicas
}

/// Image names and tags. Integers are accepted for tags like `7`, floats are not since `7.10` would lose its zero.
fn read_string(value: &Value, report: &mut Report) -> Option<String> {
    match value {
        Value::Scalar(Scalar::String(string)) => Some(string.clone()),
        Value::Scalar(Scalar::Integer(int)) => Some(int.to_string()),
        value => {
            report.invalid_field(format!(
                "expected a string, got {} {value} (quote the value)",
                value.kind()
            ));
            None
        }
    }
}

/// Merges `overrides` on top of `base`.
///
/// Sub-components and free parameters share one namespace. When the override changes what a name refers to, the
/// override wins and the lower definition is dropped as a whole.
pub fn merge(base: &WorkloadSpecFragment, overrides: &WorkloadSpecFragment) -> WorkloadSpecFragment {
    let mut base = base.clone();
    for name in overrides.components.keys() {
        base.params.remove(name);
    }
    for name in overrides.params.keys() {
        base.components.remove(name);
    }
    merge::merge(overrides.clone(), &base)
}

/// Names of the sub-components of `base` that `overrides` replaces with a plain value.
pub fn structural_conflicts<'a>(
    base: &WorkloadSpecFragment,
    overrides: &'a WorkloadSpecFragment,
) -> Vec<&'a str> {
    overrides
        .params
        .keys()
        .filter(|name| base.components.contains_key(*name))
        .map(String::as_str)
        .collect()
}
