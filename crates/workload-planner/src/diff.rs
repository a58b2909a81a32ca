//! Changes between two deployment plans.
//!
//! Used to find out what an executor has to (re)deploy when an inventory changes. Quantities are compared with a
//! relative tolerance, so that rounding noise (for example from re-serializing a plan) is not reported as a change.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    plan::{DeploymentPlan, HostPlan, ResolvedWorkloadInstance},
    resources::ResourceSpec,
    value::{Scalar, Value},
    workload::ComponentSpec,
};

/// Relative tolerance below which two quantities are considered equal
pub const FLOAT_CHANGE_TOLERANCE: f64 = 1e-2;

/// Workload kinds that differ on one host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
}

impl HostChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Hosts with at least one changed workload, keyed by host id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changeset {
    pub hosts: BTreeMap<String, HostChanges>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Lists the runnable workload instances that `next` adds, removes or changes compared to `previous`.
///
/// Disabled workloads are not running, so disabling one shows up as a removal.
pub fn changeset(previous: &DeploymentPlan, next: &DeploymentPlan) -> Changeset {
    let host_ids = previous
        .hosts
        .keys()
        .chain(next.hosts.keys())
        .collect::<BTreeSet<_>>();
    let hosts = host_ids
        .into_iter()
        .filter_map(|id| {
            let changes = host_changes(previous.hosts.get(id), next.hosts.get(id));
            (!changes.is_empty()).then(|| (id.clone(), changes))
        })
        .collect();
    Changeset { hosts }
}

fn host_changes(previous: Option<&HostPlan>, next: Option<&HostPlan>) -> HostChanges {
    fn index(plan: Option<&HostPlan>) -> BTreeMap<&str, &ResolvedWorkloadInstance> {
        plan.map(|plan| {
            plan.workloads
                .iter()
                .map(|instance| (instance.workload.as_str(), instance))
                .collect()
        })
        .unwrap_or_default()
    }

    // instances are deployed with the host's settings, a change there affects all of them
    let host_changed = match (previous, next) {
        (Some(previous), Some(next)) => host_settings_changed(previous, next),
        _ => false,
    };
    let previous = index(previous);
    let next = index(next);

    let mut changes = HostChanges::default();
    for (kind, instance) in &next {
        match previous.get(kind) {
            None => changes.added.push(kind.to_string()),
            Some(old) if host_changed || instance_changed(old, instance) => {
                changes.changed.push(kind.to_string());
            }
            Some(_) => {}
        }
    }
    changes.removed = previous
        .keys()
        .filter(|kind| !next.contains_key(*kind))
        .map(|kind| kind.to_string())
        .collect();
    changes
}

fn host_settings_changed(old: &HostPlan, new: &HostPlan) -> bool {
    old.load_generator_host_ip != new.load_generator_host_ip
        || maps_changed(&old.vars, &new.vars, value_changed)
}

fn instance_changed(old: &ResolvedWorkloadInstance, new: &ResolvedWorkloadInstance) -> bool {
    old.variant != new.variant
        || old.env_namespace != new.env_namespace
        || old.count != new.count
        || old.communication_port != new.communication_port
        || option_changed(old.slo, new.slo)
        || resources_changed(&old.resources, &new.resources)
        || maps_changed(&old.components, &new.components, component_changed)
        || maps_changed(&old.params, &new.params, value_changed)
}

fn component_changed(old: &ComponentSpec, new: &ComponentSpec) -> bool {
    old.image_name != new.image_name
        || old.image_tag != new.image_tag
        || old.replica_count != new.replica_count
        || resources_changed(&old.resources, &new.resources)
        || maps_changed(&old.params, &new.params, value_changed)
}

fn resources_changed(old: &ResourceSpec, new: &ResourceSpec) -> bool {
    maps_changed(&old.0, &new.0, |old, new| float_changed(*old, *new))
}

/// Integers are compared exactly. Any other pair of numbers, such as `4` and `4.0`, is compared within
/// [`FLOAT_CHANGE_TOLERANCE`].
fn value_changed(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Scalar(Scalar::Integer(old)), Value::Scalar(Scalar::Integer(new))) => old != new,
        (Value::Sequence(old), Value::Sequence(new)) => {
            old.len() != new.len()
                || old
                    .iter()
                    .zip(new)
                    .any(|(old, new)| value_changed(old, new))
        }
        (Value::Mapping(old), Value::Mapping(new)) => maps_changed(old, new, value_changed),
        (old, new) => match (old.as_f64(), new.as_f64()) {
            (Some(old), Some(new)) => float_changed(old, new),
            _ => old != new,
        },
    }
}

fn maps_changed<V>(
    old: &BTreeMap<String, V>,
    new: &BTreeMap<String, V>,
    changed: impl Fn(&V, &V) -> bool,
) -> bool {
    old.len() != new.len()
        || old.iter().any(|(key, old)| match new.get(key) {
            Some(new) => changed(old, new),
            None => true,
        })
}

fn option_changed(old: Option<f64>, new: Option<f64>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => float_changed(old, new),
        (None, None) => false,
        _ => true,
    }
}

/// Returns whether `old` and `new` differ by more than [`FLOAT_CHANGE_TOLERANCE`], relative to the larger of the two.
pub fn float_changed(old: f64, new: f64) -> bool {
    if old == new {
        return false;
    }
    (old - new).abs() > FLOAT_CHANGE_TOLERANCE * old.abs().max(new.abs())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::plan::resolve;

    fn plan(yaml: &str) -> DeploymentPlan {
        resolve(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    const PREVIOUS: &str = indoc! {"
        workloads:
          redis_rpc_perf:
            default: {resources: {cpu: 1.0}, threads: 4}
          specjbb:
            default: {}
        hosts:
          10.0.0.1:
            env_uniq_id: 1
          10.0.0.2:
            env_uniq_id: 2
    "};

    #[rstest]
    #[case(1.0, 1.0, false)]
    #[case(100.0, 100.5, false)]
    #[case(100.0, 102.0, true)]
    #[case(0.0, 0.001, true)]
    #[case(-1.0, -1.005, false)]
    fn float_tolerance(#[case] old: f64, #[case] new: f64, #[case] changed: bool) {
        assert_eq!(float_changed(old, new), changed);
    }

    #[test]
    fn identical_plans_have_no_changes() {
        let previous = plan(PREVIOUS);
        assert!(changeset(&previous, &previous).is_empty());
    }

    #[test]
    fn rounding_noise_is_ignored() {
        let previous = plan(PREVIOUS);
        let next = plan(&PREVIOUS.replace("cpu: 1.0", "cpu: 1.001"));
        assert!(changeset(&previous, &next).is_empty());
    }

    #[test]
    fn changes_per_host() {
        let previous = plan(PREVIOUS);
        let next = plan(indoc! {"
            workloads:
              redis_rpc_perf:
                default: {resources: {cpu: 1.0}, threads: 4}
              specjbb:
                default: {}
              cassandra_stress:
                default: {}
            hosts:
              10.0.0.1:
                env_uniq_id: 1
                workloads:
                  redis_rpc_perf: {threads: 8}
                  specjbb: {count: 0}
              10.0.0.3:
                env_uniq_id: 3
        "});

        let changes = changeset(&previous, &next);
        assert_eq!(
            changes.hosts.keys().collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
        assert_eq!(
            changes.hosts["10.0.0.1"],
            HostChanges {
                added: vec!["cassandra_stress".to_string()],
                removed: vec!["specjbb".to_string()],
                changed: vec!["redis_rpc_perf".to_string()],
            }
        );
        assert_eq!(
            changes.hosts["10.0.0.2"].removed,
            vec!["redis_rpc_perf".to_string(), "specjbb".to_string()]
        );
        assert_eq!(
            changes.hosts["10.0.0.3"].added,
            vec![
                "cassandra_stress".to_string(),
                "redis_rpc_perf".to_string(),
                "specjbb".to_string()
            ]
        );
    }

    #[test]
    fn host_settings_change_every_instance() {
        let previous = plan(PREVIOUS);
        let next = plan(&PREVIOUS.replace(
            "env_uniq_id: 2\n",
            "env_uniq_id: 2\n    load_generator_host_ip: 10.0.0.9\n",
        ));

        let changes = changeset(&previous, &next);
        assert_eq!(changes.hosts.keys().collect::<Vec<_>>(), vec!["10.0.0.2"]);
        assert_eq!(
            changes.hosts["10.0.0.2"].changed,
            vec!["redis_rpc_perf".to_string(), "specjbb".to_string()]
        );
    }

    #[rstest]
    #[case(Value::from(4_i64), Value::from(4.0), false)]
    #[case(Value::from(4_i64), Value::from(5_i64), true)]
    #[case(Value::from(1000_i64), Value::from(1005_i64), true)]
    #[case(Value::from(vec![1.0, 2.0]), Value::from(vec![1_i64, 2]), false)]
    #[case(Value::from("4"), Value::from(4_i64), true)]
    fn param_changes(#[case] old: Value, #[case] new: Value, #[case] changed: bool) {
        assert_eq!(value_changed(&old, &new), changed);
    }
}
