//! The deployment plan: what runs where, with which parameters.
//!
//! [`PlanGenerator`] walks the hosts of an [`Inventory`] (sorted by id) and the kinds of its catalog (sorted by name),
//! merges the host override on top of the baseline of the selected variant and validates the result. A plan is only
//! returned if nothing at all was found to be wrong.
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    catalog::DEFAULT_VARIANT,
    config::fragment::{FieldPath, validate},
    inventory::{ClusterVars, Host, Inventory},
    overrides::HostOverrideResolver,
    resources::ResourceSpec,
    validation::{self, Location, Report, Violation, Violations},
    value::{Mapping, Value},
    workload::{self, ComponentSpec, WorkloadSpec},
};

/// Cluster information handed to the executor along with the plan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClusterInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka_brokers: Option<Value>,
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub settings: Mapping,
}

impl From<&ClusterVars> for ClusterInfo {
    fn from(vars: &ClusterVars) -> Self {
        Self {
            cluster: vars.cluster.clone(),
            docker_registry: vars.docker_registry.clone(),
            kafka_brokers: vars.kafka_brokers.clone(),
            settings: vars.settings.clone(),
        }
    }
}

/// The fully resolved specification of one workload kind on one host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResolvedWorkloadInstance {
    pub workload: String,
    pub variant: String,
    pub env_namespace: String,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_port: Option<u16>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, ComponentSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl ResolvedWorkloadInstance {
    fn new(workload: &str, variant: &str, env_namespace: String, spec: WorkloadSpec) -> Self {
        let WorkloadSpec {
            count,
            slo,
            communication_port,
            resources,
            components,
            params,
        } = spec;
        Self {
            workload: workload.to_string(),
            variant: variant.to_string(),
            env_namespace,
            count,
            slo,
            communication_port,
            resources,
            components,
            params,
        }
    }
}

/// A workload kind that resolved to `count: 0` on a host. Kept for auditing, never deployed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisabledWorkload {
    pub workload: String,
    pub variant: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HostPlan {
    pub env_uniq_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_generator_host_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub vars: Mapping,
    /// Runnable instances, ordered by workload kind
    #[serde(default)]
    pub workloads: Vec<ResolvedWorkloadInstance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled: Vec<DisabledWorkload>,
}

impl HostPlan {
    pub fn workload(&self, kind: &str) -> Option<&ResolvedWorkloadInstance> {
        self.workloads.iter().find(|instance| instance.workload == kind)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeploymentPlan {
    #[serde(flatten)]
    pub cluster: ClusterInfo,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostPlan>,
}

impl DeploymentPlan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            hosts: self.hosts.len(),
            ..PlanSummary::default()
        };
        for host in self.hosts.values() {
            for instance in &host.workloads {
                *summary.instances.entry(instance.workload.clone()).or_default() +=
                    u64::from(instance.count);
            }
            summary.disabled += host.disabled.len();
        }
        summary
    }
}

/// Instance counts of a plan, per workload kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub hosts: usize,
    pub instances: BTreeMap<String, u64>,
    /// Number of (host, workload kind) pairs disabled with `count: 0`
    pub disabled: usize,
}

impl PlanSummary {
    pub fn total_instances(&self) -> u64 {
        self.instances.values().sum()
    }
}

impl Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} instance(s) on {} host(s), {} disabled",
            self.total_instances(),
            self.hosts,
            self.disabled
        )?;
        for (workload, count) in &self.instances {
            write!(f, "\n  {workload}: {count}")?;
        }
        Ok(())
    }
}

/// Derives the namespace of `kind` on the host with `env_uniq_id`, such as `redis-rpc-perf-3`.
pub fn derive_namespace(env_uniq_id: u32, kind: &str) -> String {
    format!("{}-{env_uniq_id}", kind.to_lowercase().replace('_', "-"))
}

/// Resolves a parsed inventory tree into a plan, or every violation found on the way.
pub fn resolve(tree: &Value) -> Result<DeploymentPlan, Violations> {
    let mut found = Vec::new();
    let inventory = Inventory::read(tree, &mut found);
    let plan = PlanGenerator::new(&inventory).generate_into(&mut found);
    Violations::into_result(found, plan)
}

pub struct PlanGenerator<'a> {
    inventory: &'a Inventory,
}

impl<'a> PlanGenerator<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    /// Builds the plan, recording every problem in `found`. The plan is only meaningful if nothing was found.
    pub fn generate_into(&self, found: &mut Vec<Violation>) -> DeploymentPlan {
        let Inventory { vars, hosts, .. } = self.inventory;
        found.extend(validation::duplicate_env_ids(
            hosts.iter().map(|host| (host.id.as_str(), host.env_uniq_id)),
        ));

        let host_ids = hosts.iter().map(|host| host.id.as_str()).collect::<BTreeSet<_>>();
        let plan = DeploymentPlan {
            cluster: ClusterInfo::from(vars),
            hosts: hosts
                .iter()
                .map(|host| (host.id.clone(), self.plan_host(host, &host_ids, found)))
                .collect(),
        };
        if found.is_empty() {
            let summary = plan.summary();
            info!(
                hosts = summary.hosts,
                instances = summary.total_instances(),
                disabled = summary.disabled,
                "generated deployment plan"
            );
        }
        plan
    }

    #[instrument(skip_all, fields(host = %host.id, env_uniq_id = host.env_uniq_id))]
    fn plan_host(
        &self,
        host: &Host,
        host_ids: &BTreeSet<&str>,
        found: &mut Vec<Violation>,
    ) -> HostPlan {
        let catalog = &self.inventory.catalog;
        let overrides = HostOverrideResolver::new(catalog).resolve_into(host, found);

        if let Some(load_generator) = &host.load_generator_host_ip {
            if !host_ids.contains(load_generator.as_str()) {
                warn!(
                    load_generator_host_ip = load_generator,
                    "load generator host is not part of the inventory"
                );
            }
        }

        let mut workloads = Vec::new();
        let mut disabled = Vec::new();
        for kind in catalog.kinds() {
            let host_override = overrides.get(kind);
            let variant = host_override.map_or(DEFAULT_VARIANT, |over| over.variant());
            // unknown kinds and variants were already reported by the override resolver
            let Ok(base) = catalog.resolve_base(kind, variant) else {
                continue;
            };
            let effective = match host_override {
                Some(over) => workload::merge(&base, &over.fragment),
                None => base,
            };

            let location = Location::host(&host.id)
                .with_workload(kind)
                .with_variant(variant);
            let path = FieldPath::from_iter(["hosts", host.id.as_str(), "workloads", kind]);
            let mut report = Report::new(&location, path, found);
            let spec = match validate::<WorkloadSpec>(effective) {
                Ok(spec) => spec,
                Err(err) => {
                    report.validation_failed(&err);
                    continue;
                }
            };
            let env_namespace = derive_namespace(host.env_uniq_id, kind);
            if let Err(err) = validation::is_rfc_1123_label(&env_namespace) {
                report.invalid_field(format!(
                    "derived namespace {env_namespace:?} is not a valid label: {err}"
                ));
                continue;
            }

            if spec.count == 0 {
                debug!(workload = kind, variant, "workload disabled with count 0");
                disabled.push(DisabledWorkload {
                    workload: kind.to_string(),
                    variant: variant.to_string(),
                });
            } else {
                debug!(
                    workload = kind,
                    variant,
                    count = spec.count,
                    env_namespace,
                    "resolved workload"
                );
                workloads.push(ResolvedWorkloadInstance::new(
                    kind,
                    variant,
                    env_namespace,
                    spec,
                ));
            }
        }

        HostPlan {
            env_uniq_id: host.env_uniq_id,
            load_generator_host_ip: host.load_generator_host_ip.clone(),
            vars: host.vars.clone(),
            workloads,
            disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    const INVENTORY: &str = indoc! {"
        vars:
          cluster: lab
          default_resources: {cpu: 1, ram: 1, disk: 1}
        workloads:
          redis_rpc_perf:
            default:
              count: 1
              slo: 100000
              communication_port: 6789
              redis: {image_name: redis, resources: {cpu: 0.5}}
            big:
              resources: {cpu: 4, ram: 8}
          specjbb:
            default: {count: 2}
        hosts:
          10.0.0.2:
            env_uniq_id: 2
            workloads:
              redis_rpc_perf: {variant: big}
              specjbb: {count: 0}
          10.0.0.1:
            env_uniq_id: 1
            load_generator_host_ip: 10.0.0.2
            workloads:
              redis_rpc_perf: {resources: {cpu: 0.5}}
    "};

    #[rstest]
    #[case(1, "redis_rpc_perf", "redis-rpc-perf-1")]
    #[case(12, "specjbb", "specjbb-12")]
    #[case(3, "Tensorflow_Train", "tensorflow-train-3")]
    fn namespaces(#[case] env_uniq_id: u32, #[case] kind: &str, #[case] expected: &str) {
        assert_eq!(derive_namespace(env_uniq_id, kind), expected);
    }

    #[test]
    fn resolve_plan() {
        let plan = resolve(&parse(INVENTORY)).unwrap();
        assert_eq!(plan.cluster.cluster.as_deref(), Some("lab"));
        assert_eq!(
            plan.hosts.keys().collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2"]
        );

        let first = &plan.hosts["10.0.0.1"];
        let kinds = first
            .workloads
            .iter()
            .map(|instance| instance.workload.as_str())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["redis_rpc_perf", "specjbb"]);
        let redis = first.workload("redis_rpc_perf").unwrap();
        assert_eq!(redis.variant, DEFAULT_VARIANT);
        assert_eq!(redis.env_namespace, "redis-rpc-perf-1");
        assert_eq!(redis.resources.get("cpu"), Some(0.5));
        assert_eq!(redis.resources.get("ram"), Some(1.0));
        assert_eq!(redis.components["redis"].resources.get("cpu"), Some(0.5));
        assert_eq!(first.workload("specjbb").unwrap().count, 2);

        let second = &plan.hosts["10.0.0.2"];
        let redis = second.workload("redis_rpc_perf").unwrap();
        assert_eq!(redis.variant, "big");
        assert_eq!(redis.resources.get("cpu"), Some(4.0));
        assert_eq!(redis.resources.get("disk"), Some(1.0));
        assert_eq!(redis.slo, Some(100_000.0));
        assert!(second.workload("specjbb").is_none());
        assert_eq!(
            second.disabled,
            vec![DisabledWorkload {
                workload: "specjbb".to_string(),
                variant: DEFAULT_VARIANT.to_string(),
            }]
        );
    }

    #[test]
    fn summary_counts_instances() {
        let summary = resolve(&parse(INVENTORY)).unwrap().summary();
        assert_eq!(summary.hosts, 2);
        assert_eq!(summary.instances["redis_rpc_perf"], 2);
        assert_eq!(summary.instances["specjbb"], 2);
        assert_eq!(summary.disabled, 1);
        assert_eq!(summary.total_instances(), 4);
    }

    #[test]
    fn resolution_is_deterministic() {
        let tree = parse(INVENTORY);
        let first = serde_json::to_string(&resolve(&tree).unwrap()).unwrap();
        let second = serde_json::to_string(&resolve(&tree).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn plan_survives_serialization() {
        let plan = resolve(&parse(INVENTORY)).unwrap();
        let yaml = serde_yaml::to_string(&plan).unwrap();
        let read_back: DeploymentPlan = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(read_back, plan);
    }

    #[test]
    fn negative_resources_after_merge_are_rejected() {
        let violations = resolve(&parse(indoc! {"
            workloads:
              specjbb:
                default: {resources: {cpu: -2}}
            hosts:
              10.0.0.1: {env_uniq_id: 1}
        "}))
        .unwrap_err();
        assert_eq!(violations.len(), 1);
        let violation = violations.iter().next().unwrap();
        assert!(matches!(violation, Violation::InvalidResourceValue { .. }));
        assert_eq!(
            violation.path().to_string(),
            "hosts.10.0.0.1.workloads.specjbb.resources.cpu"
        );
    }

    #[test]
    fn empty_catalog_gives_empty_hosts() {
        let plan = resolve(&parse("hosts: {10.0.0.1: {env_uniq_id: 1}}")).unwrap();
        assert!(plan.hosts["10.0.0.1"].workloads.is_empty());
    }
}
