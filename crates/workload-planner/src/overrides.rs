//! Per-host overrides of the catalog.
//!
//! A host may override any workload kind of the catalog in its `workloads` block, and select a named variant with
//! `variant: <name>`. Kinds the host does not mention run with their `default` variant.
use std::collections::BTreeMap;

use tracing::trace;

use crate::{
    catalog::{DEFAULT_VARIANT, WorkloadCatalog},
    config::fragment::FieldPath,
    inventory::Host,
    validation::{Location, Report, Violation, Violations},
    value::{Mapping, Value},
    workload::{self, VARIANT_KEY, WorkloadSpecFragment},
};

/// What one host says about one workload kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostOverride {
    /// The selected variant, [`None`] selects `default`
    pub variant: Option<String>,
    pub fragment: WorkloadSpecFragment,
}

impl HostOverride {
    pub fn variant(&self) -> &str {
        self.variant.as_deref().unwrap_or(DEFAULT_VARIANT)
    }
}

pub struct HostOverrideResolver<'a> {
    catalog: &'a WorkloadCatalog,
}

impl<'a> HostOverrideResolver<'a> {
    pub fn new(catalog: &'a WorkloadCatalog) -> Self {
        Self { catalog }
    }

    /// Returns the overrides of `host`, keyed by workload kind.
    pub fn resolve(&self, host: &Host) -> Result<BTreeMap<String, HostOverride>, Violations> {
        let mut found = Vec::new();
        let overrides = self.resolve_into(host, &mut found);
        Violations::into_result(found, overrides)
    }

    /// Like [`Self::resolve`], but records problems in `found` and leaves the offending kinds out.
    pub fn resolve_into(
        &self,
        host: &Host,
        found: &mut Vec<Violation>,
    ) -> BTreeMap<String, HostOverride> {
        let location = Location::host(&host.id);
        let path = FieldPath::from_iter(["hosts", host.id.as_str(), "workloads"]);
        let mut report = Report::new(&location, path, found);
        let mut overrides = BTreeMap::new();

        let kinds = match &host.workloads {
            None | Some(Value::Null) => return overrides,
            Some(Value::Mapping(kinds)) => kinds,
            Some(other) => {
                report.structural_conflict(format!(
                    "the workloads block must be a mapping of workload kinds, found {}",
                    other.kind()
                ));
                return overrides;
            }
        };

        for (kind, block) in kinds {
            let location = location.with_workload(kind);
            let mut report = report.scoped(&location, kind);
            if !self.catalog.contains(kind) {
                report.unknown_workload(kind);
                continue;
            }
            let host_override = match block {
                Value::Null => HostOverride::default(),
                Value::Mapping(block) => match self.read_override(kind, block, &mut report) {
                    Some(host_override) => host_override,
                    None => continue,
                },
                other => {
                    report.structural_conflict(format!(
                        "expected a partial workload specification, found {} {other}",
                        other.kind()
                    ));
                    continue;
                }
            };
            trace!(
                host = %host.id,
                workload = kind,
                variant = host_override.variant(),
                "read host override"
            );
            overrides.insert(kind.clone(), host_override);
        }
        overrides
    }

    fn read_override(
        &self,
        kind: &str,
        block: &Mapping,
        report: &mut Report,
    ) -> Option<HostOverride> {
        let variant = match block.get(VARIANT_KEY) {
            None | Some(Value::Null) => None,
            Some(selector) => match selector.as_str() {
                Some(variant) => Some(variant.to_string()),
                None => {
                    report.field(VARIANT_KEY).invalid_field(format!(
                        "a variant selector must be a variant name, found {} {selector}",
                        selector.kind()
                    ));
                    return None;
                }
            },
        };
        let selected = variant.as_deref().unwrap_or(DEFAULT_VARIANT);
        let location = report.location().with_variant(selected);
        let mut report = report.relocated(&location);

        let base = match self.catalog.resolve_base(kind, selected) {
            Ok(base) => base,
            Err(err) => {
                err.report(&mut report.field(VARIANT_KEY));
                return None;
            }
        };

        let mut block = block.clone();
        block.remove(VARIANT_KEY);
        let errors_before = report.found();
        let fragment = WorkloadSpecFragment::from_mapping(&block, &mut report);
        for component in workload::structural_conflicts(&base, &fragment) {
            report.field(component).structural_conflict(format!(
                "replaces component {component:?} of variant {selected:?} with a plain value"
            ));
        }
        if report.found() > errors_before {
            return None;
        }
        Some(HostOverride { variant, fragment })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::inventory::Inventory;

    const CATALOG: &str = indoc! {"
        workloads:
          redis_rpc_perf:
            default:
              count: 1
              redis: {image_name: redis}
            big:
              resources: {cpu: 4}
          specjbb:
            default: {count: 1}
    "};

    fn inventory_with_host(host: &str) -> Inventory {
        let catalog: Value = serde_yaml::from_str(CATALOG).unwrap();
        let host: Value = serde_yaml::from_str(host).unwrap();
        Inventory::from_layers([&catalog, &host]).unwrap()
    }

    fn resolve(host: &str) -> Result<BTreeMap<String, HostOverride>, Violations> {
        let inventory = inventory_with_host(host);
        HostOverrideResolver::new(&inventory.catalog).resolve(&inventory.hosts[0])
    }

    #[test]
    fn host_without_overrides() {
        let overrides = resolve("hosts: {10.0.0.1: {env_uniq_id: 1}}").unwrap();
        assert!(overrides.is_empty());
    }

    #[test]
    fn variant_selection_and_fragment() {
        let overrides = resolve(indoc! {"
            hosts:
              10.0.0.1:
                env_uniq_id: 1
                workloads:
                  redis_rpc_perf: {variant: big, count: 2}
                  specjbb: ~
        "})
        .unwrap();
        let redis = &overrides["redis_rpc_perf"];
        assert_eq!(redis.variant(), "big");
        assert_eq!(redis.fragment.count, Some(2));
        assert_eq!(overrides["specjbb"], HostOverride::default());
        assert_eq!(overrides["specjbb"].variant(), DEFAULT_VARIANT);
    }

    #[rstest]
    #[case::unknown_workload(
        "{cassandra_stress: {count: 1}}",
        "hosts.10.0.0.1.workloads.cassandra_stress"
    )]
    #[case::unknown_variant(
        "{redis_rpc_perf: {variant: huge}}",
        "hosts.10.0.0.1.workloads.redis_rpc_perf.variant"
    )]
    #[case::scalar_over_component(
        "{redis_rpc_perf: {redis: off}}",
        "hosts.10.0.0.1.workloads.redis_rpc_perf.redis"
    )]
    #[case::scalar_kind_block(
        "{redis_rpc_perf: 3}",
        "hosts.10.0.0.1.workloads.redis_rpc_perf"
    )]
    #[case::sequence_workloads_block("[redis_rpc_perf]", "hosts.10.0.0.1.workloads")]
    fn rejected_overrides(#[case] workloads: &str, #[case] path: &str) {
        let violations = resolve(&format!(
            "hosts: {{10.0.0.1: {{env_uniq_id: 1, workloads: {workloads}}}}}"
        ))
        .unwrap_err();
        assert_eq!(violations.len(), 1, "{violations}");
        let violation = violations.iter().next().unwrap();
        assert_eq!(violation.path().to_string(), path);
        assert_eq!(violation.location().host.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn violation_kinds() {
        let violations = resolve(indoc! {"
            hosts:
              10.0.0.1:
                env_uniq_id: 1
                workloads:
                  cassandra_stress: {count: 1}
                  redis_rpc_perf: {variant: huge}
                  specjbb: {count: -1}
        "})
        .unwrap_err();
        let kinds = violations
            .iter()
            .map(|violation| match violation {
                Violation::InvalidCount { .. } => "InvalidCount",
                Violation::UnknownWorkload { .. } => "UnknownWorkload",
                Violation::UnknownVariant { .. } => "UnknownVariant",
                _ => "other",
            })
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec!["InvalidCount", "UnknownWorkload", "UnknownVariant"]);
    }

    #[test]
    fn conflicts_are_checked_against_the_selected_variant() {
        let violations = resolve(indoc! {"
            hosts:
              10.0.0.1:
                env_uniq_id: 1
                workloads:
                  redis_rpc_perf: {variant: big, redis: off}
        "})
        .unwrap_err();
        let violation = violations.iter().next().unwrap();
        assert!(matches!(
            violation,
            Violation::StructuralOverrideConflict { .. }
        ));
        assert_eq!(violation.location().variant.as_deref(), Some("big"));
    }
}
