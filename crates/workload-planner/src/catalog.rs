//! The known workload kinds and their variants.
//!
//! The baseline of a kind is layered, lowest precedence first:
//!
//! 1. built-in defaults (`count: 1`)
//! 2. the cluster `default_resources`
//! 3. the cluster `workload_defaults`
//! 4. the `default` variant of the kind
//! 5. the selected named variant, if any
use std::collections::BTreeMap;

use snafu::{OptionExt, Snafu};
use tracing::debug;

use crate::{
    config::fragment::FieldPath,
    inventory::ClusterVars,
    validation::{self, Location, Report, Violation},
    value::Value,
    workload::{self, WorkloadSpecFragment},
};

/// Name of the variant every workload kind must define
pub const DEFAULT_VARIANT: &str = "default";

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("unknown workload kind {workload:?}"))]
    UnknownWorkload { workload: String },

    #[snafu(display("workload {workload:?} has no variant {variant:?}"))]
    UnknownVariant { workload: String, variant: String },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Converts the error into a violation found at `report`'s location
    pub fn report(&self, report: &mut Report) {
        match self {
            Self::UnknownWorkload { workload } => report.unknown_workload(workload),
            Self::UnknownVariant { workload, variant } => report.unknown_variant(workload, variant),
        }
    }
}

/// The variants of one workload kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadDefinition {
    default: WorkloadSpecFragment,
    named: BTreeMap<String, WorkloadSpecFragment>,
}

impl WorkloadDefinition {
    pub fn new(default: WorkloadSpecFragment) -> Self {
        Self {
            default,
            named: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, name: impl Into<String>, variant: WorkloadSpecFragment) -> Self {
        self.named.insert(name.into(), variant);
        self
    }

    pub fn variant(&self, name: &str) -> Option<&WorkloadSpecFragment> {
        if name == DEFAULT_VARIANT {
            Some(&self.default)
        } else {
            self.named.get(name)
        }
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variant(name).is_some()
    }

    /// All variant names, `default` first
    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.variants().map(|(name, _)| name)
    }

    /// All variants by name, `default` first
    pub fn variants(&self) -> impl Iterator<Item = (&str, &WorkloadSpecFragment)> {
        std::iter::once((DEFAULT_VARIANT, &self.default)).chain(
            self.named
                .iter()
                .map(|(name, variant)| (name.as_str(), variant)),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadCatalog {
    definitions: BTreeMap<String, WorkloadDefinition>,
    /// Built-in defaults, `default_resources` and `workload_defaults`, already merged
    global: WorkloadSpecFragment,
}

impl WorkloadCatalog {
    pub fn new(vars: &ClusterVars, definitions: BTreeMap<String, WorkloadDefinition>) -> Self {
        let default_resources = WorkloadSpecFragment {
            resources: vars.default_resources.clone(),
            ..WorkloadSpecFragment::default()
        };
        let global = [&default_resources, &vars.workload_defaults]
            .into_iter()
            .fold(workload::built_in_defaults(), |lower, higher| {
                workload::merge(&lower, higher)
            });
        Self {
            definitions,
            global,
        }
    }

    /// Reads the `workloads` block of an inventory.
    ///
    /// Every kind needs a `default` variant. Kinds that cannot be read (invalid names, no `default` variant) are left
    /// out of the catalog, so references to them are reported as unknown workloads as well.
    ///
    /// No variant may replace a component block of the cluster `workload_defaults` with a plain value.
    pub fn from_value(workloads: &Value, vars: &ClusterVars, found: &mut Vec<Violation>) -> Self {
        let root = FieldPath::root().join("workloads");
        let mut catalog = Self::new(vars, BTreeMap::new());
        let kinds = match workloads {
            Value::Null => return catalog,
            Value::Mapping(kinds) => kinds,
            other => {
                let location = Location::inventory();
                Report::new(&location, root, found).invalid_field(format!(
                    "expected a mapping of workload kinds, found {}",
                    other.kind()
                ));
                return catalog;
            }
        };

        for (kind, variants) in kinds {
            let location = Location::workload(kind);
            let mut report = Report::new(&location, root.join(kind), found);
            if let Err(err) = validation::is_workload_kind(kind) {
                report.invalid_field(format!("invalid workload kind name: {err}"));
                continue;
            }
            let Some(definition) = read_definition(kind, variants, &location, &mut report) else {
                continue;
            };
            for (name, variant) in definition.variants() {
                let location = location.with_variant(name);
                for component in workload::structural_conflicts(&catalog.global, variant) {
                    report.scoped(&location, name).field(component).structural_conflict(format!(
                        "variant {name:?} replaces component {component:?} of the cluster workload_defaults with a plain value"
                    ));
                }
            }
            debug!(
                workload = kind,
                variants = ?definition.variant_names().collect::<Vec<_>>(),
                "added workload kind to catalog"
            );
            catalog.definitions.insert(kind.clone(), definition);
        }
        catalog
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> &BTreeMap<String, WorkloadDefinition> {
        &self.definitions
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.definitions.contains_key(kind)
    }

    pub fn get_variant(&self, kind: &str, variant: &str) -> Result<&WorkloadSpecFragment> {
        self.definitions
            .get(kind)
            .context(UnknownWorkloadSnafu { workload: kind })?
            .variant(variant)
            .context(UnknownVariantSnafu {
                workload: kind,
                variant,
            })
    }

    /// The merged baseline of `variant` of `kind`, before any host override is applied.
    pub fn resolve_base(&self, kind: &str, variant: &str) -> Result<WorkloadSpecFragment> {
        let default = self.get_variant(kind, DEFAULT_VARIANT)?;
        let base = workload::merge(&self.global, default);
        if variant == DEFAULT_VARIANT {
            return Ok(base);
        }
        let named = self.get_variant(kind, variant)?;
        Ok(workload::merge(&base, named))
    }
}

fn read_definition(
    kind: &str,
    variants: &Value,
    location: &Location,
    report: &mut Report,
) -> Option<WorkloadDefinition> {
    let variants = match variants {
        Value::Mapping(variants) => variants,
        Value::Null => {
            report.unknown_variant(kind, DEFAULT_VARIANT);
            return None;
        }
        other => {
            report.invalid_field(format!(
                "expected a mapping of variants, found {}",
                other.kind()
            ));
            return None;
        }
    };

    let mut fragments = BTreeMap::new();
    for (name, variant) in variants {
        let location = location.with_variant(name);
        let mut report = report.scoped(&location, name);
        if let Err(err) = validation::is_variant_name(name) {
            report.invalid_field(format!("invalid variant name: {err}"));
            continue;
        }
        let fragment = match variant {
            Value::Null => WorkloadSpecFragment::default(),
            Value::Mapping(mapping) => WorkloadSpecFragment::from_mapping(mapping, &mut report),
            other => {
                report.invalid_field(format!(
                    "a variant must be a mapping, found {}",
                    other.kind()
                ));
                continue;
            }
        };
        fragments.insert(name.clone(), fragment);
    }

    let Some(default) = fragments.remove(DEFAULT_VARIANT) else {
        report.unknown_variant(kind, DEFAULT_VARIANT);
        return None;
    };
    let mut definition = WorkloadDefinition::new(default);
    for (name, fragment) in fragments {
        let location = location.with_variant(&name);
        for component in workload::structural_conflicts(&definition.default, &fragment) {
            report.scoped(&location, &name).field(component).structural_conflict(format!(
                "variant {name:?} replaces component {component:?} of the default variant with a plain value"
            ));
        }
        definition = definition.with_variant(name, fragment);
    }
    Some(definition)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::resources::ResourceSpecFragment;

    fn read(yaml: &str, vars: &ClusterVars) -> (WorkloadCatalog, Vec<Violation>) {
        let workloads: Value = serde_yaml::from_str(yaml).unwrap();
        let mut found = Vec::new();
        let catalog = WorkloadCatalog::from_value(&workloads, vars, &mut found);
        (catalog, found)
    }

    const WORKLOADS: &str = indoc! {"
        redis_rpc_perf:
          default:
            resources: {cpu: 1}
            threads: 4
            redis: {image_name: redis, image_tag: '7'}
          big:
            resources: {cpu: 4}
            redis: {replica_count: 3}
        specjbb:
          default: ~
    "};

    #[test]
    fn baseline_precedence() {
        let vars = ClusterVars {
            default_resources: ResourceSpecFragment::default()
                .with("cpu", 0.5)
                .with("ram", 2.0),
            workload_defaults: WorkloadSpecFragment {
                slo: Some(0.99),
                ..WorkloadSpecFragment::default()
            },
            ..ClusterVars::default()
        };
        let (catalog, found) = read(WORKLOADS, &vars);
        assert!(found.is_empty(), "{found:?}");
        assert_eq!(catalog.kinds().collect::<Vec<_>>(), vec![
            "redis_rpc_perf",
            "specjbb"
        ]);

        let default = catalog.resolve_base("redis_rpc_perf", DEFAULT_VARIANT).unwrap();
        assert_eq!(default.count, Some(1));
        assert_eq!(default.slo, Some(0.99));
        assert_eq!(default.resources.0["cpu"], Some(1.0));
        assert_eq!(default.resources.0["ram"], Some(2.0));

        let big = catalog.resolve_base("redis_rpc_perf", "big").unwrap();
        assert_eq!(big.resources.0["cpu"], Some(4.0));
        assert_eq!(big.params["threads"], Value::from(4_i64));
        let redis = &big.components["redis"];
        assert_eq!(redis.image_name.as_deref(), Some("redis"));
        assert_eq!(redis.image_tag.as_deref(), Some("7"));
        assert_eq!(redis.replica_count, Some(3));

        let specjbb = catalog.resolve_base("specjbb", DEFAULT_VARIANT).unwrap();
        assert_eq!(specjbb.resources.0["cpu"], Some(0.5));
    }

    #[rstest]
    #[case("cassandra_stress", DEFAULT_VARIANT, Error::UnknownWorkload {
        workload: "cassandra_stress".to_string()
    })]
    #[case("redis_rpc_perf", "huge", Error::UnknownVariant {
        workload: "redis_rpc_perf".to_string(),
        variant: "huge".to_string()
    })]
    fn unresolvable_bases(#[case] kind: &str, #[case] variant: &str, #[case] expected: Error) {
        let (catalog, _) = read(WORKLOADS, &ClusterVars::default());
        assert_eq!(catalog.resolve_base(kind, variant), Err(expected));
    }

    #[test]
    fn kinds_without_default_are_left_out() {
        let (catalog, found) = read(
            indoc! {"
                redis_rpc_perf:
                  big: {count: 2}
                specjbb: {default: {}}
            "},
            &ClusterVars::default(),
        );
        assert!(!catalog.contains("redis_rpc_perf"));
        assert!(catalog.contains("specjbb"));
        assert_eq!(found.len(), 1);
        assert!(matches!(
            &found[0],
            Violation::UnknownVariant { variant, .. } if variant == DEFAULT_VARIANT
        ));
    }

    #[rstest]
    #[case::invalid_kind_name("Redis-Perf: {default: {}}", "workloads.Redis-Perf")]
    #[case::invalid_variant_name(
        "redis_rpc_perf: {default: {}, Big_One: {}}",
        "workloads.redis_rpc_perf.Big_One"
    )]
    #[case::sequence_variant(
        "redis_rpc_perf: {default: {}, big: [1]}",
        "workloads.redis_rpc_perf.big"
    )]
    #[case::scalar_variants("redis_rpc_perf: 3", "workloads.redis_rpc_perf")]
    fn invalid_fields(#[case] yaml: &str, #[case] path: &str) {
        let (_, found) = read(yaml, &ClusterVars::default());
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(matches!(found[0], Violation::InvalidField { .. }));
        assert_eq!(found[0].path().to_string(), path);
    }

    #[test]
    fn named_variant_must_not_replace_default_components() {
        let (catalog, found) = read(
            indoc! {"
                redis_rpc_perf:
                  default:
                    redis: {image_name: redis}
                  flat:
                    redis: off
            "},
            &ClusterVars::default(),
        );
        assert!(catalog.contains("redis_rpc_perf"));
        assert_eq!(found.len(), 1);
        assert!(matches!(
            found[0],
            Violation::StructuralOverrideConflict { .. }
        ));
        assert_eq!(
            found[0].path().to_string(),
            "workloads.redis_rpc_perf.flat.redis"
        );
        assert_eq!(found[0].location().variant.as_deref(), Some("flat"));
    }

    #[test]
    fn variants_must_not_replace_cluster_components() {
        let vars = ClusterVars {
            workload_defaults: WorkloadSpecFragment::from_mapping(
                serde_yaml::from_str::<Value>("sidecar: {image_name: envoy}")
                    .unwrap()
                    .as_mapping()
                    .unwrap(),
                &mut Report::new(&Location::inventory(), FieldPath::root(), &mut Vec::new()),
            ),
            ..ClusterVars::default()
        };
        let (catalog, found) = read(
            indoc! {"
                redis_rpc_perf:
                  default: {count: 1, sidecar: off}
                specjbb:
                  default: {}
                  plain: {sidecar: 'no'}
            "},
            &vars,
        );
        assert!(catalog.contains("redis_rpc_perf"));
        assert_eq!(
            found
                .iter()
                .map(|violation| violation.path().to_string())
                .collect::<Vec<_>>(),
            vec![
                "workloads.redis_rpc_perf.default.sidecar",
                "workloads.specjbb.plain.sidecar"
            ]
        );
        assert!(
            found
                .iter()
                .all(|violation| matches!(violation, Violation::StructuralOverrideConflict { .. }))
        );
    }

    #[test]
    fn variant_names_start_with_default() {
        let definition = WorkloadDefinition::new(WorkloadSpecFragment::default())
            .with_variant("big", WorkloadSpecFragment::default())
            .with_variant("alpha", WorkloadSpecFragment::default());
        assert_eq!(definition.variant_names().collect::<Vec<_>>(), vec![
            "default", "alpha", "big"
        ]);
        assert!(definition.has_variant("default"));
        assert!(!definition.has_variant("huge"));
    }
}
