//! Extraction of cluster variables, the workload catalog and the host list from a parsed inventory tree.
//!
//! The accepted layout is
//!
//! ```yaml
//! vars:        # cluster variables
//!   cluster: lab
//!   default_resources: {cpu: 1, ram: 1}
//! workloads:   # kind -> variant -> partial specification
//!   redis_rpc_perf:
//!     default: {count: 1}
//! hosts:       # host id -> host block
//!   10.0.0.1:
//!     env_uniq_id: 1
//!     workloads:
//!       redis_rpc_perf: {count: 2}
//! ```
use tracing::debug;

use crate::{
    catalog::WorkloadCatalog,
    config::fragment::FieldPath,
    resources::ResourceSpecFragment,
    validation::{Location, Report, Violation, Violations},
    value::{self, Mapping, Value},
    workload::WorkloadSpecFragment,
};

const VARS_KEY: &str = "vars";
const WORKLOADS_KEY: &str = "workloads";
const HOSTS_KEY: &str = "hosts";

const CLUSTER_KEY: &str = "cluster";
const DOCKER_REGISTRY_KEY: &str = "docker_registry";
const KAFKA_BROKERS_KEY: &str = "kafka_brokers";
const DEFAULT_RESOURCES_KEY: &str = "default_resources";
const WORKLOAD_DEFAULTS_KEY: &str = "workload_defaults";

const ENV_UNIQ_ID_KEY: &str = "env_uniq_id";
const LOAD_GENERATOR_HOST_IP_KEY: &str = "load_generator_host_ip";

/// Cluster-wide variables, shared by every host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterVars {
    pub cluster: Option<String>,
    pub docker_registry: Option<String>,
    /// Message bus the executor publishes to, passed through untouched
    pub kafka_brokers: Option<Value>,
    pub default_resources: ResourceSpecFragment,
    pub workload_defaults: WorkloadSpecFragment,
    /// Every other variable (connection settings and the like)
    pub settings: Mapping,
}

impl ClusterVars {
    pub fn from_value(value: &Value, report: &mut Report) -> Self {
        let mut vars = Self::default();
        let mapping = match value {
            Value::Null => return vars,
            Value::Mapping(mapping) => mapping,
            other => {
                report.invalid_field(format!(
                    "expected a mapping of cluster variables, found {}",
                    other.kind()
                ));
                return vars;
            }
        };
        for (key, value) in mapping {
            if value.is_null() {
                continue;
            }
            let mut report = report.field(key);
            match key.as_str() {
                CLUSTER_KEY => vars.cluster = read_string(value, &mut report),
                DOCKER_REGISTRY_KEY => vars.docker_registry = read_string(value, &mut report),
                KAFKA_BROKERS_KEY => vars.kafka_brokers = Some(value.clone()),
                DEFAULT_RESOURCES_KEY => {
                    vars.default_resources = ResourceSpecFragment::from_value(value, &mut report);
                }
                WORKLOAD_DEFAULTS_KEY => match value {
                    Value::Mapping(defaults) => {
                        vars.workload_defaults =
                            WorkloadSpecFragment::from_mapping(defaults, &mut report);
                    }
                    other => report.invalid_field(format!(
                        "expected a partial workload specification, found {}",
                        other.kind()
                    )),
                },
                _ => {
                    vars.settings.insert(key.clone(), value.clone());
                }
            }
        }
        vars
    }
}

/// One host of the inventory.
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    /// Address of the host, the key of its block
    pub id: String,
    /// Positive, unique across the inventory, used to derive namespaces
    pub env_uniq_id: u32,
    /// The host generating load for this one. Only a reference, it is not resolved.
    pub load_generator_host_ip: Option<String>,
    /// The raw `workloads` override block, checked by the host override resolver
    pub workloads: Option<Value>,
    /// Every other host variable
    pub vars: Mapping,
}

impl Host {
    /// Reads one host block. Returns [`None`] if the block is unusable, after reporting why.
    pub fn from_value(id: &str, value: &Value, report: &mut Report) -> Option<Self> {
        let Value::Mapping(mapping) = value else {
            report.invalid_field(format!(
                "a host block must be a mapping with at least {ENV_UNIQ_ID_KEY}, found {}",
                value.kind()
            ));
            return None;
        };

        let mut env_uniq_id = None;
        let mut invalid_env_uniq_id = false;
        let mut load_generator_host_ip = None;
        let mut workloads = None;
        let mut vars = Mapping::new();
        for (key, value) in mapping {
            if value.is_null() {
                continue;
            }
            let mut report = report.field(key);
            match key.as_str() {
                ENV_UNIQ_ID_KEY => {
                    env_uniq_id = value
                        .as_u64()
                        .and_then(|id| u32::try_from(id).ok())
                        .filter(|id| *id > 0);
                    if env_uniq_id.is_none() {
                        report.invalid_field(format!(
                            "{ENV_UNIQ_ID_KEY} must be a positive integer, got {value}"
                        ));
                        invalid_env_uniq_id = true;
                    }
                }
                LOAD_GENERATOR_HOST_IP_KEY => {
                    load_generator_host_ip = read_string(value, &mut report);
                }
                WORKLOADS_KEY => workloads = Some(value.clone()),
                _ => {
                    vars.insert(key.clone(), value.clone());
                }
            }
        }

        let Some(env_uniq_id) = env_uniq_id else {
            if !invalid_env_uniq_id {
                report.invalid_field(format!("{ENV_UNIQ_ID_KEY} is required"));
            }
            return None;
        };
        Some(Self {
            id: id.to_string(),
            env_uniq_id,
            load_generator_host_ip,
            workloads,
            vars,
        })
    }
}

fn read_string(value: &Value, report: &mut Report) -> Option<String> {
    let string = value.as_str().map(str::to_string);
    if string.is_none() {
        report.invalid_field(format!("expected a string, found {} {value}", value.kind()));
    }
    string
}

/// Everything the plan generator needs, read from one inventory tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inventory {
    pub vars: ClusterVars,
    pub catalog: WorkloadCatalog,
    /// Sorted by id
    pub hosts: Vec<Host>,
}

impl Inventory {
    /// Reads `tree`, failing with every violation found.
    pub fn from_value(tree: &Value) -> Result<Self, Violations> {
        let mut found = Vec::new();
        let inventory = Self::read(tree, &mut found);
        Violations::into_result(found, inventory)
    }

    /// Deep-merges several inventory documents (lowest precedence first) and reads the result.
    ///
    /// This allows splitting an inventory into shared defaults and site specific overrides.
    pub fn from_layers<'a>(layers: impl IntoIterator<Item = &'a Value>) -> Result<Self, Violations> {
        Self::from_value(&value::merge_chain(layers))
    }

    /// Reads as much of `tree` as possible, recording every problem in `found`.
    pub fn read(tree: &Value, found: &mut Vec<Violation>) -> Self {
        let location = Location::inventory();
        let mut report = Report::new(&location, FieldPath::root(), found);
        let root = match tree {
            Value::Mapping(root) => root,
            other => {
                report.invalid_field(format!(
                    "an inventory must be a mapping with {VARS_KEY}, {WORKLOADS_KEY} and {HOSTS_KEY}, found {}",
                    other.kind()
                ));
                return Self::default();
            }
        };
        for key in root.keys() {
            if ![VARS_KEY, WORKLOADS_KEY, HOSTS_KEY].contains(&key.as_str()) {
                report.field(key).invalid_field(format!(
                    "unknown top-level key, expected one of {VARS_KEY}, {WORKLOADS_KEY} or {HOSTS_KEY}"
                ));
            }
        }

        let vars = ClusterVars::from_value(
            root.get(VARS_KEY).unwrap_or(&Value::Null),
            &mut report.field(VARS_KEY),
        );
        let hosts = read_hosts(
            root.get(HOSTS_KEY).unwrap_or(&Value::Null),
            &mut report.field(HOSTS_KEY),
        );
        let catalog =
            WorkloadCatalog::from_value(root.get(WORKLOADS_KEY).unwrap_or(&Value::Null), &vars, found);
        debug!(
            hosts = hosts.len(),
            workloads = catalog.definitions().len(),
            "read inventory"
        );
        Self {
            vars,
            catalog,
            hosts,
        }
    }
}

fn read_hosts(value: &Value, report: &mut Report) -> Vec<Host> {
    match value {
        Value::Null => Vec::new(),
        Value::Mapping(hosts) => hosts
            .iter()
            .filter_map(|(id, block)| {
                let location = Location::host(id);
                Host::from_value(id, block, &mut report.scoped(&location, id))
            })
            .collect(),
        other => {
            report.invalid_field(format!(
                "hosts must be a mapping keyed by host id, found {}",
                other.kind()
            ));
            Vec::new()
        }
    }
}
