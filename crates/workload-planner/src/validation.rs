//! Violations found while resolving an inventory, and the naming rules that resolution enforces.
//!
//! Resolution never stops at the first problem. Every independent [`Violation`] is collected into [`Violations`],
//! which orders them by kind (in declaration order of [`Violation`]) and then by discovery order.

use std::{collections::BTreeMap, fmt::Display, sync::LazyLock};

use const_format::concatcp;
use regex::Regex;
use snafu::Snafu;

use crate::{
    config::fragment::{FieldPath, ValidationError},
    value::Value,
};

/// Minimal length required by RFC 1123 is 63. Up to 255 allowed, unsupported by most orchestrators.
const RFC_1123_LABEL_MAX_LENGTH: usize = 63;
pub const RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const RFC_1123_LABEL_ERROR_MSG: &str = "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character";

/// Workload kinds become namespaces once `_` is replaced by `-`, so they may not contain `-` themselves.
const WORKLOAD_KIND_MAX_LENGTH: usize = 52;
pub const WORKLOAD_KIND_FMT: &str = "[a-z0-9]([a-z0-9_]*[a-z0-9])?";
const WORKLOAD_KIND_ERROR_MSG: &str = "a workload kind must consist of lower case alphanumeric characters or '_', and must start and end with an alphanumeric character";

/// Same as [`RFC_1123_LABEL_FMT`] but allows dots, used for variant names
const VARIANT_NAME_FMT: &str = concatcp!(RFC_1123_LABEL_FMT, "(\\.", RFC_1123_LABEL_FMT, ")*");
const VARIANT_NAME_MAX_LENGTH: usize = 253;
const VARIANT_NAME_ERROR_MSG: &str = "a variant name must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character";

static RFC_1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_LABEL_FMT}$")).expect("failed to compile RFC 1123 label regex")
});

static WORKLOAD_KIND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{WORKLOAD_KIND_FMT}$")).expect("failed to compile workload kind regex")
});

static VARIANT_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{VARIANT_NAME_FMT}$")).expect("failed to compile variant name regex")
});

type Result<T = (), E = NameErrors> = std::result::Result<T, E>;

/// A collection of problems with a single name.
#[derive(Debug, PartialEq, Eq)]
pub struct NameErrors(Vec<NameError>);

impl Display for NameErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}
impl std::error::Error for NameErrors {}

/// A single problem with a name.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum NameError {
    #[snafu(transparent)]
    Regex { source: RegexError },

    #[snafu(display("input is {length} bytes long but must be no more than {max_length}"))]
    TooLong { length: usize, max_length: usize },
}

#[derive(Debug, PartialEq, Eq)]
pub struct RegexError {
    /// The primary error message.
    msg: &'static str,

    /// The regex that the input must match.
    regex: &'static str,

    /// Examples of valid inputs (if non-empty).
    examples: &'static [&'static str],
}

impl Display for RegexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            msg,
            regex,
            examples,
        } = self;
        write!(f, "{msg} (")?;
        for (i, example) in examples.iter().enumerate() {
            let prefix = match i {
                0 => "e.g.",
                _ => "or",
            };
            write!(f, "{prefix} {example:?}, ")?;
        }
        write!(f, "regex used for validation is {regex:?})")
    }
}

impl std::error::Error for RegexError {}

fn validate_str_length(value: &str, max_length: usize) -> Result<(), NameError> {
    if value.len() > max_length {
        TooLongSnafu {
            length: value.len(),
            max_length,
        }
        .fail()
    } else {
        Ok(())
    }
}

fn validate_str_regex(
    value: &str,
    regex: &'static Regex,
    error_msg: &'static str,
    examples: &'static [&'static str],
) -> Result<(), NameError> {
    if regex.is_match(value) {
        Ok(())
    } else {
        Err(RegexError {
            msg: error_msg,
            regex: regex
                .as_str()
                // Clean up start/end-of-line markers
                .trim_start_matches('^')
                .trim_end_matches('$'),
            examples,
        }
        .into())
    }
}

/// Returns [`Ok`] if *all* validations are [`Ok`], otherwise returns all errors.
fn validate_all(validations: impl IntoIterator<Item = Result<(), NameError>>) -> Result {
    let errors = validations
        .into_iter()
        .filter_map(std::result::Result::err)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(NameErrors(errors))
    }
}

/// Tests whether `value` can be used as a namespace, such as `redis-rpc-perf-3`.
pub fn is_rfc_1123_label(value: &str) -> Result {
    validate_all([
        validate_str_length(value, RFC_1123_LABEL_MAX_LENGTH),
        validate_str_regex(
            value,
            &RFC_1123_LABEL_REGEX,
            RFC_1123_LABEL_ERROR_MSG,
            &["redis-rpc-perf-1", "123-abc"],
        ),
    ])
}

/// Tests whether `value` is a valid workload kind name, such as `cassandra_stress`.
pub fn is_workload_kind(value: &str) -> Result {
    validate_all([
        validate_str_length(value, WORKLOAD_KIND_MAX_LENGTH),
        validate_str_regex(
            value,
            &WORKLOAD_KIND_REGEX,
            WORKLOAD_KIND_ERROR_MSG,
            &["redis_rpc_perf", "specjbb"],
        ),
    ])
}

/// Tests whether `value` is a valid variant name, such as `big` or `v1.small`.
pub fn is_variant_name(value: &str) -> Result {
    validate_all([
        validate_str_length(value, VARIANT_NAME_MAX_LENGTH),
        validate_str_regex(
            value,
            &VARIANT_NAME_REGEX,
            VARIANT_NAME_ERROR_MSG,
            &["default", "big", "v1.small"],
        ),
    ])
}

/// Where in the inventory a [`Violation`] was found.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub host: Option<String>,
    pub workload: Option<String>,
    pub variant: Option<String>,
}

impl Location {
    pub fn inventory() -> Self {
        Self::default()
    }

    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    pub fn workload(workload: impl Into<String>) -> Self {
        Self {
            workload: Some(workload.into()),
            ..Self::default()
        }
    }

    pub fn with_workload(&self, workload: impl Into<String>) -> Self {
        Self {
            workload: Some(workload.into()),
            ..self.clone()
        }
    }

    pub fn with_variant(&self, variant: impl Into<String>) -> Self {
        Self {
            variant: Some(variant.into()),
            ..self.clone()
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            host,
            workload,
            variant,
        } = self;
        let parts = [("host", host), ("workload", workload), ("variant", variant)]
            .into_iter()
            .filter_map(|(label, value)| value.as_ref().map(|value| format!("{label} {value:?}")))
            .collect::<Vec<_>>();
        if parts.is_empty() {
            f.write_str("inventory")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// A single configuration defect. None of them are retryable, they all require the inventory to be fixed.
///
/// The declaration order is the reporting order.
#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Violation {
    #[snafu(display("{location}: {path}: count must be a non-negative integer, got {value}"))]
    InvalidCount {
        location: Location,
        path: FieldPath,
        value: String,
    },

    #[snafu(display("{location}: {path}: invalid resource value: {reason}"))]
    InvalidResourceValue {
        location: Location,
        path: FieldPath,
        reason: String,
    },

    #[snafu(display(
        "{location}: {path}: env_uniq_id {env_uniq_id} is used by more than one host: {hosts:?}"
    ))]
    DuplicateHostId {
        location: Location,
        path: FieldPath,
        env_uniq_id: u32,
        hosts: Vec<String>,
    },

    #[snafu(display("{location}: {path}: unknown workload kind {workload:?}"))]
    UnknownWorkload {
        location: Location,
        path: FieldPath,
        workload: String,
    },

    #[snafu(display("{location}: {path}: workload {workload:?} has no variant {variant:?}"))]
    UnknownVariant {
        location: Location,
        path: FieldPath,
        workload: String,
        variant: String,
    },

    #[snafu(display("{location}: {path}: structural override conflict: {reason}"))]
    StructuralOverrideConflict {
        location: Location,
        path: FieldPath,
        reason: String,
    },

    #[snafu(display("{location}: {path}: {reason}"))]
    InvalidField {
        location: Location,
        path: FieldPath,
        reason: String,
    },
}

impl Violation {
    /// Position of this kind of violation in reports
    pub fn rank(&self) -> u8 {
        match self {
            Self::InvalidCount { .. } => 0,
            Self::InvalidResourceValue { .. } => 1,
            Self::DuplicateHostId { .. } => 2,
            Self::UnknownWorkload { .. } => 3,
            Self::UnknownVariant { .. } => 4,
            Self::StructuralOverrideConflict { .. } => 5,
            Self::InvalidField { .. } => 6,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Self::InvalidCount { location, .. }
            | Self::InvalidResourceValue { location, .. }
            | Self::DuplicateHostId { location, .. }
            | Self::UnknownWorkload { location, .. }
            | Self::UnknownVariant { location, .. }
            | Self::StructuralOverrideConflict { location, .. }
            | Self::InvalidField { location, .. } => location,
        }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            Self::InvalidCount { path, .. }
            | Self::InvalidResourceValue { path, .. }
            | Self::DuplicateHostId { path, .. }
            | Self::UnknownWorkload { path, .. }
            | Self::UnknownVariant { path, .. }
            | Self::StructuralOverrideConflict { path, .. }
            | Self::InvalidField { path, .. } => path,
        }
    }

    /// Converts a failed fragment validation into a violation.
    ///
    /// `base` is the inventory path of the validated fragment, the error only knows the path relative to it.
    pub fn from_validation(location: Location, base: &FieldPath, error: &ValidationError) -> Self {
        use crate::config::fragment::ValidationProblem;

        let path = base.concat(error.path());
        let reason = error.problem().to_string();
        match error.problem() {
            ValidationProblem::NegativeQuantity { .. } | ValidationProblem::NonFiniteQuantity => {
                InvalidResourceValueSnafu {
                    location,
                    path,
                    reason,
                }
                .build()
            }
            ValidationProblem::FieldRequired => {
                InvalidFieldSnafu {
                    location,
                    path,
                    reason,
                }
                .build()
            }
        }
    }
}

/// Every violation found in one resolution, in reporting order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    /// Orders `found` by kind. Violations of the same kind keep their discovery order.
    pub fn new(mut found: Vec<Violation>) -> Self {
        found.sort_by_key(Violation::rank);
        Self(found)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// Returns `Ok(value)` if nothing was found.
    pub fn into_result<T>(found: Vec<Violation>, value: T) -> std::result::Result<T, Self> {
        if found.is_empty() {
            Ok(value)
        } else {
            Err(Self::new(found))
        }
    }
}

impl Display for Violations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "found {} violation(s)", self.0.len())?;
        for violation in &self.0 {
            write!(f, "\n  {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

impl IntoIterator for Violations {
    type IntoIter = std::vec::IntoIter<Violation>;
    type Item = Violation;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Violations {
    type IntoIter = std::slice::Iter<'a, Violation>;
    type Item = &'a Violation;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Collects violations while a part of the inventory tree is being read.
///
/// Tracks the [`Location`] and the [`FieldPath`] of the part currently being read, so that readers only have to say
/// what is wrong.
pub struct Report<'a> {
    location: &'a Location,
    path: FieldPath,
    found: &'a mut Vec<Violation>,
}

impl<'a> Report<'a> {
    pub fn new(location: &'a Location, path: FieldPath, found: &'a mut Vec<Violation>) -> Self {
        Self {
            location,
            path,
            found,
        }
    }

    /// Creates a `Report` for the child `ident` of the current part
    pub fn field(&mut self, ident: impl Display) -> Report<'_> {
        Report {
            location: self.location,
            path: self.path.join(ident),
            found: &mut *self.found,
        }
    }

    /// Creates a `Report` for the child `ident`, found at a more specific `location`
    pub fn scoped<'b>(&'b mut self, location: &'b Location, ident: impl Display) -> Report<'b> {
        Report {
            location,
            path: self.path.join(ident),
            found: &mut *self.found,
        }
    }

    /// Creates a `Report` for the current part, found at a more specific `location`
    pub fn relocated<'b>(&'b mut self, location: &'b Location) -> Report<'b> {
        Report {
            location,
            path: self.path.clone(),
            found: &mut *self.found,
        }
    }

    pub fn location(&self) -> &Location {
        self.location
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Number of violations collected so far, across all reports sharing the same sink
    pub fn found(&self) -> usize {
        self.found.len()
    }

    pub fn invalid_count(&mut self, value: &Value) {
        let violation = InvalidCountSnafu {
            location: self.location.clone(),
            path: self.path.clone(),
            value: value.to_string(),
        }
        .build();
        self.found.push(violation);
    }

    pub fn invalid_resource_value(&mut self, reason: impl Into<String>) {
        let violation = InvalidResourceValueSnafu {
            location: self.location.clone(),
            path: self.path.clone(),
            reason,
        }
        .build();
        self.found.push(violation);
    }

    pub fn unknown_workload(&mut self, workload: impl Into<String>) {
        let violation = UnknownWorkloadSnafu {
            location: self.location.clone(),
            path: self.path.clone(),
            workload,
        }
        .build();
        self.found.push(violation);
    }

    pub fn unknown_variant(&mut self, workload: impl Into<String>, variant: impl Into<String>) {
        let violation = UnknownVariantSnafu {
            location: self.location.clone(),
            path: self.path.clone(),
            workload,
            variant,
        }
        .build();
        self.found.push(violation);
    }

    pub fn structural_conflict(&mut self, reason: impl Into<String>) {
        let violation = StructuralOverrideConflictSnafu {
            location: self.location.clone(),
            path: self.path.clone(),
            reason,
        }
        .build();
        self.found.push(violation);
    }

    pub fn invalid_field(&mut self, reason: impl Into<String>) {
        let violation = InvalidFieldSnafu {
            location: self.location.clone(),
            path: self.path.clone(),
            reason,
        }
        .build();
        self.found.push(violation);
    }

    /// Records a failed fragment validation of the current part.
    pub fn validation_failed(&mut self, error: &ValidationError) {
        let violation = Violation::from_validation(self.location.clone(), &self.path, error);
        self.found.push(violation);
    }
}

/// Reports every `env_uniq_id` that is shared by more than one host.
///
/// `hosts` yields `(host id, env_uniq_id)` pairs, the reports follow the order of the ids. Each report points at the
/// first of the hosts sharing the id and lists all of them.
pub fn duplicate_env_ids<'a>(hosts: impl IntoIterator<Item = (&'a str, u32)>) -> Vec<Violation> {
    let mut by_id = BTreeMap::<u32, Vec<String>>::new();
    for (host, env_uniq_id) in hosts {
        by_id.entry(env_uniq_id).or_default().push(host.to_string());
    }
    by_id
        .into_iter()
        .filter(|(_, hosts)| hosts.len() > 1)
        .filter_map(|(env_uniq_id, mut hosts)| {
            hosts.sort();
            let first = hosts.first()?.clone();
            Some(
                DuplicateHostIdSnafu {
                    location: Location::host(&first),
                    path: FieldPath::from_iter(["hosts", first.as_str(), "env_uniq_id"]),
                    env_uniq_id,
                    hosts,
                }
                .build(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("redis-rpc-perf-1")]
    #[case("a")]
    #[case("1")]
    #[case("cassandra-stress-12")]
    fn rfc_1123_label_valid(#[case] value: &str) {
        assert!(is_rfc_1123_label(value).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("-a")]
    #[case("a-")]
    #[case("Redis")]
    #[case("redis_rpc")]
    #[case(&"a".repeat(64))]
    fn rfc_1123_label_invalid(#[case] value: &str) {
        assert!(is_rfc_1123_label(value).is_err());
    }

    #[rstest]
    #[case("redis_rpc_perf", true)]
    #[case("specjbb", true)]
    #[case("tensorflow_benchmark_train", true)]
    #[case("redis-rpc-perf", false)]
    #[case("_redis", false)]
    #[case("redis_", false)]
    #[case("Redis", false)]
    fn workload_kind_names(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(is_workload_kind(value).is_ok(), valid);
    }

    #[rstest]
    #[case("default", true)]
    #[case("v1.small", true)]
    #[case("big-mem", true)]
    #[case("Big", false)]
    #[case("big_mem", false)]
    fn variant_names(#[case] value: &str, #[case] valid: bool) {
        assert_eq!(is_variant_name(value).is_ok(), valid);
    }

    #[test]
    fn too_long_reports_both_problems() {
        let value = format!("{}-", "a".repeat(64));
        let NameErrors(errors) = is_rfc_1123_label(&value).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0],
            NameError::TooLong {
                length: 65,
                max_length: 63
            }
        );
    }

    #[test]
    fn violations_are_ordered_by_kind_then_discovery() {
        let mut found = Vec::new();
        let location = Location::host("10.0.0.1");
        let mut report = Report::new(&location, FieldPath::root(), &mut found);
        report.field("b").invalid_field("second field");
        report.field("a").unknown_workload("foo");
        report.field("c").invalid_field("third field");
        report.field("d").invalid_count(&Value::from(-1_i64));

        let violations = Violations::new(found);
        let ranks = violations.iter().map(Violation::rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![0, 3, 6, 6]);
        let paths = violations
            .iter()
            .map(|violation| violation.path().to_string())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn duplicate_env_ids_are_grouped() {
        let found = duplicate_env_ids([("10.0.0.2", 1), ("10.0.0.1", 1), ("10.0.0.3", 2)]);
        assert_eq!(
            found,
            vec![Violation::DuplicateHostId {
                location: Location::host("10.0.0.1"),
                path: FieldPath::from_iter(["hosts", "10.0.0.1", "env_uniq_id"]),
                env_uniq_id: 1,
                hosts: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            }]
        );
    }

    #[test]
    fn location_display() {
        assert_eq!(Location::inventory().to_string(), "inventory");
        assert_eq!(
            Location::host("10.0.0.1")
                .with_workload("specjbb")
                .with_variant("big")
                .to_string(),
            r#"host "10.0.0.1", workload "specjbb", variant "big""#
        );
    }
}
