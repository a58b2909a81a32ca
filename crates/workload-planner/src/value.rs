//! The tagged configuration tree that inventories are read from, and its deep merge.
//!
//! Loaders (YAML, JSON, ...) deserialize straight into [`Value`]. Mapping keys are kept sorted, so everything derived
//! from a tree is deterministic regardless of the key order of the source document.
use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::{
    fragment::{FromFragment, ValidationError, Validator},
    merge::{self, Merge},
};

pub type Mapping = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// A node of a parsed configuration tree.
///
/// [`Value::Null`] marks an absent value: it never overrides anything when merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Scalar(Scalar),
    Sequence(Vec<Value>),
    #[serde(deserialize_with = "deserialize_mapping")]
    Mapping(Mapping),
}

/// Mapping keys may be any scalar (`1: ...`, `{'cpu', 0.1}`), they are kept as their string representation.
fn deserialize_mapping<'de, D>(deserializer: D) -> Result<Mapping, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = BTreeMap::<MappingKey, Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|(MappingKey(key), value)| (key, value))
        .collect())
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct MappingKey(String);

impl<'de> Deserialize<'de> for MappingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let key = match Scalar::deserialize(deserializer)? {
            Scalar::String(key) => key,
            Scalar::Bool(key) => key.to_string(),
            Scalar::Integer(key) => key.to_string(),
            Scalar::Float(key) => key.to_string(),
        };
        Ok(Self(key))
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(string)) => Some(string),
            _ => None,
        }
    }

    /// Returns the value as a number, if it is an integer or a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(Scalar::Integer(int)) => Some(*int as f64),
            Self::Scalar(Scalar::Float(float)) => Some(*float),
            _ => None,
        }
    }

    /// Returns the value as a non-negative integer.
    ///
    /// Floats are accepted as long as they have no fractional part, since some loaders write `2.0` for `2`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Scalar(Scalar::Integer(int)) => u64::try_from(*int).ok(),
            Self::Scalar(Scalar::Float(float))
                if float.fract() == 0.0 && *float >= 0.0 && *float <= u64::MAX as f64 =>
            {
                Some(*float as u64)
            }
            _ => None,
        }
    }

    /// Short description of the node kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(Scalar::Bool(_)) => "boolean",
            Self::Scalar(Scalar::Integer(_)) => "integer",
            Self::Scalar(Scalar::Float(_)) => "float",
            Self::Scalar(Scalar::String(_)) => "string",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }

    /// Looks up a nested value, following mapping keys.
    pub fn pointer<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Option<&Self> {
        keys.into_iter()
            .try_fold(self, |value, key| value.as_mapping()?.get(key))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Scalar(Scalar::Bool(value)) => write!(f, "{value}"),
            Self::Scalar(Scalar::Integer(value)) => write!(f, "{value}"),
            Self::Scalar(Scalar::Float(value)) => write!(f, "{value}"),
            Self::Scalar(Scalar::String(value)) => write!(f, "{value:?}"),
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Mapping(mapping) => {
                f.write_str("{")?;
                for (i, (key, value)) in mapping.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Integer(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<Mapping> for Value {
    fn from(value: Mapping) -> Self {
        Self::Mapping(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Sequence(value.into_iter().map(Into::into).collect())
    }
}

impl Merge for Value {
    fn merge(&mut self, defaults: &Self) {
        match (self, defaults) {
            (Self::Mapping(overrides), Self::Mapping(defaults)) => {
                Merge::merge(overrides, defaults);
            }
            (this @ Self::Null, defaults) => this.clone_from(defaults),
            // scalars and sequences are replaced as a whole, so is a mapping replaced by a scalar
            _ => {}
        }
    }
}

/// Free-form values are passed through validation untouched.
impl FromFragment for Value {
    type Fragment = Self;
    type RequiredFragment = Self;

    fn from_fragment(
        fragment: Self::Fragment,
        _validator: Validator,
    ) -> Result<Self, ValidationError> {
        Ok(fragment)
    }
}

/// Deep-merges `overrides` on top of `base`.
///
/// - two mappings are merged key by key, keys present on one side only are kept
/// - a [`Value::Null`] override keeps `base`
/// - anything else in `overrides` replaces `base`
pub fn merge(base: &Value, overrides: &Value) -> Value {
    merge::merge(overrides.clone(), base)
}

/// Merges `layers`, ordered from lowest to highest precedence.
///
/// Equivalent to folding [`merge`] over the layers, starting from [`Value::Null`].
pub fn merge_chain<'a>(layers: impl IntoIterator<Item = &'a Value>) -> Value {
    layers
        .into_iter()
        .fold(Value::Null, |merged, layer| merge(&merged, layer))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).expect("test fixture must be valid YAML")
    }

    #[test]
    fn parse_tags() {
        let value = parse(indoc! {"
            count: 2
            cpu: 0.5
            enabled: true
            name: redis
            nothing: ~
            ports: [1, 2]
        "});
        let mapping = value.as_mapping().unwrap();
        assert_eq!(mapping["count"], Value::from(2_i64));
        assert_eq!(mapping["cpu"], Value::from(0.5));
        assert_eq!(mapping["enabled"], Value::from(true));
        assert_eq!(mapping["name"], Value::from("redis"));
        assert_eq!(mapping["nothing"], Value::Null);
        assert_eq!(mapping["ports"], Value::from(vec![1_i64, 2]));
    }

    #[test]
    fn scalar_keys_are_read_as_strings() {
        let value = parse("{1: a, true: b, 'cpu', 0.1}");
        assert_eq!(
            value.as_mapping().unwrap().keys().collect::<Vec<_>>(),
            vec!["0.1", "1", "cpu", "true"]
        );
        assert_eq!(value.pointer(["0.1"]), Some(&Value::Null));

        let json: Value = serde_json::from_str(r#"{"1": {"2": 3}}"#).unwrap();
        assert_eq!(json.pointer(["1", "2"]), Some(&Value::from(3_i64)));
    }

    #[test]
    fn override_replaces_leaf_and_keeps_siblings() {
        let base = parse("resources: {cpu: 1, ram: 1, disk: 1}");
        let overrides = parse("resources: {cpu: 0.5}");
        assert_eq!(
            merge(&base, &overrides),
            parse("resources: {cpu: 0.5, ram: 1, disk: 1}")
        );
    }

    #[test]
    fn scalar_override_is_honored_even_if_zero() {
        let merged = merge(&parse("count: 3"), &parse("count: 0"));
        assert_eq!(merged.pointer(["count"]), Some(&Value::from(0_i64)));
    }

    #[rstest]
    #[case::null_keeps_base("a: 1", "a: ~", "a: 1")]
    #[case::absent_keeps_base("a: 1", "b: 2", "{a: 1, b: 2}")]
    #[case::sequences_are_replaced("a: [1, 2, 3]", "a: [4]", "a: [4]")]
    #[case::scalar_replaces_mapping("a: {b: 1}", "a: 5", "a: 5")]
    #[case::mapping_replaces_scalar("a: 5", "a: {b: 1}", "a: {b: 1}")]
    #[case::base_missing("~", "a: 1", "a: 1")]
    #[case::nested("a: {b: {c: 1, d: 2}}", "a: {b: {d: 3}}", "a: {b: {c: 1, d: 3}}")]
    fn merge_rules(#[case] base: &str, #[case] overrides: &str, #[case] expected: &str) {
        assert_eq!(merge(&parse(base), &parse(overrides)), parse(expected));
    }

    #[test]
    fn merge_chain_equals_pairwise_merges() {
        let layers = [
            parse("{a: 1, b: {c: 1}}"),
            parse("{b: {d: 2}}"),
            parse("{a: 3, b: {c: ~}}"),
        ];
        let pairwise = merge(&merge(&layers[0], &layers[1]), &layers[2]);
        assert_eq!(merge_chain(&layers), pairwise);
        assert_eq!(pairwise, parse("{a: 3, b: {c: 1, d: 2}}"));
    }

    #[test]
    fn merge_is_deterministic() {
        let base = parse("{z: 1, a: {y: 2, b: 3}}");
        let overrides = parse("{a: {b: 4}, m: [1]}");
        let first = serde_json::to_string(&merge(&base, &overrides)).unwrap();
        let second = serde_json::to_string(&merge(&base, &overrides)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, r#"{"a":{"b":4,"y":2},"m":[1],"z":1}"#);
    }

    #[rstest]
    #[case("3", Some(3))]
    #[case("3.0", Some(3))]
    #[case("3.5", None)]
    #[case("-1", None)]
    #[case("'3'", None)]
    fn as_u64(#[case] yaml: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse(yaml).as_u64(), expected);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(
            parse("{a: [1, 'x'], b: ~, c: 0.5}").to_string(),
            r#"{a: [1, "x"], b: null, c: 0.5}"#
        );
    }
}
