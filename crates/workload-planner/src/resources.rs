//! Resource quantities (`cpu`, `ram`, `disk`, ...) requested by a workload or one of its components.
//!
//! Resource names are free-form, quantities are non-negative finite numbers. Layers are merged key by key, there is no
//! arithmetic between layers.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::{
        fragment::{self, FromFragment, ValidationError, Validator},
        merge::{self, Merge},
    },
    validation::Report,
    value::Value,
};

/// Validated resource quantities, keyed by resource name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSpec(pub BTreeMap<String, f64>);

impl ResourceSpec {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, quantity)| (name.as_str(), *quantity))
    }
}

/// Partial resource quantities of one layer. [`None`] means "not set on this layer".
#[derive(Clone, Debug, Default, Merge, PartialEq)]
#[merge(path_overrides(merge = "crate::config::merge"))]
pub struct ResourceSpecFragment(pub BTreeMap<String, Option<f64>>);

impl ResourceSpecFragment {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sets `name` on this layer
    pub fn with(mut self, name: impl Into<String>, quantity: f64) -> Self {
        self.0.insert(name.into(), Some(quantity));
        self
    }

    /// Reads a `resources` block from the tree.
    ///
    /// The block must be a mapping of numbers, a `null` block is absent. Anything else is reported as an invalid
    /// resource value and skipped. That includes `null` quantities, which is what a set literal such as
    /// `{'cpu', '0.1'}` reads as.
    pub fn from_value(value: &Value, report: &mut Report) -> Self {
        let Value::Mapping(mapping) = value else {
            if !value.is_null() {
                report.invalid_resource_value(format!(
                    "expected a mapping of resource quantities, found {}",
                    value.kind()
                ));
            }
            return Self::default();
        };
        let mut quantities = BTreeMap::new();
        let mut missing = Vec::new();
        for (name, quantity) in mapping {
            match quantity {
                Value::Null => missing.push(name.as_str()),
                quantity => match quantity.as_f64() {
                    Some(quantity) => {
                        quantities.insert(name.clone(), Some(quantity));
                    }
                    None => report.field(name).invalid_resource_value(format!(
                        "quantity must be a number, found {} {quantity}",
                        quantity.kind()
                    )),
                },
            }
        }
        if !missing.is_empty() {
            report.invalid_resource_value(format!(
                "no quantity given for {missing:?}, expected a mapping of resource quantities such as {{cpu: 0.1}}"
            ));
        }
        Self(quantities)
    }
}

impl From<BTreeMap<String, f64>> for ResourceSpecFragment {
    fn from(quantities: BTreeMap<String, f64>) -> Self {
        Self(
            quantities
                .into_iter()
                .map(|(name, quantity)| (name, Some(quantity)))
                .collect(),
        )
    }
}

impl FromFragment for ResourceSpec {
    type Fragment = ResourceSpecFragment;
    type RequiredFragment = ResourceSpecFragment;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        fragment
            .0
            .into_iter()
            .filter_map(|(name, quantity)| quantity.map(|quantity| (name, quantity)))
            .map(|(name, quantity)| {
                let validator = validator.field(&name);
                if !quantity.is_finite() {
                    return Err(validator.error_non_finite_quantity());
                }
                if quantity < 0.0 {
                    return Err(validator.error_negative_quantity(quantity));
                }
                Ok((name, quantity))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

/// Merges `overrides` on top of `base`, key by key.
pub fn merge(base: &ResourceSpecFragment, overrides: &ResourceSpecFragment) -> ResourceSpecFragment {
    merge::merge(overrides.clone(), base)
}

/// Checks that every quantity set in `fragment` is a non-negative finite number.
///
/// The returned error names the first offending resource.
pub fn validate(fragment: ResourceSpecFragment) -> Result<ResourceSpec, ValidationError> {
    fragment::validate(fragment)
}
