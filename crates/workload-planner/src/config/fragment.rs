//! Fragments are partially assembled parts of a workload specification. Mandatory values may still be missing and
//! quantities may still be out of range. Fragments are [`validate`]d into their ["full"](`FromFragment`) type once
//! every layer has been merged.
//!
//! Fragment types are typically generated using the [`#[derive(Fragment)]`](`derive@Fragment`) macro.
use std::{
    collections::BTreeMap,
    fmt::{Display, Write},
};

use snafu::Snafu;

use super::merge::Atomic;

#[cfg(doc)]
use super::merge::Merge;

pub use workload_planner_derive::Fragment;

/// Contains context used for generating validation errors
///
/// Constructed internally in [`validate`]
pub struct Validator<'a> {
    ident: Option<&'a dyn Display>,
    parent: Option<&'a Validator<'a>>,
}

impl Validator<'_> {
    /// Creates a `Validator` for a subfield of the current object
    pub fn field<'b>(&'b self, ident: &'b dyn Display) -> Validator<'b> {
        Validator {
            ident: Some(ident),
            parent: Some(self),
        }
    }

    fn error_problem(self, problem: ValidationProblem) -> ValidationError {
        let mut idents = Vec::new();
        let mut curr = Some(&self);
        while let Some(curr_some) = curr {
            if let Some(ident) = curr_some.ident {
                idents.push(ident.to_string());
            }
            curr = curr_some.parent;
        }
        idents.reverse();
        ValidationError {
            path: FieldPath { idents },
            problem,
        }
    }

    /// Returns an error indicating that the `Validator` refers to a required field that is currently not provided
    pub fn error_required(self) -> ValidationError {
        self.error_problem(ValidationProblem::FieldRequired)
    }

    /// Returns an error indicating that a quantity is below zero
    pub fn error_negative_quantity(self, value: f64) -> ValidationError {
        self.error_problem(ValidationProblem::NegativeQuantity { value })
    }

    /// Returns an error indicating that a quantity is NaN or infinite
    pub fn error_non_finite_quantity(self) -> ValidationError {
        self.error_problem(ValidationProblem::NonFiniteQuantity)
    }
}

/// Dotted path from the root of a tree to one of its fields, such as `hosts.node-1.workloads`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    idents: Vec<String>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a new path pointing at the child `ident` of `self`.
    pub fn join(&self, ident: impl Display) -> Self {
        let mut idents = self.idents.clone();
        idents.push(ident.to_string());
        Self { idents }
    }

    /// Appends all segments of `other` to `self`.
    pub fn concat(&self, other: &Self) -> Self {
        let mut idents = self.idents.clone();
        idents.extend(other.idents.iter().cloned());
        Self { idents }
    }
}

impl<S: Into<String>> FromIterator<S> for FieldPath {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            idents: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.idents.is_empty() {
            return f.write_str("<root>");
        }
        for (i, ident) in self.idents.iter().enumerate() {
            if i > 0 {
                f.write_char('.')?;
            }
            f.write_str(ident)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Snafu)]
#[snafu(display("failed to validate {path}"))]
/// An error that occurred when validating an object.
///
/// It is constructed by calling one of the `error_*` methods on [`Validator`], such as [`Validator::error_required`].
pub struct ValidationError {
    path: FieldPath,
    #[snafu(source)]
    problem: ValidationProblem,
}

impl ValidationError {
    /// Path of the offending field, relative to the fragment that was validated
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn problem(&self) -> &ValidationProblem {
        &self.problem
    }
}

/// A problem that was discovered during validation, with no additional context.
#[derive(Debug, PartialEq, Snafu)]
pub enum ValidationProblem {
    #[snafu(display("field is required"))]
    FieldRequired,

    #[snafu(display("quantity must not be negative, got {value}"))]
    NegativeQuantity { value: f64 },

    #[snafu(display("quantity must be a finite number"))]
    NonFiniteQuantity,
}

/// A type that can be constructed by validating a "fragment" type.
///
/// This is intended to be used together with [`Merge`]: fragments are read from several layers (built-in defaults,
/// cluster defaults, variants, host overrides), merged, and only then validated into the type implementing `FromFragment`.
///
/// This will typically be derived using the [`Fragment`] macro, rather than implemented manually.
pub trait FromFragment: Sized {
    /// The fragment type of `Self`.
    ///
    /// For [`Atomic`] types this should be [`Option`](`Option<Self>`).
    ///
    /// For complex structs, this should be a variant of `Self` where each field is replaced by its respective `Fragment` type. This can be derived using
    /// [`Fragment`].
    type Fragment;
    /// A variant of [`Self::Fragment`] that is used when the container already provides a way to indicate that a value is optional.
    ///
    /// For [`Atomic`]s this will typically be `Self`. For complex structs this will typically be [`Self::Fragment`].
    type RequiredFragment: Into<Self::Fragment>;

    /// Try to validate a [`Self::Fragment`] into `Self`.
    ///
    /// `validator` contains additional error reporting context, such as the path to the field from the root fragment. It is created by
    /// [`validate`].
    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError>;
}
impl<T: Atomic> FromFragment for T {
    type Fragment = Option<T>;
    type RequiredFragment = T;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        fragment.ok_or_else(|| validator.error_required())
    }
}
impl<K, V: FromFragment> FromFragment for BTreeMap<K, V>
where
    K: Eq + Ord + Display,
{
    type Fragment = BTreeMap<K, V::RequiredFragment>;
    type RequiredFragment = BTreeMap<K, V::RequiredFragment>;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        fragment
            .into_iter()
            .map(|(k, v)| {
                let validator = validator.field(&k);
                let v = V::from_fragment(v.into(), validator)?;
                Ok((k, v))
            })
            .collect()
    }
}
impl<T: FromFragment> FromFragment for Option<T> {
    type Fragment = Option<T::RequiredFragment>;
    type RequiredFragment = Option<T::RequiredFragment>;

    fn from_fragment(
        fragment: Self::Fragment,
        validator: Validator,
    ) -> Result<Self, ValidationError> {
        if let Some(fragment) = fragment {
            T::from_fragment(fragment.into(), validator).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Validates a [`Fragment`](`FromFragment::Fragment`), and turns it into its corresponding [`FromFragment`] type if successful.
pub fn validate<T: FromFragment>(fragment: T::Fragment) -> Result<T, ValidationError> {
    T::from_fragment(
        fragment,
        Validator {
            ident: None,
            parent: None,
        },
    )
}
