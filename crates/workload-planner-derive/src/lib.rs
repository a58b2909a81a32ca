//! Derive macros for the layered configuration system in `workload_planner::config`.
//!
//! Both macros assume that the runtime traits live at `::workload_planner::config::{fragment, merge}`.
//! Code inside `workload_planner` itself (or tests) can point them elsewhere with
//! `#[fragment(path_overrides(fragment = "..."))]` and `#[merge(path_overrides(merge = "..."))]`.
use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod fragment;
mod merge;

/// Derives `Merge` for structs, field by field.
///
/// See `workload_planner::config::merge::Merge` for the semantics.
#[proc_macro_derive(Merge, attributes(merge))]
pub fn derive_merge(input: TokenStream) -> TokenStream {
    merge::derive(parse_macro_input!(input as DeriveInput)).into()
}

/// Generates a `{Name}Fragment` mirror type and implements `FromFragment` for the annotated struct.
///
/// Attributes for the generated type can be forwarded with `#[fragment_attrs(...)]`, both on the
/// struct and on individual fields.
#[proc_macro_derive(Fragment, attributes(fragment, fragment_attrs))]
pub fn derive_fragment(input: TokenStream) -> TokenStream {
    fragment::derive(parse_macro_input!(input as DeriveInput)).into()
}
