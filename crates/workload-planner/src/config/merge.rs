use std::collections::{BTreeMap, btree_map};

pub use workload_planner_derive::Merge;

/// A type that can be merged with a lower-precedence copy of itself.
///
/// The receiver holds the overrides and `defaults` the layer below. Values that are set on the receiver win,
/// everything else falls back to `defaults`. Composite values recurse.
///
/// # Example
///
/// ```
/// # use workload_planner::config::merge::Merge;
/// #[derive(Merge, Debug, PartialEq)]
/// struct Limits {
///     count: Option<u32>,
///     slo: Option<f64>,
/// }
///
/// let mut host = Limits {
///     count: Some(0),
///     slo: None,
/// };
/// host.merge(&Limits {
///     count: Some(3),
///     slo: Some(250.0),
/// });
/// assert_eq!(host, Limits {
///     count: Some(0),    // set on the host, so it wins
///     slo: Some(250.0),  // inherited
/// });
/// ```
///
/// # Options
///
/// [`Atomic`] fields (numbers, strings) must be wrapped in [`Option`], where [`None`] means "not set on this
/// layer". Composite fields (nested fragments, maps) should not be optional.
pub trait Merge {
    /// Merge with `defaults`, preferring values from `self` if they are set there
    fn merge(&mut self, defaults: &Self);
}

impl<K: Ord + Clone, V: Merge + Clone> Merge for BTreeMap<K, V> {
    fn merge(&mut self, defaults: &Self) {
        for (k, default_v) in defaults {
            match self.entry(k.clone()) {
                btree_map::Entry::Occupied(mut entry) => entry.get_mut().merge(default_v),
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(default_v.clone());
                }
            }
        }
    }
}

/// Moving version of [`Merge::merge`]
pub fn merge<T: Merge>(mut overrides: T, defaults: &T) -> T {
    overrides.merge(defaults);
    overrides
}

/// A marker trait for types that are merged atomically (as one single value) rather than
/// trying to merge each field individually
pub trait Atomic: Clone {}
impl Atomic for u8 {}
impl Atomic for u16 {}
impl Atomic for u32 {}
impl Atomic for u64 {}
impl Atomic for usize {}
impl Atomic for i8 {}
impl Atomic for i16 {}
impl Atomic for i32 {}
impl Atomic for i64 {}
impl Atomic for isize {}
impl Atomic for f32 {}
impl Atomic for f64 {}
impl Atomic for bool {}
impl Atomic for String {}
impl Atomic for &str {}

impl<T: Atomic> Merge for Option<T> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_none() {
            self.clone_from(defaults);
        }
    }
}
