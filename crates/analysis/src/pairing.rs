//! Which entry points must be race-checked together.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::domain;
use crate::entry_point::{DriverModel, EntryPoint};

/// Unordered pair of entry points checked together. `(a, b)` and `(b, a)`
/// are the same pair.
#[derive(Debug, Clone, Serialize)]
pub struct EntryPointPair {
    pub first: String,
    pub second: String,
}

impl EntryPointPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.first == entry || self.second == entry
    }

    /// Name of the synthetic checker procedure.
    pub fn checker_name(&self) -> String {
        format!("check${}${}", self.first, self.second)
    }

    fn sorted(&self) -> (&str, &str) {
        if self.first <= self.second {
            (&self.first, &self.second)
        } else {
            (&self.second, &self.first)
        }
    }
}

impl PartialEq for EntryPointPair {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for EntryPointPair {}

impl Hash for EntryPointPair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted().hash(state);
    }
}

impl fmt::Display for EntryPointPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// Whether the host can run `a` and `b` concurrently in a way worth checking.
///
/// Symmetric in its arguments.
pub fn can_be_paired(a: &EntryPoint, b: &EntryPoint) -> bool {
    if a.is_init || b.is_init || a.is_exit || b.is_exit {
        return false;
    }
    if !network_compatible(a, b) || !network_compatible(b, a) {
        return false;
    }
    can_run_concurrently(a, b)
}

/// `#net` clones only meet the network API; a network-window entry point
/// meets the network API only through its clone.
fn network_compatible(a: &EntryPoint, b: &EntryPoint) -> bool {
    if a.is_clone {
        return !b.is_clone && b.is_network_api();
    }
    !(a.has_network_window() && b.is_network_api())
}

fn can_run_concurrently(a: &EntryPoint, b: &EntryPoint) -> bool {
    if !a.host_locks.is_disjoint(&b.host_locks) {
        return false;
    }
    if domain::is_power_management_api(&a.host_function)
        && domain::is_power_management_api(&b.host_function)
    {
        return false;
    }
    if domain::is_called_with_netpoll_disabled(&a.host_function)
        && domain::is_called_with_netpoll_disabled(&b.host_function)
    {
        return false;
    }
    !domain::is_operations_serialized(&a.module, &a.host_function, &b.module, &b.host_function)
}

/// Every pairable combination of entry points, self-pairs included, each
/// exactly once, in declaration order.
pub fn enumerate_pairs(model: &DriverModel) -> Vec<EntryPointPair> {
    let eps = model.entry_points();
    let mut pairs = Vec::new();
    for (i, a) in eps.iter().enumerate() {
        for b in &eps[i..] {
            if can_be_paired(a, b) {
                pairs.push(EntryPointPair::new(&a.name, &b.name));
            }
        }
    }
    tracing::info!(
        entry_points = eps.len(),
        pairs = pairs.len(),
        "Enumerated entry point pairs"
    );
    pairs
}
