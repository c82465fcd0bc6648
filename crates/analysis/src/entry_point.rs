//! Entry points of a driver.
//!
//! [`DriverModel`] joins the program with its metadata: each callback binding
//! becomes an [`EntryPoint`] carrying the host locks held on entry and its
//! place in the network window. Network-window callbacks also get a `#net`
//! clone so they can be paired with the network API.

use std::collections::{BTreeMap, BTreeSet};

use lockwatch_ir::Program;
use serde::Serialize;

use crate::domain::{self, HostLock};
use crate::error::AnalysisError;
use crate::metadata::DriverMetadata;

/// Suffix of the clone used to pair network-window entry points with the network API.
pub const NET_CLONE_SUFFIX: &str = "#net";

/// One host callback implemented by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    /// Unique name; equals `procedure` except for `#net` clones.
    pub name: String,
    /// Procedure implementing the callback.
    pub procedure: String,
    pub host_function: String,
    pub module: String,
    pub is_init: bool,
    pub is_exit: bool,
    pub is_clone: bool,
    /// Host locks held on every invocation.
    pub host_locks: BTreeSet<HostLock>,
    pub called_with_network_disabled: bool,
    pub going_to_disable_network: bool,
}

impl EntryPoint {
    fn new(procedure: &str, host_function: &str, module: &str, has_net_ops: bool) -> Self {
        let host_locks = HostLock::ALL
            .into_iter()
            .filter(|l| l.is_held_around(host_function, module))
            .collect();
        Self {
            name: procedure.to_string(),
            procedure: procedure.to_string(),
            host_function: host_function.to_string(),
            module: module.to_string(),
            is_init: domain::is_init(host_function),
            is_exit: domain::is_exit(host_function),
            is_clone: false,
            host_locks,
            called_with_network_disabled: domain::is_called_with_network_disabled(host_function),
            going_to_disable_network: domain::is_going_to_disable_network(
                host_function,
                has_net_ops,
            ),
        }
    }

    fn net_clone(&self) -> Self {
        Self {
            name: format!("{}{NET_CLONE_SUFFIX}", self.name),
            is_clone: true,
            ..self.clone()
        }
    }

    pub fn holds_host_lock(&self, lock: HostLock) -> bool {
        self.host_locks.contains(&lock)
    }

    pub fn is_network_api(&self) -> bool {
        domain::is_network_api(&self.host_function)
    }

    /// Whether this entry point's data path window is bounded by the network
    /// being disabled around it.
    pub fn has_network_window(&self) -> bool {
        self.called_with_network_disabled || self.going_to_disable_network
    }
}

/// Read/write counts of one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccessCounts {
    pub reads: usize,
    pub writes: usize,
}

impl AccessCounts {
    pub fn total(&self) -> usize {
        self.reads + self.writes
    }
}

/// Facts about an entry point discovered while instrumenting it. Flags only
/// ever go from `false` to `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryPointFlags {
    pub holds_lock: bool,
    pub calls_power_lock: bool,
    pub calls_rtnl_assertion: bool,
    pub calls_tx_implication: bool,
    pub changes_registration: bool,
    pub changes_network: bool,
    pub accesses: BTreeMap<String, AccessCounts>,
}

impl EntryPointFlags {
    pub fn record_read(&mut self, region: &str) {
        self.accesses.entry(region.to_string()).or_default().reads += 1;
    }

    pub fn record_write(&mut self, region: &str) {
        self.accesses.entry(region.to_string()).or_default().writes += 1;
    }

    pub fn accesses_region(&self, region: &str) -> bool {
        self.accesses.get(region).is_some_and(|c| c.total() > 0)
    }

    pub fn writes_region(&self, region: &str) -> bool {
        self.accesses.get(region).is_some_and(|c| c.writes > 0)
    }

    pub fn accessed_regions(&self) -> impl Iterator<Item = &str> {
        self.accesses
            .iter()
            .filter(|(_, c)| c.total() > 0)
            .map(|(r, _)| r.as_str())
    }
}

/// All entry points of a driver, in metadata declaration order.
#[derive(Debug, Clone, Default)]
pub struct DriverModel {
    entry_points: Vec<EntryPoint>,
    init: Option<String>,
}

impl DriverModel {
    /// Bind metadata to procedures of `program`.
    ///
    /// Fails on a declared entry point with no body and on a second init
    /// entry point. Repeated bindings of the same procedure keep the first.
    pub fn build(program: &Program, metadata: &DriverMetadata) -> Result<Self, AnalysisError> {
        let has_net_ops = metadata.has_module("net_device_ops");
        let mut model = DriverModel::default();
        for module in &metadata.modules {
            for decl in &module.entry_points {
                let proc = program
                    .procedure(&decl.procedure)
                    .ok_or_else(|| AnalysisError::UnknownEntryPoint(decl.procedure.clone()))?;
                if proc.is_declaration() {
                    return Err(AnalysisError::EntryPointWithoutBody(decl.procedure.clone()));
                }
                if model.entry_point(&decl.procedure).is_some() {
                    tracing::debug!(entry = %decl.procedure, "Skipping repeated entry point binding");
                    continue;
                }
                let ep = EntryPoint::new(
                    &decl.procedure,
                    &decl.host_function,
                    &module.name,
                    has_net_ops,
                );
                if ep.is_init {
                    if let Some(first) = &model.init {
                        return Err(AnalysisError::DuplicateInitEntryPoint {
                            first: first.clone(),
                            second: ep.name.clone(),
                        });
                    }
                    model.init = Some(ep.name.clone());
                }
                let clone = ep.has_network_window().then(|| ep.net_clone());
                model.entry_points.push(ep);
                model.entry_points.extend(clone);
            }
        }
        if model.init.is_none() {
            tracing::warn!("Driver metadata declares no init entry point");
        }
        tracing::info!(
            entry_points = model.entry_points.len(),
            "Built driver model"
        );
        Ok(model)
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|ep| ep.name == name)
    }

    pub fn init_entry_point(&self) -> Option<&EntryPoint> {
        self.init.as_deref().and_then(|n| self.entry_point(n))
    }

    /// Whether `procedure` implements any entry point.
    pub fn is_entry_procedure(&self, procedure: &str) -> bool {
        self.entry_points.iter().any(|ep| ep.procedure == procedure)
    }
}
