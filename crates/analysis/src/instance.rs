//! Per-side copies of an entry point's procedures.
//!
//! A pair `(a, b)` is analyzed as two instances, `a$1` and `b$2`. Each
//! instance owns a renamed copy of every procedure reachable from its entry
//! point, so both sides of a self-pair get their own shadow state.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use lockwatch_ir::{Cfg, Cmd, Procedure, Program};
use serde::Serialize;

use crate::call_graph::CallGraph;
use crate::context::AnalysisContext;
use crate::domain::HostCall;
use crate::entry_point::{EntryPoint, EntryPointFlags};
use crate::error::AnalysisError;
use crate::pipeline::Pass;
use crate::resolver::Scope;

/// One side of a pair.
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    /// `<entry>$<side>`
    pub name: String,
    pub side: u8,
    pub entry: EntryPoint,
    /// Copy of the entry procedure.
    pub root: String,
    /// Every procedure copy owned by this instance, the root included.
    pub procedures: BTreeSet<String>,
    /// Copy -> original procedure.
    pub origins: BTreeMap<String, String>,
    pub flags: EntryPointFlags,
    /// Locks this instance acquires or releases explicitly.
    pub operated_locks: BTreeSet<String>,
    /// Locks this instance only ever asserts to be held.
    pub implied_locks: BTreeSet<String>,
}

impl Instance {
    /// Suffix appended to shadow variables and helpers, `_$<instance>`.
    pub fn shadow_suffix(&self) -> String {
        format!("_${}", self.name)
    }

    pub fn is_root(&self, proc: &str) -> bool {
        self.root == proc
    }

    pub fn owns(&self, proc: &str) -> bool {
        self.procedures.contains(proc)
    }

    /// Resolution scope restricted to this instance's copies.
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            key: &self.name,
            procedures: Some(&self.procedures),
            origins: Some(&self.origins),
        }
    }

    /// Locks whose deadlock check is skipped.
    pub fn deadlock_exempt(&self) -> impl Iterator<Item = &str> {
        self.implied_locks
            .difference(&self.operated_locks)
            .map(String::as_str)
    }
}

fn copy_name(proc: &str, side: u8) -> String {
    format!("{proc}${side}")
}

/// Copy every procedure reachable from `entry` into `program` for `side`.
pub fn create_instance(
    program: &mut Program,
    graph: &CallGraph,
    entry: &EntryPoint,
    side: u8,
) -> Result<Instance, AnalysisError> {
    let reachable = graph.reachable_from(&entry.procedure);
    if reachable.is_empty() {
        return Err(AnalysisError::EntryPointWithoutBody(entry.procedure.clone()));
    }
    let reachable_set: BTreeSet<&str> = reachable.iter().map(String::as_str).collect();

    let mut procedures = BTreeSet::new();
    let mut origins = BTreeMap::new();
    for original in &reachable {
        let proc = program
            .procedure(original)
            .ok_or_else(|| AnalysisError::MissingProcedure(original.clone()))?;
        let copy = copy_procedure(proc, side, &reachable_set);
        procedures.insert(copy.name.clone());
        origins.insert(copy.name.clone(), original.clone());
        program.add_procedure(copy);
    }

    let instance = Instance {
        name: format!("{}${side}", entry.name),
        side,
        entry: entry.clone(),
        root: copy_name(&entry.procedure, side),
        procedures,
        origins,
        flags: EntryPointFlags::default(),
        operated_locks: BTreeSet::new(),
        implied_locks: BTreeSet::new(),
    };
    tracing::debug!(
        instance = %instance.name,
        procedures = instance.procedures.len(),
        "Created instance"
    );
    Ok(instance)
}

fn copy_procedure(proc: &Procedure, side: u8, reachable: &BTreeSet<&str>) -> Procedure {
    let mut copy = proc.clone();
    copy.name = copy_name(&proc.name, side);
    for block in &mut copy.blocks {
        for cmd in &mut block.cmds {
            if let Cmd::Call { callee, .. } = cmd
                && reachable.contains(callee.as_str())
            {
                *callee = copy_name(callee, side);
            }
        }
    }
    copy
}

/// Creates both instances of the context's pair.
pub struct SlicingPass;

impl Pass for SlicingPass {
    fn name(&self) -> &'static str {
        "slicing"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        let graph = CallGraph::from_program(&ctx.program);
        let mut instances = Vec::with_capacity(2);
        for (side, entry_name) in [(1u8, &ctx.pair.first), (2u8, &ctx.pair.second)] {
            let entry = ctx
                .model
                .entry_point(entry_name)
                .ok_or_else(|| AnalysisError::UnknownEntryPoint(entry_name.clone()))?
                .clone();
            instances.push(create_instance(&mut ctx.program, &graph, &entry, side)?);
        }
        ctx.instances = instances;
        ctx.resolver_cache.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Network window
// ---------------------------------------------------------------------------

/// A command position `(procedure, block, index)`.
pub type CommandSite = (String, String, usize);

/// Commands of a `#net` clone that cannot run while the network data path is
/// up. Their accesses are not instrumented.
///
/// For an entry point about to disable the network, that is everything after
/// the first `netif_device_detach`; for one called with the network disabled,
/// everything before `netif_device_attach`. The window is propagated to the
/// call sites of the procedure containing the marker.
pub fn outside_network_window(program: &Program, instance: &Instance) -> BTreeSet<CommandSite> {
    let entry = &instance.entry;
    if !entry.is_clone {
        return BTreeSet::new();
    }
    let (marker, drop_after) = if entry.going_to_disable_network {
        (HostCall::DisableNetwork, true)
    } else if entry.called_with_network_disabled {
        (HostCall::EnableNetwork, false)
    } else {
        return BTreeSet::new();
    };

    let mut worklist: VecDeque<CommandSite> = VecDeque::new();
    for name in &instance.procedures {
        let Some(proc) = program.procedure(name) else {
            continue;
        };
        worklist.extend(
            proc.commands()
                .filter(|(_, _, c)| c.callee().and_then(HostCall::classify) == Some(marker))
                .map(|(label, idx, _)| (name.clone(), label.to_string(), idx)),
        );
    }

    let mut dropped = BTreeSet::new();
    if worklist.is_empty() {
        if !drop_after {
            // The network is never re-enabled.
            for name in &instance.procedures {
                if let Some(proc) = program.procedure(name) {
                    dropped.extend(
                        proc.commands()
                            .map(|(label, idx, _)| (name.clone(), label.to_string(), idx)),
                    );
                }
            }
        }
        return dropped;
    }

    let mut propagated: BTreeSet<String> = BTreeSet::new();
    while let Some((proc_name, label, idx)) = worklist.pop_front() {
        let Some(proc) = program.procedure(&proc_name) else {
            continue;
        };
        dropped.extend(
            sliced_commands(proc, &label, idx, drop_after)
                .into_iter()
                .map(|(l, i)| (proc_name.clone(), l, i)),
        );
        if !propagated.insert(proc_name.clone()) {
            continue;
        }
        for caller in &instance.procedures {
            let Some(caller_proc) = program.procedure(caller) else {
                continue;
            };
            worklist.extend(
                caller_proc
                    .commands()
                    .filter(|(_, _, c)| c.callee() == Some(proc_name.as_str()))
                    .map(|(l, i, _)| (caller.clone(), l.to_string(), i)),
            );
        }
    }
    dropped
}

/// Commands strictly after (or strictly before) position `idx` of `label`.
fn sliced_commands(
    proc: &Procedure,
    label: &str,
    idx: usize,
    after: bool,
) -> Vec<(String, usize)> {
    let cfg = Cfg::build(proc);
    let forward = reach(label, |l| cfg.successors(l));
    let blocks: BTreeSet<String> = if after {
        forward.into_iter().filter(|l| l != label).collect()
    } else {
        reach(label, |l| cfg.predecessors(l))
            .into_iter()
            .filter(|l| l != label && !forward.contains(l))
            .collect()
    };

    let mut out = Vec::new();
    for block in &proc.blocks {
        if block.label == label {
            let range: Vec<usize> = if after {
                (idx + 1..block.cmds.len()).collect()
            } else {
                (0..idx).collect()
            };
            out.extend(range.into_iter().map(|i| (block.label.clone(), i)));
        } else if blocks.contains(&block.label) {
            out.extend((0..block.cmds.len()).map(|i| (block.label.clone(), i)));
        }
    }
    out
}

/// Blocks reachable from `start` through `next`, excluding `start` unless on a cycle.
fn reach<'c>(start: &str, next: impl Fn(&str) -> &'c [String]) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&str> = next(start).iter().map(String::as_str).collect();
    while let Some(label) = queue.pop_front() {
        if seen.insert(label.to_string()) {
            queue.extend(next(label).iter().map(String::as_str));
        }
    }
    seen
}
