//! Call graph over the procedures of a program.
//!
//! Used to find what an entry point can reach and to order procedures
//! callee-first when propagating per-procedure facts to callers.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use lockwatch_ir::Program;

use crate::domain::HostCall;

/// Call graph representation.
pub struct CallGraph {
    /// Edges: caller -> list of callees with bodies
    edges: HashMap<String, Vec<String>>,
    /// All procedures with bodies
    all_procedures: HashSet<String>,
}

impl CallGraph {
    /// Build a call graph from the procedure bodies of `program`.
    ///
    /// Calls into the host API and into bodiless declarations are not edges:
    /// the analysis never descends into them.
    pub fn from_program(program: &Program) -> Self {
        let with_body: HashSet<String> = program
            .procedures
            .iter()
            .filter(|p| !p.is_declaration())
            .map(|p| p.name.clone())
            .collect();

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for proc in program.procedures.iter().filter(|p| !p.is_declaration()) {
            let callees: Vec<String> = proc
                .callees()
                .into_iter()
                .filter(|c| with_body.contains(c) && HostCall::classify(c).is_none())
                .collect();
            if !callees.is_empty() {
                edges.insert(proc.name.clone(), callees);
            }
        }

        Self {
            edges,
            all_procedures: with_body,
        }
    }

    pub fn callees(&self, caller: &str) -> &[String] {
        self.edges.get(caller).map_or(&[], Vec::as_slice)
    }

    /// Procedures calling `callee` directly, sorted.
    pub fn callers(&self, callee: &str) -> BTreeSet<String> {
        self.edges
            .iter()
            .filter(|(_, callees)| callees.iter().any(|c| c == callee))
            .map(|(caller, _)| caller.clone())
            .collect()
    }

    /// Procedures reachable from `root`, including `root`, in breadth-first order.
    pub fn reachable_from(&self, root: &str) -> Vec<String> {
        if !self.all_procedures.contains(root) {
            return Vec::new();
        }
        let mut seen = HashSet::from([root.to_string()]);
        let mut queue = VecDeque::from([root.to_string()]);
        let mut order = Vec::new();
        while let Some(proc) = queue.pop_front() {
            for callee in self.callees(&proc) {
                if seen.insert(callee.clone()) {
                    queue.push_back(callee.clone());
                }
            }
            order.push(proc);
        }
        order
    }

    /// Transitive callers of `proc`, excluding `proc` itself unless recursive.
    pub fn transitive_callers(&self, proc: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([proc.to_string()]);
        while let Some(current) = queue.pop_front() {
            for caller in self.callers(&current) {
                if result.insert(caller.clone()) {
                    queue.push_back(caller);
                }
            }
        }
        result
    }

    /// Compute a callee-first ordering of procedures.
    ///
    /// Uses Kahn's algorithm. If cycles are detected, the remaining
    /// procedures are appended in name order and a warning is emitted.
    pub fn topological_order(&self) -> Vec<String> {
        let mut out_degree: HashMap<&str, usize> = HashMap::new();
        let mut reverse_edges: HashMap<&str, Vec<&str>> = HashMap::new();

        for proc in &self.all_procedures {
            out_degree.insert(proc.as_str(), 0);
        }
        for (caller, callees) in &self.edges {
            for callee in callees {
                *out_degree.entry(caller.as_str()).or_insert(0) += 1;
                reverse_edges
                    .entry(callee.as_str())
                    .or_default()
                    .push(caller.as_str());
            }
        }

        // Leaves first; sort each frontier so the order is deterministic.
        let mut ready: Vec<&str> = out_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();
        ready.sort_unstable();
        let mut queue: VecDeque<&str> = ready.into();

        let mut result = Vec::new();
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());
            let mut next = Vec::new();
            if let Some(callers) = reverse_edges.get(node) {
                for caller in callers {
                    if let Some(deg) = out_degree.get_mut(caller) {
                        *deg -= 1;
                        if *deg == 0 {
                            next.push(*caller);
                        }
                    }
                }
            }
            next.sort_unstable();
            queue.extend(next);
        }

        if result.len() != self.all_procedures.len() {
            let mut remaining: Vec<String> = self
                .all_procedures
                .iter()
                .filter(|p| !result.contains(p))
                .cloned()
                .collect();
            remaining.sort();
            tracing::warn!(
                "Call graph cycle detected involving: {:?}. Breaking arbitrarily.",
                remaining
            );
            result.extend(remaining);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwatch_ir::{Block, Cmd, Procedure, Transfer};

    /// Helper: procedure whose single block calls each callee once.
    fn make_proc(name: &str, callees: &[&str]) -> Procedure {
        let mut proc = Procedure::new(name);
        let cmds = callees.iter().map(|c| Cmd::call(*c, vec![])).collect();
        proc.blocks.push(Block::new("entry", cmds, Transfer::Return));
        proc
    }

    fn make_program(procs: &[(&str, &[&str])]) -> Program {
        let mut program = Program::new();
        for (name, callees) in procs {
            program.add_procedure(make_proc(name, callees));
        }
        program
    }

    // ====== Construction tests ======

    #[test]
    fn host_api_and_declarations_are_not_edges() {
        let mut program = make_program(&[("ep", &["helper", "mutex_lock", "ext"])]);
        program.add_procedure(make_proc("helper", &[]));
        program.add_procedure(make_proc("mutex_lock", &[]));
        program.add_procedure(Procedure::new("ext"));
        let graph = CallGraph::from_program(&program);
        assert_eq!(graph.callees("ep"), ["helper".to_string()]);
    }

    // ====== Reachability tests ======

    #[test]
    fn reachable_is_breadth_first() {
        let program = make_program(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &[]), ("d", &[])]);
        let graph = CallGraph::from_program(&program);
        assert_eq!(graph.reachable_from("a"), vec!["a", "b", "c", "d"]);
        assert_eq!(graph.reachable_from("c"), vec!["c"]);
        assert!(graph.reachable_from("missing").is_empty());
    }

    #[test]
    fn reachable_terminates_on_recursion() {
        let program = make_program(&[("a", &["b"]), ("b", &["a"])]);
        let graph = CallGraph::from_program(&program);
        assert_eq!(graph.reachable_from("a"), vec!["a", "b"]);
    }

    #[test]
    fn transitive_callers_walks_up() {
        let program = make_program(&[("a", &["b"]), ("b", &["c"]), ("c", &[]), ("x", &["c"])]);
        let graph = CallGraph::from_program(&program);
        let callers: Vec<_> = graph.transitive_callers("c").into_iter().collect();
        assert_eq!(callers, vec!["a", "b", "x"]);
    }

    // ====== Topological order tests ======

    #[test]
    fn callees_come_before_callers() {
        let program = make_program(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let order = CallGraph::from_program(&program).topological_order();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn cycle_is_broken_and_all_nodes_present() {
        let program = make_program(&[("a", &["b"]), ("b", &["a"]), ("leaf", &[])]);
        let order = CallGraph::from_program(&program).topological_order();
        assert_eq!(order, vec!["leaf", "a", "b"]);
    }
}
