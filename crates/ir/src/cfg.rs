//! Control-flow queries over a procedure's blocks.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::program::Procedure;

/// Successor and predecessor maps of one procedure body.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    entry: Option<String>,
    successors: BTreeMap<String, Vec<String>>,
    predecessors: BTreeMap<String, Vec<String>>,
}

impl Cfg {
    pub fn build(proc: &Procedure) -> Self {
        let mut successors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut predecessors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for block in &proc.blocks {
            successors.entry(block.label.clone()).or_default();
            predecessors.entry(block.label.clone()).or_default();
        }
        for block in &proc.blocks {
            for target in block.transfer.targets() {
                successors
                    .entry(block.label.clone())
                    .or_default()
                    .push(target.clone());
                predecessors
                    .entry(target.clone())
                    .or_default()
                    .push(block.label.clone());
            }
        }
        Self {
            entry: proc.entry_label().map(str::to_string),
            successors,
            predecessors,
        }
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn successors(&self, label: &str) -> &[String] {
        self.successors.get(label).map_or(&[], Vec::as_slice)
    }

    pub fn predecessors(&self, label: &str) -> &[String] {
        self.predecessors.get(label).map_or(&[], Vec::as_slice)
    }

    /// Blocks reachable from the entry, in breadth-first order.
    pub fn reachable(&self) -> Vec<String> {
        let Some(entry) = &self.entry else {
            return Vec::new();
        };
        let mut seen = BTreeSet::from([entry.clone()]);
        let mut queue = VecDeque::from([entry.clone()]);
        let mut order = Vec::new();
        while let Some(label) = queue.pop_front() {
            for succ in self.successors(&label) {
                if seen.insert(succ.clone()) {
                    queue.push_back(succ.clone());
                }
            }
            order.push(label);
        }
        order
    }

    /// Targets of back edges found by a depth-first walk from the entry.
    ///
    /// Each such target is the header of a natural loop in a reducible
    /// graph; the result is sorted and deduplicated.
    pub fn loop_headers(&self) -> BTreeSet<String> {
        let mut headers = BTreeSet::new();
        let Some(entry) = &self.entry else {
            return headers;
        };
        let mut on_stack = BTreeSet::new();
        let mut done = BTreeSet::new();
        // Explicit stack of (label, next successor index) to avoid recursion.
        let mut stack: Vec<(String, usize)> = vec![(entry.clone(), 0)];
        on_stack.insert(entry.clone());
        while let Some((label, idx)) = stack.pop() {
            let succs = self.successors(&label);
            if idx < succs.len() {
                stack.push((label.clone(), idx + 1));
                let next = &succs[idx];
                if on_stack.contains(next) {
                    headers.insert(next.clone());
                } else if !done.contains(next) {
                    on_stack.insert(next.clone());
                    stack.push((next.clone(), 0));
                }
            } else {
                on_stack.remove(&label);
                done.insert(label);
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Transfer;
    use crate::program::Block;

    fn make_proc(edges: &[(&str, &[&str])]) -> Procedure {
        let mut proc = Procedure::new("p");
        for (label, targets) in edges {
            let transfer = if targets.is_empty() {
                Transfer::Return
            } else {
                Transfer::Goto(targets.iter().map(|t| t.to_string()).collect())
            };
            proc.blocks.push(Block::new(*label, vec![], transfer));
        }
        proc
    }

    #[test]
    fn predecessors_mirror_successors() {
        let cfg = Cfg::build(&make_proc(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &[])]));
        assert_eq!(cfg.successors("a"), ["b".to_string(), "c".to_string()]);
        assert_eq!(cfg.predecessors("c"), ["a".to_string(), "b".to_string()]);
        assert!(cfg.predecessors("a").is_empty());
    }

    #[test]
    fn reachable_skips_dead_blocks() {
        let cfg = Cfg::build(&make_proc(&[("a", &["b"]), ("b", &[]), ("dead", &["b"])]));
        assert_eq!(cfg.reachable(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn loop_header_found_for_simple_loop() {
        let cfg = Cfg::build(&make_proc(&[
            ("entry", &["head"]),
            ("head", &["body", "exit"]),
            ("body", &["head"]),
            ("exit", &[]),
        ]));
        assert_eq!(cfg.loop_headers(), BTreeSet::from(["head".to_string()]));
    }

    #[test]
    fn diamond_has_no_loop_header() {
        let cfg = Cfg::build(&make_proc(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]));
        assert!(cfg.loop_headers().is_empty());
    }

    #[test]
    fn self_loop_is_its_own_header() {
        let cfg = Cfg::build(&make_proc(&[("a", &["a", "b"]), ("b", &[])]));
        assert_eq!(cfg.loop_headers(), BTreeSet::from(["a".to_string()]));
    }
}
