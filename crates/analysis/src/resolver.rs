//! Root-address resolution.
//!
//! Folds pointer arithmetic back to `base + offset` by walking reaching
//! definitions backwards through the control-flow graph. Resolution is best
//! effort: whenever the walk meets something it cannot fold it gives back the
//! original expression as [`Resolution::Unresolved`], which callers must treat
//! as "may alias anything".

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use lockwatch_ir::{
    BinOp, Cfg, Cmd, Expr, Lhs, Procedure, Program, base_function_name, is_region_name,
};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Separator used to qualify procedure-local roots with their procedure.
const LOCAL_ROOT_SEPARATOR: &str = "::";

/// A symbolic base address plus a constant byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RootAddress {
    pub base: Expr,
    pub offset: i128,
}

impl RootAddress {
    pub fn new(base: Expr, offset: i128) -> Self {
        Self { base, offset }
    }

    /// `base + offset`, always in this shape so resolving it again is a no-op.
    pub fn to_expr(&self) -> Expr {
        Expr::add(self.base.clone(), Expr::int(self.offset))
    }

    pub fn shifted(&self, delta: i128) -> Option<Self> {
        Some(Self {
            base: self.base.clone(),
            offset: self.offset.checked_add(delta)?,
        })
    }
}

/// Outcome of resolving one address expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Resolution {
    Resolved(RootAddress),
    /// The walk gave up; carries the expression it was asked about.
    Unresolved(Expr),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn root(&self) -> Option<&RootAddress> {
        match self {
            Resolution::Resolved(root) => Some(root),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            Resolution::Resolved(root) => root.to_expr(),
            Resolution::Unresolved(expr) => expr.clone(),
        }
    }
}

/// Where an expression is evaluated: before command `position` of block `label`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Site {
    pub label: String,
    pub position: usize,
}

impl Site {
    pub fn new(label: impl Into<String>, position: usize) -> Self {
        Self {
            label: label.into(),
            position,
        }
    }
}

/// One step of decomposing an address expression.
enum Step {
    Literal,
    Ident(String),
    /// `inner + delta`
    Offset(Expr, i128),
    Stop,
}

/// Function and operator names that keep a pointer linear.
fn decompose(expr: &Expr) -> Step {
    match expr {
        e if e.is_literal() => Step::Literal,
        Expr::Ident(name) => Step::Ident(name.clone()),
        Expr::Binary(BinOp::Add, l, r) => add_step(l, r),
        Expr::Binary(BinOp::Sub, l, r) => match r.as_int().and_then(i128::checked_neg) {
            Some(k) => Step::Offset((**l).clone(), k),
            None => Step::Stop,
        },
        Expr::Apply(func, args) => match (base_function_name(func), args.as_slice()) {
            ("$pa", [base, index, stride]) => {
                match (index.as_int(), stride.as_int()) {
                    (Some(i), Some(s)) => match i.checked_mul(s) {
                        Some(k) => Step::Offset(base.clone(), k),
                        None => Step::Stop,
                    },
                    _ => Step::Stop,
                }
            }
            ("$add", [l, r]) => add_step(l, r),
            ("$sub", [l, r]) => match r.as_int().and_then(i128::checked_neg) {
                Some(k) => Step::Offset(l.clone(), k),
                None => Step::Stop,
            },
            ("$bitcast", [inner]) => Step::Offset(inner.clone(), 0),
            _ => Step::Stop,
        },
        _ => Step::Stop,
    }
}

fn add_step(l: &Expr, r: &Expr) -> Step {
    match (l.as_int(), r.as_int()) {
        (_, Some(k)) => Step::Offset(l.clone(), k),
        (Some(k), None) => Step::Offset(r.clone(), k),
        (None, None) => Step::Stop,
    }
}

/// Nearest definition of a variable reaching a site.
enum Definition {
    /// No definition on any path: a formal, a global or an uninitialized local.
    None,
    /// `havoc` or call output: the variable's value is opaque from here.
    Opaque,
    Assign { site: Site, rhs: Expr },
    /// Different paths reach different definitions.
    Ambiguous,
}

/// Resolves address expressions inside one program.
pub struct Resolver<'p> {
    program: &'p Program,
    max_depth: usize,
    cfgs: std::cell::RefCell<FxHashMap<String, Cfg>>,
}

impl<'p> Resolver<'p> {
    pub fn new(program: &'p Program, max_depth: usize) -> Self {
        Self {
            program,
            max_depth,
            cfgs: std::cell::RefCell::new(FxHashMap::default()),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    fn cfg(&self, proc: &Procedure) -> Cfg {
        self.cfgs
            .borrow_mut()
            .entry(proc.name.clone())
            .or_insert_with(|| Cfg::build(proc))
            .clone()
    }

    /// Resolve `expr` evaluated at `site` inside `proc`.
    pub fn resolve(&self, proc: &Procedure, site: &Site, expr: &Expr) -> Resolution {
        let cfg = self.cfg(proc);
        let mut visited: HashSet<(Site, Expr)> = HashSet::new();
        let mut current = expr.clone();
        let mut offset: i128 = 0;
        let mut site = site.clone();

        for _ in 0..self.max_depth {
            match decompose(&current) {
                Step::Literal => return Resolution::Resolved(RootAddress::new(current, offset)),
                Step::Offset(inner, delta) => {
                    let Some(next) = offset.checked_add(delta) else {
                        return Resolution::Unresolved(expr.clone());
                    };
                    offset = next;
                    current = inner;
                }
                Step::Stop => return Resolution::Unresolved(expr.clone()),
                Step::Ident(name) => {
                    if is_region_name(&name) {
                        return Resolution::Unresolved(expr.clone());
                    }
                    if !visited.insert((site.clone(), current.clone())) {
                        tracing::trace!(proc = %proc.name, %name, "Resolution cycle");
                        return Resolution::Unresolved(expr.clone());
                    }
                    match reaching_definition(proc, &cfg, &site, &name) {
                        Definition::None | Definition::Opaque => {
                            let base = self.root_base(proc, &name);
                            return Resolution::Resolved(RootAddress::new(base, offset));
                        }
                        Definition::Ambiguous => return Resolution::Unresolved(expr.clone()),
                        Definition::Assign { site: def, rhs } => {
                            site = def;
                            current = rhs;
                        }
                    }
                }
            }
        }
        tracing::trace!(proc = %proc.name, "Resolution depth exhausted");
        Resolution::Unresolved(expr.clone())
    }

    /// Formals and globals are roots as they are; other names are qualified
    /// with their procedure so locals of different procedures never compare equal.
    fn root_base(&self, proc: &Procedure, name: &str) -> Expr {
        if proc.is_formal(name)
            || self.program.is_global_name(name)
            || name.contains(LOCAL_ROOT_SEPARATOR)
        {
            Expr::ident(name)
        } else {
            Expr::ident(format!("{}{LOCAL_ROOT_SEPARATOR}{name}", proc.name))
        }
    }

    /// Resolve `expr` and, when it bottoms out in a formal of `proc`, union the
    /// resolutions of the actual argument at every call site in `scope`.
    pub fn resolve_interprocedural(
        &self,
        scope: &Scope<'_>,
        proc: &Procedure,
        site: &Site,
        expr: &Expr,
        cache: &mut ResolverCache,
    ) -> BTreeSet<Resolution> {
        let mut in_progress = HashSet::new();
        self.resolve_lifted(scope, proc, site, expr, cache, &mut in_progress)
    }

    fn resolve_lifted(
        &self,
        scope: &Scope<'_>,
        proc: &Procedure,
        site: &Site,
        expr: &Expr,
        cache: &mut ResolverCache,
        in_progress: &mut HashSet<(String, String)>,
    ) -> BTreeSet<Resolution> {
        let local = self.resolve(proc, site, expr);
        let Some(root) = local.root() else {
            return BTreeSet::from([local]);
        };
        let formal = match &root.base {
            Expr::Ident(name) if proc.is_formal(name) => name.clone(),
            _ => return BTreeSet::from([local]),
        };
        let offset = root.offset;
        self.resolve_formal(scope, proc, &formal, cache, in_progress)
            .into_iter()
            .map(|r| match r {
                Resolution::Resolved(root) => match root.shifted(offset) {
                    Some(shifted) => Resolution::Resolved(shifted),
                    None => Resolution::Unresolved(expr.clone()),
                },
                Resolution::Unresolved(_) => Resolution::Unresolved(expr.clone()),
            })
            .collect()
    }

    fn resolve_formal(
        &self,
        scope: &Scope<'_>,
        proc: &Procedure,
        formal: &str,
        cache: &mut ResolverCache,
        in_progress: &mut HashSet<(String, String)>,
    ) -> BTreeSet<Resolution> {
        let key = (scope.key.to_string(), proc.name.clone(), formal.to_string());
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }
        let in_flight = (proc.name.clone(), formal.to_string());
        if !in_progress.insert(in_flight.clone()) {
            return BTreeSet::from([Resolution::Unresolved(Expr::ident(formal))]);
        }
        let Some(index) = proc.formal_index(formal) else {
            in_progress.remove(&in_flight);
            return BTreeSet::from([Resolution::Unresolved(Expr::ident(formal))]);
        };

        let mut result = BTreeSet::new();
        let mut found_site = false;
        for (caller, label, position, cmd) in self.program.call_sites(&proc.name) {
            if !scope.includes(&caller.name) {
                continue;
            }
            let Some(actual) = cmd.call_args().get(index) else {
                continue;
            };
            found_site = true;
            let site = Site::new(label, position);
            result.extend(self.resolve_lifted(scope, caller, &site, actual, cache, in_progress));
        }

        if !found_site {
            match scope.origin_of(&proc.name).and_then(|o| self.program.procedure(o)) {
                Some(original) if original.name != proc.name => {
                    let base_scope = Scope::whole_program();
                    result.extend(
                        self.resolve_formal(&base_scope, original, formal, cache, in_progress)
                            .into_iter()
                            .map(|r| match r {
                                Resolution::Resolved(root) => Resolution::Resolved(root),
                                Resolution::Unresolved(_) => {
                                    Resolution::Unresolved(Expr::ident(formal))
                                }
                            }),
                    );
                }
                _ => {
                    result.insert(Resolution::Resolved(RootAddress::new(Expr::ident(formal), 0)));
                }
            }
        }

        in_progress.remove(&in_flight);
        cache.insert(key, result.clone());
        result
    }
}

/// Find the definitions of `name` reaching `site`.
fn reaching_definition(proc: &Procedure, cfg: &Cfg, site: &Site, name: &str) -> Definition {
    let Some(block) = proc.block(&site.label) else {
        return Definition::None;
    };
    let limit = site.position.min(block.cmds.len());
    if let Some(def) = last_definition(&block.cmds[..limit], &block.label, name) {
        return def;
    }

    let entry = cfg.entry().unwrap_or_default();
    let mut reaches_entry = site.label == entry;
    let mut found: BTreeMap<(String, usize), Definition> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = cfg.predecessors(&site.label).iter().map(String::as_str).collect();
    if queue.is_empty() {
        reaches_entry = true;
    }

    while let Some(label) = queue.pop_front() {
        if !seen.insert(label) {
            continue;
        }
        let Some(pred) = proc.block(label) else {
            continue;
        };
        if let Some(def) = last_definition(&pred.cmds, label, name) {
            let key = match &def {
                Definition::Assign { site, .. } => (site.label.clone(), site.position),
                _ => (label.to_string(), usize::MAX),
            };
            found.insert(key, def);
            continue;
        }
        if label == entry {
            reaches_entry = true;
        }
        let preds = cfg.predecessors(label);
        if preds.is_empty() {
            reaches_entry = true;
        }
        queue.extend(preds.iter().map(String::as_str));
    }

    match (found.len(), reaches_entry) {
        (0, _) => Definition::None,
        (1, false) => found.into_values().next().unwrap_or(Definition::Ambiguous),
        _ => Definition::Ambiguous,
    }
}

/// Last command in `cmds` defining `name`.
fn last_definition(cmds: &[Cmd], label: &str, name: &str) -> Option<Definition> {
    cmds.iter().enumerate().rev().find_map(|(idx, cmd)| match cmd {
        Cmd::Assign {
            lhs: Lhs::Var(var),
            rhs,
        } if var == name => Some(Definition::Assign {
            site: Site::new(label, idx),
            rhs: rhs.clone(),
        }),
        _ if cmd.defined_vars().contains(&name) => Some(Definition::Opaque),
        _ => None,
    })
}

/// Which call sites count when lifting a formal to its actuals.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    /// Cache partition, e.g. an instance name; empty for the whole program.
    pub key: &'a str,
    /// Procedures whose call sites are considered; `None` means all.
    pub procedures: Option<&'a BTreeSet<String>>,
    /// Copy -> original procedure, consulted when a copy has no callers in scope.
    pub origins: Option<&'a BTreeMap<String, String>>,
}

impl<'a> Scope<'a> {
    pub fn whole_program() -> Self {
        Self {
            key: "",
            procedures: None,
            origins: None,
        }
    }

    pub fn includes(&self, proc: &str) -> bool {
        self.procedures.is_none_or(|set| set.contains(proc))
    }

    fn origin_of(&self, proc: &str) -> Option<&'a str> {
        self.origins?.get(proc).map(String::as_str)
    }
}

/// Memoized formal-parameter resolutions keyed by (scope, procedure, formal).
///
/// Entries are only valid for the program they were computed on and must
/// be dropped when procedures are renamed or copied.
#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: FxHashMap<(String, String, String), BTreeSet<Resolution>>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &(String, String, String)) -> Option<&BTreeSet<Resolution>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: (String, String, String), value: BTreeSet<Resolution>) {
        self.entries.entry(key).or_insert(value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwatch_ir::{Block, Transfer, Type, Variable};

    fn assign(var: &str, rhs: Expr) -> Cmd {
        Cmd::assign(Lhs::var(var), rhs)
    }

    fn make_proc(name: &str, params: &[&str], blocks: Vec<Block>) -> Procedure {
        let mut proc = Procedure::new(name);
        proc.params = params.iter().map(|p| Variable::new(*p, Type::Int)).collect();
        proc.blocks = blocks;
        proc
    }

    fn straight(cmds: Vec<Cmd>) -> Vec<Block> {
        vec![Block::new("bb0", cmds, Transfer::Return)]
    }

    fn resolve_at_end(program: &Program, proc: &str, expr: Expr) -> Resolution {
        let proc = program.procedure(proc).unwrap();
        let block = &proc.blocks[0];
        let resolver = Resolver::new(program, 64);
        resolver.resolve(proc, &Site::new(&block.label, block.cmds.len()), &expr)
    }

    fn program_with(procs: Vec<Procedure>) -> Program {
        let mut program = Program::new();
        for p in procs {
            program.add_procedure(p);
        }
        program
    }

    // ====== Folding tests ======

    #[test]
    fn pa_chain_folds_to_formal_plus_offset() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev"],
            straight(vec![
                assign("p", Expr::apply("$pa", vec![Expr::ident("dev"), Expr::int(1), Expr::int(8)])),
                assign("q", Expr::apply("$add.ref", vec![Expr::ident("p"), Expr::int(4)])),
            ]),
        )]);
        let r = resolve_at_end(&program, "f", Expr::ident("q"));
        assert_eq!(r, Resolution::Resolved(RootAddress::new(Expr::ident("dev"), 12)));
    }

    #[test]
    fn subtraction_folds_negative_offset() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev"],
            straight(vec![assign(
                "p",
                Expr::binary(BinOp::Sub, Expr::ident("dev"), Expr::int(16)),
            )]),
        )]);
        let r = resolve_at_end(&program, "f", Expr::ident("p"));
        assert_eq!(r.root().unwrap().offset, -16);
    }

    #[test]
    fn literal_is_its_own_root() {
        let program = program_with(vec![make_proc("f", &[], straight(vec![]))]);
        let r = resolve_at_end(&program, "f", Expr::int(4096));
        assert_eq!(r, Resolution::Resolved(RootAddress::new(Expr::int(4096), 0)));
    }

    #[test]
    fn resolved_form_is_idempotent() {
        let program = program_with(vec![make_proc("f", &["dev"], straight(vec![]))]);
        let first = resolve_at_end(&program, "f", Expr::add(Expr::ident("dev"), Expr::int(24)));
        let again = resolve_at_end(&program, "f", first.to_expr());
        assert_eq!(first, again);
        assert_eq!(again.to_expr(), Expr::add(Expr::ident("dev"), Expr::int(24)));
    }

    // ====== Stop condition tests ======

    #[test]
    fn region_load_is_unresolved() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev"],
            straight(vec![assign("p", Expr::select(Expr::ident("$M.0"), Expr::ident("dev")))]),
        )]);
        let r = resolve_at_end(&program, "f", Expr::ident("p"));
        assert_eq!(r, Resolution::Unresolved(Expr::ident("p")));
    }

    #[test]
    fn bitwise_operator_is_unresolved() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev"],
            straight(vec![assign(
                "p",
                Expr::apply("$and.ref", vec![Expr::ident("dev"), Expr::int(-8)]),
            )]),
        )]);
        assert!(!resolve_at_end(&program, "f", Expr::ident("p")).is_resolved());
    }

    #[test]
    fn non_literal_index_is_unresolved() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev", "i"],
            straight(vec![assign(
                "p",
                Expr::apply("$pa", vec![Expr::ident("dev"), Expr::ident("i"), Expr::int(8)]),
            )]),
        )]);
        assert!(!resolve_at_end(&program, "f", Expr::ident("p")).is_resolved());
    }

    #[test]
    fn self_assignment_resolves_to_entry_value() {
        let program = program_with(vec![make_proc(
            "f",
            &[],
            straight(vec![assign("p", Expr::ident("p"))]),
        )]);
        let r = resolve_at_end(&program, "f", Expr::ident("p"));
        assert_eq!(r, Resolution::Resolved(RootAddress::new(Expr::ident("f::p"), 0)));
    }

    #[test]
    fn reassignment_in_one_block_resolves() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev"],
            straight(vec![
                assign("p", Expr::ident("dev")),
                assign("p", Expr::add(Expr::ident("p"), Expr::int(8))),
                assign("p", Expr::add(Expr::ident("p"), Expr::int(4))),
            ]),
        )]);
        let r = resolve_at_end(&program, "f", Expr::ident("p"));
        assert_eq!(r, Resolution::Resolved(RootAddress::new(Expr::ident("dev"), 12)));
    }

    #[test]
    fn loop_carried_increment_terminates() {
        let blocks = vec![
            Block::new("entry", vec![assign("p", Expr::ident("dev"))], Transfer::Goto(vec!["head".into()])),
            Block::new(
                "head",
                vec![assign("p", Expr::add(Expr::ident("p"), Expr::int(8)))],
                Transfer::Goto(vec!["head".into(), "exit".into()]),
            ),
            Block::new("exit", vec![], Transfer::Return),
        ];
        let program = program_with(vec![make_proc("f", &["dev"], blocks)]);
        let proc = program.procedure("f").unwrap();
        let r = Resolver::new(&program, 64).resolve(proc, &Site::new("exit", 0), &Expr::ident("p"));
        assert!(!r.is_resolved());
    }

    #[test]
    fn diverging_definitions_are_ambiguous() {
        let blocks = vec![
            Block::new("entry", vec![], Transfer::Goto(vec!["a".into(), "b".into()])),
            Block::new("a", vec![assign("p", Expr::add(Expr::ident("dev"), Expr::int(8)))], Transfer::Goto(vec!["join".into()])),
            Block::new("b", vec![assign("p", Expr::add(Expr::ident("dev"), Expr::int(16)))], Transfer::Goto(vec!["join".into()])),
            Block::new("join", vec![], Transfer::Return),
        ];
        let program = program_with(vec![make_proc("f", &["dev"], blocks)]);
        let proc = program.procedure("f").unwrap();
        let r = Resolver::new(&program, 64).resolve(proc, &Site::new("join", 0), &Expr::ident("p"));
        assert!(!r.is_resolved());
    }

    #[test]
    fn agreeing_path_definition_resolves() {
        let blocks = vec![
            Block::new("entry", vec![assign("p", Expr::add(Expr::ident("dev"), Expr::int(8)))], Transfer::Goto(vec!["a".into(), "b".into()])),
            Block::new("a", vec![], Transfer::Goto(vec!["join".into()])),
            Block::new("b", vec![], Transfer::Goto(vec!["join".into()])),
            Block::new("join", vec![], Transfer::Return),
        ];
        let program = program_with(vec![make_proc("f", &["dev"], blocks)]);
        let proc = program.procedure("f").unwrap();
        let r = Resolver::new(&program, 64).resolve(proc, &Site::new("join", 0), &Expr::ident("p"));
        assert_eq!(r, Resolution::Resolved(RootAddress::new(Expr::ident("dev"), 8)));
    }

    #[test]
    fn call_output_is_a_qualified_local_root() {
        let mut call = Cmd::call("kzalloc", vec![Expr::int(64)]);
        if let Cmd::Call { outs, .. } = &mut call {
            outs.push("priv".into());
        }
        let program = program_with(vec![make_proc(
            "probe",
            &[],
            straight(vec![call, assign("l", Expr::add(Expr::ident("priv"), Expr::int(8)))]),
        )]);
        let r = resolve_at_end(&program, "probe", Expr::ident("l"));
        assert_eq!(
            r,
            Resolution::Resolved(RootAddress::new(Expr::ident("probe::priv"), 8))
        );
    }

    #[test]
    fn depth_bound_gives_up() {
        let program = program_with(vec![make_proc(
            "f",
            &["dev"],
            straight(vec![
                assign("a", Expr::ident("dev")),
                assign("b", Expr::ident("a")),
                assign("c", Expr::ident("b")),
            ]),
        )]);
        let proc = program.procedure("f").unwrap();
        let r = Resolver::new(&program, 2).resolve(proc, &Site::new("bb0", 3), &Expr::ident("c"));
        assert!(!r.is_resolved());
    }

    // ====== Interprocedural tests ======

    fn make_harness_program() -> Program {
        let callee = make_proc(
            "helper",
            &["lockp"],
            straight(vec![Cmd::call("mutex_lock", vec![Expr::ident("lockp")])]),
        );
        let caller_a = make_proc(
            "ep_a",
            &["dev"],
            straight(vec![Cmd::call("helper", vec![Expr::add(Expr::ident("dev"), Expr::int(8))])]),
        );
        let caller_b = make_proc(
            "ep_b",
            &["dev"],
            straight(vec![Cmd::call("helper", vec![Expr::add(Expr::ident("dev"), Expr::int(16))])]),
        );
        program_with(vec![callee, caller_a, caller_b])
    }

    #[test]
    fn formal_unions_all_call_sites() {
        let program = make_harness_program();
        let resolver = Resolver::new(&program, 64);
        let helper = program.procedure("helper").unwrap();
        let mut cache = ResolverCache::new();
        let result = resolver.resolve_interprocedural(
            &Scope::whole_program(),
            helper,
            &Site::new("bb0", 0),
            &Expr::ident("lockp"),
            &mut cache,
        );
        let offsets: Vec<i128> = result.iter().filter_map(|r| r.root()).map(|r| r.offset).collect();
        assert_eq!(offsets, vec![8, 16]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn scope_restricts_call_sites() {
        let program = make_harness_program();
        let resolver = Resolver::new(&program, 64);
        let helper = program.procedure("helper").unwrap();
        let only_a: BTreeSet<String> = BTreeSet::from(["ep_a".to_string(), "helper".to_string()]);
        let scope = Scope {
            key: "ep_a",
            procedures: Some(&only_a),
            origins: None,
        };
        let mut cache = ResolverCache::new();
        let result = resolver.resolve_interprocedural(
            &scope,
            helper,
            &Site::new("bb0", 0),
            &Expr::ident("lockp"),
            &mut cache,
        );
        assert_eq!(
            result,
            BTreeSet::from([Resolution::Resolved(RootAddress::new(Expr::ident("dev"), 8))])
        );
    }

    #[test]
    fn recursive_formal_contributes_unresolved() {
        let rec = make_proc(
            "rec",
            &["p"],
            straight(vec![Cmd::call("rec", vec![Expr::add(Expr::ident("p"), Expr::int(8))])]),
        );
        let program = program_with(vec![rec]);
        let resolver = Resolver::new(&program, 64);
        let proc = program.procedure("rec").unwrap();
        let mut cache = ResolverCache::new();
        let result = resolver.resolve_interprocedural(
            &Scope::whole_program(),
            proc,
            &Site::new("bb0", 0),
            &Expr::ident("p"),
            &mut cache,
        );
        assert!(result.iter().any(|r| !r.is_resolved()));
    }

    #[test]
    fn cache_clear_empties() {
        let mut cache = ResolverCache::new();
        cache.insert(("".into(), "f".into(), "p".into()), BTreeSet::new());
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
