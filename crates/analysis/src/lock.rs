//! Lock identities and the lock abstraction.
//!
//! Dynamic locks are discovered from the lock constructors reachable from the
//! init entry point; host locks are always present. Acquire and release sites
//! are then matched against the catalog by the root address of their operand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lockwatch_ir::{Attribute, Attributes, Cmd, Constant, Expr, Program, Type};
use serde::Serialize;

use crate::call_graph::CallGraph;
use crate::context::AnalysisContext;
use crate::domain::{HostCall, HostLock};
use crate::error::AnalysisError;
use crate::pipeline::Pass;
use crate::resolver::{Resolution, Resolver, ResolverCache, RootAddress, Scope, Site};

/// Attribute marking lock identity constants.
pub const LOCK_ATTR: &str = "lock";
/// Attribute of the `assume` left where a lock operand could not be resolved.
pub const UNRESOLVED_LOCK_ATTR: &str = "unresolved_lock";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Allocated by the driver, identified by the root address it was initialized at.
    Dynamic { root: RootAddress },
    Host(HostLock),
}

/// Abstract mutual-exclusion object. Two locks are the same lock exactly when
/// they are structurally equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Lock {
    /// Name of the identity constant, `lock$N` or `lock$<host>`.
    pub name: String,
    pub kind: LockKind,
}

impl Lock {
    pub fn dynamic(index: usize, root: RootAddress) -> Self {
        Self {
            name: format!("lock${index}"),
            kind: LockKind::Dynamic { root },
        }
    }

    pub fn host(lock: HostLock) -> Self {
        Self {
            name: format!("lock${}", lock.name()),
            kind: LockKind::Host(lock),
        }
    }

    pub fn host_lock(&self) -> Option<HostLock> {
        match self.kind {
            LockKind::Host(h) => Some(h),
            LockKind::Dynamic { .. } => None,
        }
    }

    pub fn is_host(&self) -> bool {
        self.host_lock().is_some()
    }

    pub fn is_bound_to(&self, root: &RootAddress) -> bool {
        matches!(&self.kind, LockKind::Dynamic { root: r } if r == root)
    }

    pub fn constant(&self) -> Expr {
        Expr::ident(&self.name)
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LockKind::Dynamic { root } => write!(f, "{} @ {}", self.name, root.to_expr()),
            LockKind::Host(h) => write!(f, "{} (host {h})", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Every lock known for one analysis run: dynamic locks first, in discovery
/// order, then the host locks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockCatalog {
    dynamic: Vec<Lock>,
    host: Vec<Lock>,
}

impl LockCatalog {
    /// Catalog holding only the host locks.
    pub fn with_host_locks() -> Self {
        Self {
            dynamic: Vec::new(),
            host: HostLock::ALL.into_iter().map(Lock::host).collect(),
        }
    }

    /// Bind `root` to a lock, reusing an existing binding of the same root.
    pub fn add_dynamic(&mut self, root: RootAddress) -> &Lock {
        let idx = match self.dynamic.iter().position(|l| l.is_bound_to(&root)) {
            Some(idx) => idx,
            None => {
                let lock = Lock::dynamic(self.dynamic.len(), root);
                self.dynamic.push(lock);
                self.dynamic.len() - 1
            }
        };
        &self.dynamic[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lock> {
        self.dynamic.iter().chain(&self.host)
    }

    pub fn len(&self) -> usize {
        self.dynamic.len() + self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dynamic_locks(&self) -> &[Lock] {
        &self.dynamic
    }

    pub fn get(&self, name: &str) -> Option<&Lock> {
        self.iter().find(|l| l.name == name)
    }

    pub fn host(&self, lock: HostLock) -> Option<&Lock> {
        self.host.iter().find(|l| l.host_lock() == Some(lock))
    }

    pub fn matching(&self, root: &RootAddress) -> Option<&Lock> {
        self.dynamic.iter().find(|l| l.is_bound_to(root))
    }

    /// Declare one `unique` identity constant per lock.
    pub fn declare(&self, program: &mut Program) {
        for lock in self.iter() {
            program.add_constant(
                Constant::unique(&lock.name, Type::Int).with_attr(Attribute::flag(LOCK_ATTR)),
            );
        }
    }

    /// Scan the procedures reachable from `init` for lock constructors and
    /// bind each resolved operand to a fresh lock.
    pub fn discover(program: &Program, init: Option<&str>, max_depth: usize) -> Self {
        let mut catalog = Self::with_host_locks();
        let Some(init) = init else {
            return catalog;
        };
        let graph = CallGraph::from_program(program);
        let resolver = Resolver::new(program, max_depth);
        let mut cache = ResolverCache::new();
        let scope = Scope::whole_program();

        for name in graph.reachable_from(init) {
            let Some(proc) = program.procedure(&name) else {
                continue;
            };
            for (label, idx, cmd) in proc.commands() {
                let Some(callee) = cmd.callee() else {
                    continue;
                };
                if HostCall::classify(callee) != Some(HostCall::LockInit) {
                    continue;
                }
                let Some(operand) = cmd.call_args().first() else {
                    tracing::warn!(proc = %name, %callee, "Lock constructor without operand");
                    continue;
                };
                let site = Site::new(label, idx);
                for resolution in
                    resolver.resolve_interprocedural(&scope, proc, &site, operand, &mut cache)
                {
                    match resolution {
                        Resolution::Resolved(root) => {
                            let lock = catalog.add_dynamic(root);
                            tracing::debug!(%lock, "Discovered lock");
                        }
                        Resolution::Unresolved(expr) => {
                            tracing::warn!(proc = %name, operand = %expr, "Could not resolve lock constructor operand");
                        }
                    }
                }
            }
        }
        catalog
    }
}

/// Builds the lock catalog from the init entry point and declares it.
pub struct LockCatalogPass;

impl Pass for LockCatalogPass {
    fn name(&self) -> &'static str {
        "lock-catalog"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        let init = ctx.model.init_entry_point().map(|ep| ep.procedure.clone());
        let catalog =
            LockCatalog::discover(&ctx.program, init.as_deref(), ctx.options.max_resolver_depth);
        tracing::debug!(locks = catalog.len(), "Lock catalog ready");
        catalog.declare(&mut ctx.program);
        ctx.locks = catalog;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lock abstraction
// ---------------------------------------------------------------------------

/// What to put in place of one acquire/release call.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LockRewrite {
    /// Same callee, one call per matched lock constant.
    Matched(Vec<String>),
    Unresolved,
}

/// Choose the locks an operation may refer to.
///
/// An acquire only counts when its operand resolves to exactly one catalog
/// lock; a release releases every lock it may refer to.
fn select_locks(
    catalog: &LockCatalog,
    call: HostCall,
    resolutions: &BTreeSet<Resolution>,
) -> LockRewrite {
    let matched: BTreeSet<&str> = resolutions
        .iter()
        .filter_map(Resolution::root)
        .filter_map(|root| catalog.matching(root))
        .map(|l| l.name.as_str())
        .collect();
    let fully_matched = resolutions.iter().all(|r| {
        r.root().is_some_and(|root| catalog.matching(root).is_some())
    });
    match call {
        HostCall::Acquire if fully_matched && matched.len() == 1 => {
            LockRewrite::Matched(matched.into_iter().map(str::to_string).collect())
        }
        HostCall::Release if !matched.is_empty() => {
            LockRewrite::Matched(matched.into_iter().map(str::to_string).collect())
        }
        _ => LockRewrite::Unresolved,
    }
}

/// Rewrites the operand of every driver lock operation in each instance to
/// the identity constant of the lock it matches.
pub struct LockAbstractionPass;

impl Pass for LockAbstractionPass {
    fn name(&self) -> &'static str {
        "lock-abstraction"
    }

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        let mut rewrites: BTreeMap<(String, String), Vec<(usize, LockRewrite)>> = BTreeMap::new();
        {
            let resolver = Resolver::new(&ctx.program, ctx.options.max_resolver_depth);
            for instance in &ctx.instances {
                let scope = instance.scope();
                for name in &instance.procedures {
                    let proc = ctx
                        .program
                        .procedure(name)
                        .ok_or_else(|| AnalysisError::MissingProcedure(name.clone()))?;
                    for (label, idx, cmd) in proc.commands() {
                        let Some(callee) = cmd.callee() else {
                            continue;
                        };
                        let call = match HostCall::classify(callee) {
                            Some(c @ (HostCall::Acquire | HostCall::Release)) => c,
                            _ => continue,
                        };
                        let Some(operand) = cmd.call_args().first() else {
                            return Err(AnalysisError::MalformedLockCall {
                                procedure: name.clone(),
                                callee: callee.to_string(),
                            });
                        };
                        let resolutions = resolver.resolve_interprocedural(
                            &scope,
                            proc,
                            &Site::new(label, idx),
                            operand,
                            &mut ctx.resolver_cache,
                        );
                        let rewrite = select_locks(&ctx.locks, call, &resolutions);
                        if rewrite == LockRewrite::Unresolved {
                            tracing::warn!(
                                proc = %name,
                                %callee,
                                operand = %operand,
                                "Unresolved lock operation"
                            );
                        }
                        rewrites
                            .entry((name.clone(), label.to_string()))
                            .or_default()
                            .push((idx, rewrite));
                    }
                }
            }
        }

        for ((proc_name, label), mut sites) in rewrites {
            let block = ctx
                .program
                .procedure_mut(&proc_name)
                .and_then(|p| p.block_mut(&label))
                .ok_or_else(|| AnalysisError::MissingProcedure(proc_name.clone()))?;
            sites.sort_by(|a, b| b.0.cmp(&a.0));
            for (idx, rewrite) in sites {
                let replacement = rewrite_lock_call(&block.cmds[idx], &rewrite);
                block.cmds.splice(idx..=idx, replacement);
            }
        }
        Ok(())
    }
}

fn rewrite_lock_call(cmd: &Cmd, rewrite: &LockRewrite) -> Vec<Cmd> {
    match (cmd, rewrite) {
        (
            Cmd::Call {
                attrs,
                callee,
                outs,
                ..
            },
            LockRewrite::Matched(locks),
        ) => locks
            .iter()
            .map(|lock| Cmd::Call {
                attrs: attrs.clone(),
                callee: callee.clone(),
                args: vec![Expr::ident(lock)],
                outs: outs.clone(),
            })
            .collect(),
        _ => vec![Cmd::assume_with(
            Attributes::new().with(Attribute::flag(UNRESOLVED_LOCK_ATTR)),
            Expr::bool(true),
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwatch_ir::{Block, Procedure, Transfer, Variable};

    fn make_root(base: &str, offset: i128) -> RootAddress {
        RootAddress::new(Expr::ident(base), offset)
    }

    fn make_init_program() -> Program {
        let mut probe = Procedure::new("probe");
        probe.params = vec![Variable::new("dev", Type::Int)];
        probe.blocks = vec![Block::new(
            "bb0",
            vec![
                Cmd::call("mutex_init", vec![Expr::add(Expr::ident("dev"), Expr::int(8))]),
                Cmd::call("init_helper", vec![Expr::ident("dev")]),
            ],
            Transfer::Return,
        )];
        let mut helper = Procedure::new("init_helper");
        helper.params = vec![Variable::new("d", Type::Int)];
        helper.blocks = vec![Block::new(
            "bb0",
            vec![Cmd::call(
                "spin_lock_init",
                vec![Expr::apply("$pa", vec![Expr::ident("d"), Expr::int(2), Expr::int(16)])],
            )],
            Transfer::Return,
        )];
        let mut program = Program::new();
        program.add_procedure(probe);
        program.add_procedure(helper);
        program
    }

    // ====== Identity tests ======

    #[test]
    fn locks_compare_structurally() {
        let a = Lock::dynamic(0, make_root("dev", 8));
        let b = Lock::dynamic(0, make_root("dev", 8));
        let c = Lock::dynamic(0, make_root("dev", 16));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(Lock::host(HostLock::Rtnl), Lock::host(HostLock::Tx));
    }

    #[test]
    fn host_lock_names() {
        assert_eq!(Lock::host(HostLock::Rtnl).name, "lock$rtnl");
        assert_eq!(Lock::host(HostLock::Device).name, "lock$device");
    }

    // ====== Catalog tests ======

    #[test]
    fn catalog_always_has_host_locks() {
        let catalog = LockCatalog::with_host_locks();
        assert_eq!(catalog.len(), 4);
        assert!(catalog.host(HostLock::Power).is_some());
        assert!(catalog.dynamic_locks().is_empty());
    }

    #[test]
    fn rebinding_a_root_reuses_the_lock() {
        let mut catalog = LockCatalog::with_host_locks();
        let first = catalog.add_dynamic(make_root("dev", 8)).name.clone();
        let second = catalog.add_dynamic(make_root("dev", 8)).name.clone();
        assert_eq!(first, second);
        assert_eq!(catalog.dynamic_locks().len(), 1);
    }

    #[test]
    fn discover_follows_init_helpers() {
        let program = make_init_program();
        let catalog = LockCatalog::discover(&program, Some("probe"), 64);
        let roots: Vec<String> = catalog
            .dynamic_locks()
            .iter()
            .map(|l| match &l.kind {
                LockKind::Dynamic { root } => root.to_expr().to_string(),
                LockKind::Host(_) => unreachable!(),
            })
            .collect();
        assert_eq!(roots, vec!["dev + 8", "dev + 32"]);
    }

    #[test]
    fn discover_without_init_has_only_host_locks() {
        let program = make_init_program();
        let catalog = LockCatalog::discover(&program, None, 64);
        assert_eq!(catalog.len(), HostLock::ALL.len());
    }

    #[test]
    fn declare_adds_unique_lock_constants() {
        let mut program = Program::new();
        let mut catalog = LockCatalog::with_host_locks();
        catalog.add_dynamic(make_root("dev", 8));
        catalog.declare(&mut program);
        let lock0 = program.constant("lock$0").unwrap();
        assert!(lock0.unique);
        assert!(lock0.attrs.has(LOCK_ATTR));
        assert_eq!(program.constants.len(), 5);
    }

    // ====== Selection tests ======

    fn make_catalog() -> LockCatalog {
        let mut catalog = LockCatalog::with_host_locks();
        catalog.add_dynamic(make_root("dev", 8));
        catalog.add_dynamic(make_root("dev", 16));
        catalog
    }

    #[test]
    fn acquire_needs_a_unique_match() {
        let catalog = make_catalog();
        let one = BTreeSet::from([Resolution::Resolved(make_root("dev", 8))]);
        assert_eq!(
            select_locks(&catalog, HostCall::Acquire, &one),
            LockRewrite::Matched(vec!["lock$0".into()])
        );
        let two = BTreeSet::from([
            Resolution::Resolved(make_root("dev", 8)),
            Resolution::Resolved(make_root("dev", 16)),
        ]);
        assert_eq!(
            select_locks(&catalog, HostCall::Acquire, &two),
            LockRewrite::Unresolved
        );
    }

    #[test]
    fn release_releases_every_candidate() {
        let catalog = make_catalog();
        let two = BTreeSet::from([
            Resolution::Resolved(make_root("dev", 8)),
            Resolution::Resolved(make_root("dev", 16)),
            Resolution::Unresolved(Expr::ident("x")),
        ]);
        assert_eq!(
            select_locks(&catalog, HostCall::Release, &two),
            LockRewrite::Matched(vec!["lock$0".into(), "lock$1".into()])
        );
    }

    #[test]
    fn unmatched_root_is_unresolved() {
        let catalog = make_catalog();
        let other = BTreeSet::from([Resolution::Resolved(make_root("dev", 24))]);
        assert_eq!(
            select_locks(&catalog, HostCall::Acquire, &other),
            LockRewrite::Unresolved
        );
    }

    #[test]
    fn unresolved_rewrite_is_an_assume() {
        let call = Cmd::call("mutex_lock", vec![Expr::ident("p")]);
        let out = rewrite_lock_call(&call, &LockRewrite::Unresolved);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_assume_with(UNRESOLVED_LOCK_ATTR));
    }
}
