//! Shadow-state encodings for memory locksets and access flags.
//!
//! [`MapStrategy`] indexes every shadow variable by address. [`WatchdogStrategy`]
//! keeps one scalar per variable and only tracks accesses at a single,
//! unconstrained address per region (`WATCHED_ACCESS_OFFSET_<region>`); a fresh
//! `track` boolean is havoced at each access so every access at that address
//! may or may not be the one being followed.

use lockwatch_ir::{Cmd, Constant, Expr, Lhs, Program, Type, Variable};

use crate::options::StrategyKind;

use super::watched_offset;

/// Name of the bound variable in address-quantified facts.
const BOUND_ADDRESS: &str = "$i";
/// Local of the access helpers choosing whether this access is tracked.
const TRACK_LOCAL: &str = "track";

/// Decides under which condition an access updates shadow state.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGuard {
    pub locals: Vec<Variable>,
    pub setup: Vec<Cmd>,
    pub guard: Expr,
}

/// How per-address shadow state is represented.
pub trait ShadowStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Type of a memory-lockset or access-flag variable of a region indexed by `index`.
    fn shadow_type(&self, index: &Type) -> Type;

    /// Declarations shared by both instances for `region`.
    fn declare_region(&self, program: &mut Program, region: &str, index: &Type);

    /// Value of shadow variable `var` for address `ptr`.
    fn cell(&self, var: &str, ptr: &Expr) -> Expr;

    fn cell_lhs(&self, var: &str, ptr: &Expr) -> Lhs;

    fn access_guard(&self, region: &str, ptr: &Expr, index: &Type) -> AccessGuard;

    /// Every cell of `var` equals `value`.
    fn everywhere(&self, var: &str, value: bool, index: &Type) -> Expr;
}

pub fn for_kind(kind: StrategyKind) -> Box<dyn ShadowStrategy> {
    match kind {
        StrategyKind::Watchdog => Box::new(WatchdogStrategy),
        StrategyKind::Map => Box::new(MapStrategy),
    }
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchdogStrategy;

impl ShadowStrategy for WatchdogStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Watchdog
    }

    fn shadow_type(&self, _index: &Type) -> Type {
        Type::Bool
    }

    fn declare_region(&self, program: &mut Program, region: &str, index: &Type) {
        program.add_constant(Constant::new(watched_offset(region), index.clone()));
    }

    fn cell(&self, var: &str, _ptr: &Expr) -> Expr {
        Expr::ident(var)
    }

    fn cell_lhs(&self, var: &str, _ptr: &Expr) -> Lhs {
        Lhs::var(var)
    }

    fn access_guard(&self, region: &str, ptr: &Expr, _index: &Type) -> AccessGuard {
        AccessGuard {
            locals: vec![Variable::new(TRACK_LOCAL, Type::Bool)],
            setup: vec![Cmd::havoc(vec![TRACK_LOCAL.to_string()])],
            guard: Expr::and(
                Expr::ident(TRACK_LOCAL),
                Expr::eq(Expr::ident(watched_offset(region)), ptr.clone()),
            ),
        }
    }

    fn everywhere(&self, var: &str, value: bool, _index: &Type) -> Expr {
        super::literal(var, value)
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MapStrategy;

impl ShadowStrategy for MapStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Map
    }

    fn shadow_type(&self, index: &Type) -> Type {
        Type::map(index.clone(), Type::Bool)
    }

    fn declare_region(&self, _program: &mut Program, _region: &str, _index: &Type) {}

    fn cell(&self, var: &str, ptr: &Expr) -> Expr {
        Expr::select(Expr::ident(var), ptr.clone())
    }

    fn cell_lhs(&self, var: &str, ptr: &Expr) -> Lhs {
        Lhs::map(var, ptr.clone())
    }

    fn access_guard(&self, _region: &str, _ptr: &Expr, _index: &Type) -> AccessGuard {
        AccessGuard {
            locals: Vec::new(),
            setup: Vec::new(),
            guard: Expr::bool(true),
        }
    }

    fn everywhere(&self, var: &str, value: bool, index: &Type) -> Expr {
        let cell = self.cell(var, &Expr::ident(BOUND_ADDRESS));
        let body = if value { cell } else { Expr::not(cell) };
        Expr::forall(BOUND_ADDRESS, index.clone(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ====== Watchdog tests ======

    #[test]
    fn watchdog_is_scalar() {
        let s = WatchdogStrategy;
        assert_eq!(s.shadow_type(&Type::Int), Type::Bool);
        assert_eq!(s.cell("W", &Expr::ident("p")), Expr::ident("W"));
        assert_eq!(s.everywhere("W", false, &Type::Int), Expr::not(Expr::ident("W")));
    }

    #[test]
    fn watchdog_guard_compares_with_watched_offset() {
        let g = WatchdogStrategy.access_guard("$M.0", &Expr::ident("ptr"), &Type::Int);
        assert_eq!(g.locals.len(), 1);
        assert_eq!(g.setup, vec![Cmd::havoc(vec!["track".into()])]);
        assert_eq!(g.guard.to_string(), "track && WATCHED_ACCESS_OFFSET_$M.0 == ptr");
    }

    #[test]
    fn watchdog_declares_one_offset_per_region() {
        let mut program = Program::new();
        WatchdogStrategy.declare_region(&mut program, "$M.0", &Type::Int);
        WatchdogStrategy.declare_region(&mut program, "$M.0", &Type::Int);
        assert_eq!(program.constants.len(), 1);
        assert!(!program.constants[0].unique);
    }

    // ====== Map tests ======

    #[test]
    fn map_cells_are_indexed() {
        let s = MapStrategy;
        assert_eq!(s.shadow_type(&Type::Int), Type::map(Type::Int, Type::Bool));
        assert_eq!(s.cell("W", &Expr::ident("p")).to_string(), "W[p]");
        assert!(s.access_guard("$M.0", &Expr::ident("p"), &Type::Int).guard.is_true());
    }

    #[test]
    fn map_everywhere_quantifies() {
        let e = MapStrategy.everywhere("W", false, &Type::Int);
        assert_eq!(e.to_string(), "(forall $i: int :: !W[$i])");
    }

    #[test]
    fn kind_selects_strategy() {
        assert_eq!(for_kind(StrategyKind::Map).kind(), StrategyKind::Map);
        assert_eq!(for_kind(StrategyKind::Watchdog).kind(), StrategyKind::Watchdog);
    }
}
