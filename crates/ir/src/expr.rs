use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::ty::Type;

/// Prefix shared by every global map that models a region of driver memory.
pub const REGION_PREFIX: &str = "$M.";

/// Binary operators of the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    And,
    Or,
    Implies,
    Iff,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Implies => "==>",
            BinOp::Iff => "<==>",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
        }
    }

    /// Binding strength used by the printer; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Iff => 1,
            BinOp::Implies => 2,
            BinOp::And | BinOp::Or => 3,
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
        }
    }
}

/// IR expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    // === Literals ===
    BoolLit(bool),
    IntLit(i128),
    /// Bitvector literal with value and width
    BvLit(i128, u32),

    /// Variable, constant or formal reference
    Ident(String),

    // === Operators ===
    /// Pre-state value inside a postcondition: `old(e)`
    Old(Box<Expr>),
    Not(Box<Expr>),
    /// Arithmetic negation
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `if c then a else b`
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),

    // === Maps ===
    /// `m[i]`
    Select(Box<Expr>, Vec<Expr>),
    /// `m[i := v]`
    Store(Box<Expr>, Vec<Expr>, Box<Expr>),

    /// Function application: `$pa(p, 1, 8)`
    Apply(String, Vec<Expr>),

    /// `forall x: T :: body`. Bound names are expected to be fresh.
    Forall(Vec<(String, Type)>, Box<Expr>),
}

impl Expr {
    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn int(value: i128) -> Self {
        Expr::IntLit(value)
    }

    pub fn bool(value: bool) -> Self {
        Expr::BoolLit(value)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn not(e: Expr) -> Self {
        Expr::Not(Box::new(e))
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Or, lhs, rhs)
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Implies, lhs, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Add, lhs, rhs)
    }

    pub fn old(e: Expr) -> Self {
        Expr::Old(Box::new(e))
    }

    pub fn ite(cond: Expr, then: Expr, els: Expr) -> Self {
        Expr::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    pub fn select(map: Expr, index: Expr) -> Self {
        Expr::Select(Box::new(map), vec![index])
    }

    pub fn store(map: Expr, index: Expr, value: Expr) -> Self {
        Expr::Store(Box::new(map), vec![index], Box::new(value))
    }

    pub fn apply(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Apply(func.into(), args)
    }

    pub fn forall(var: impl Into<String>, ty: Type, body: Expr) -> Self {
        Expr::Forall(vec![(var.into(), ty)], Box::new(body))
    }

    /// Conjunction of all operands; `true` when empty.
    pub fn and_all(operands: impl IntoIterator<Item = Expr>) -> Self {
        operands
            .into_iter()
            .reduce(Expr::and)
            .unwrap_or(Expr::BoolLit(true))
    }

    /// Disjunction of all operands; `false` when empty.
    pub fn or_all(operands: impl IntoIterator<Item = Expr>) -> Self {
        operands
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or(Expr::BoolLit(false))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Integer value of a literal, looking through a single negation.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Expr::IntLit(v) | Expr::BvLit(v, _) => Some(*v),
            Expr::Neg(inner) => inner.as_int().map(|v| -v),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::BoolLit(_) | Expr::IntLit(_) | Expr::BvLit(..))
            || matches!(self, Expr::Neg(inner) if inner.is_literal())
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::BoolLit(true))
    }

    /// Name of the region map this expression selects from, if it is a
    /// single-index read `$M.x[i]`.
    pub fn region_read(&self) -> Option<(&str, &Expr)> {
        match self {
            Expr::Select(map, idx) if idx.len() == 1 => match map.as_ref() {
                Expr::Ident(name) if is_region_name(name) => Some((name, &idx[0])),
                _ => None,
            },
            _ => None,
        }
    }

    /// Visit every sub-expression in pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::BoolLit(_) | Expr::IntLit(_) | Expr::BvLit(..) | Expr::Ident(_) => {}
            Expr::Old(e) | Expr::Not(e) | Expr::Neg(e) => e.walk(f),
            Expr::Binary(_, l, r) => {
                l.walk(f);
                r.walk(f);
            }
            Expr::Ite(c, t, e) => {
                c.walk(f);
                t.walk(f);
                e.walk(f);
            }
            Expr::Select(m, idx) => {
                m.walk(f);
                idx.iter().for_each(|i| i.walk(f));
            }
            Expr::Store(m, idx, v) => {
                m.walk(f);
                idx.iter().for_each(|i| i.walk(f));
                v.walk(f);
            }
            Expr::Apply(_, args) => args.iter().for_each(|a| a.walk(f)),
            Expr::Forall(_, body) => body.walk(f),
        }
    }

    /// Free identifiers of this expression.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut bound = BTreeSet::new();
        self.walk(&mut |e| match e {
            Expr::Ident(name) => {
                out.insert(name.clone());
            }
            Expr::Forall(vars, _) => bound.extend(vars.iter().map(|(n, _)| n.clone())),
            _ => {}
        });
        out.retain(|n| !bound.contains(n));
        out
    }

    /// All region reads `$M.x[i]` inside this expression, outermost first.
    pub fn region_reads(&self) -> Vec<(&str, &Expr)> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Some(read) = e.region_read() {
                out.push(read);
            }
        });
        out
    }

    pub fn mentions(&self, name: &str) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Ident(n) if n == name) {
                found = true;
            }
        });
        found
    }

    // ------------------------------------------------------------------
    // Rewriting
    // ------------------------------------------------------------------

    /// Rebuild the expression bottom-up, giving `f` the chance to replace
    /// each node after its children were rewritten.
    pub fn transform(&self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = match self {
            Expr::BoolLit(_) | Expr::IntLit(_) | Expr::BvLit(..) | Expr::Ident(_) => self.clone(),
            Expr::Old(e) => Expr::Old(Box::new(e.transform(f))),
            Expr::Not(e) => Expr::Not(Box::new(e.transform(f))),
            Expr::Neg(e) => Expr::Neg(Box::new(e.transform(f))),
            Expr::Binary(op, l, r) => {
                Expr::Binary(*op, Box::new(l.transform(f)), Box::new(r.transform(f)))
            }
            Expr::Ite(c, t, e) => Expr::Ite(
                Box::new(c.transform(f)),
                Box::new(t.transform(f)),
                Box::new(e.transform(f)),
            ),
            Expr::Select(m, idx) => Expr::Select(
                Box::new(m.transform(f)),
                idx.iter().map(|i| i.transform(f)).collect(),
            ),
            Expr::Store(m, idx, v) => Expr::Store(
                Box::new(m.transform(f)),
                idx.iter().map(|i| i.transform(f)).collect(),
                Box::new(v.transform(f)),
            ),
            Expr::Apply(func, args) => {
                Expr::Apply(func.clone(), args.iter().map(|a| a.transform(f)).collect())
            }
            Expr::Forall(vars, body) => Expr::Forall(vars.clone(), Box::new(body.transform(f))),
        };
        f(rebuilt)
    }

    /// Rename identifiers for which `rename` returns a new name.
    pub fn rename(&self, rename: &impl Fn(&str) -> Option<String>) -> Expr {
        self.transform(&mut |e| match e {
            Expr::Ident(ref name) => match rename(name) {
                Some(new) => Expr::Ident(new),
                None => e,
            },
            other => other,
        })
    }

    /// Replace identifiers by expressions.
    pub fn substitute(&self, map: &HashMap<String, Expr>) -> Expr {
        self.transform(&mut |e| match e {
            Expr::Ident(ref name) => map.get(name).cloned().unwrap_or(e),
            other => other,
        })
    }
}

/// Whether a global name denotes a region of driver memory.
pub fn is_region_name(name: &str) -> bool {
    name.starts_with(REGION_PREFIX)
}

/// Strip the type suffix from a generated function name: `$add.ref` -> `$add`.
pub fn base_function_name(name: &str) -> &str {
    match name.strip_prefix('$') {
        Some(rest) => match rest.find('.') {
            Some(dot) => &name[..dot + 1],
            None => name,
        },
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ====== Constructor tests ======

    #[test]
    fn and_all_of_nothing_is_true() {
        assert_eq!(Expr::and_all(Vec::new()), Expr::BoolLit(true));
    }

    #[test]
    fn or_all_of_nothing_is_false() {
        assert_eq!(Expr::or_all(Vec::new()), Expr::BoolLit(false));
    }

    #[test]
    fn or_all_folds_left() {
        let e = Expr::or_all(vec![Expr::ident("a"), Expr::ident("b"), Expr::ident("c")]);
        assert_eq!(
            e,
            Expr::or(Expr::or(Expr::ident("a"), Expr::ident("b")), Expr::ident("c"))
        );
    }

    // ====== Query tests ======

    #[test]
    fn as_int_looks_through_negation() {
        assert_eq!(Expr::Neg(Box::new(Expr::int(4))).as_int(), Some(-4));
        assert_eq!(Expr::BvLit(7, 32).as_int(), Some(7));
        assert_eq!(Expr::ident("x").as_int(), None);
    }

    #[test]
    fn region_read_requires_region_map() {
        let read = Expr::select(Expr::ident("$M.0"), Expr::ident("p"));
        assert_eq!(read.region_read(), Some(("$M.0", &Expr::ident("p"))));
        let other = Expr::select(Expr::ident("table"), Expr::ident("p"));
        assert!(other.region_read().is_none());
    }

    #[test]
    fn region_reads_finds_nested_loads() {
        let inner = Expr::select(Expr::ident("$M.1"), Expr::ident("q"));
        let outer = Expr::select(Expr::ident("$M.0"), inner.clone());
        let reads = outer.region_reads();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].0, "$M.0");
        assert_eq!(reads[1].0, "$M.1");
    }

    #[test]
    fn identifiers_collects_all_names() {
        let e = Expr::and(Expr::ident("x"), Expr::apply("f", vec![Expr::ident("y")]));
        let ids: Vec<_> = e.identifiers().into_iter().collect();
        assert_eq!(ids, vec!["x".to_string(), "y".to_string()]);
    }

    // ====== Rewriting tests ======

    #[test]
    fn rename_only_touches_selected_names() {
        let e = Expr::add(Expr::ident("p"), Expr::ident("q"));
        let renamed = e.rename(&|n| (n == "p").then(|| "p$1".to_string()));
        assert_eq!(renamed, Expr::add(Expr::ident("p$1"), Expr::ident("q")));
    }

    #[test]
    fn substitute_replaces_identifiers() {
        let mut map = HashMap::new();
        map.insert("x".to_string(), Expr::int(3));
        let e = Expr::eq(Expr::ident("x"), Expr::ident("y"));
        assert_eq!(e.substitute(&map), Expr::eq(Expr::int(3), Expr::ident("y")));
    }

    #[test]
    fn bound_names_are_not_free() {
        let e = Expr::forall(
            "$i",
            Type::Int,
            Expr::select(Expr::ident("MLS"), Expr::ident("$i")),
        );
        let ids: Vec<_> = e.identifiers().into_iter().collect();
        assert_eq!(ids, vec!["MLS".to_string()]);
    }

    #[test]
    fn base_function_name_strips_type_suffix() {
        assert_eq!(base_function_name("$add.ref"), "$add");
        assert_eq!(base_function_name("$pa"), "$pa");
        assert_eq!(base_function_name("plain.name"), "plain.name");
    }
}
