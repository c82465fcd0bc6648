//! Boogie-style text rendering for IR types.
//!
//! Implements `Display` for [`Type`], [`Expr`], [`Attribute`], [`Cmd`],
//! [`Block`], [`Procedure`] and [`Program`]. The output is meant for humans
//! and for verifier backends that accept the textual form.

use std::fmt;

use crate::attr::{AttrValue, Attribute, Attributes};
use crate::cmd::{Cmd, Lhs, Transfer};
use crate::expr::Expr;
use crate::program::{Block, Procedure, Program, SpecClause, Variable};
use crate::ty::Type;

// ---------------------------------------------------------------------------
// Type
// ---------------------------------------------------------------------------

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Bv(width) => write!(f, "bv{width}"),
            Type::Map(index, elem) => {
                write!(f, "[")?;
                write_list(f, index)?;
                write!(f, "]{elem}")
            }
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Write `e`, parenthesized when it is a binary operator binding no tighter
/// than `parent`. Nested logical connectives are always parenthesized.
fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr, parent: u8) -> fmt::Result {
    const LOGICAL: u8 = 3;
    match e {
        Expr::Binary(op, ..)
            if op.precedence() <= parent
                || (op.precedence() <= LOGICAL && parent <= LOGICAL) =>
        {
            write!(f, "({e})")
        }
        Expr::Ite(..) => write!(f, "({e})"),
        _ => write!(f, "{e}"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BoolLit(b) => write!(f, "{b}"),
            Expr::IntLit(v) => write!(f, "{v}"),
            Expr::BvLit(v, width) => write!(f, "{v}bv{width}"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Old(e) => write!(f, "old({e})"),
            Expr::Not(e) => {
                write!(f, "!")?;
                write_operand(f, e, u8::MAX)
            }
            Expr::Neg(e) => {
                write!(f, "-")?;
                write_operand(f, e, u8::MAX)
            }
            Expr::Binary(op, l, r) => {
                write_operand(f, l, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, r, op.precedence())
            }
            Expr::Ite(c, t, e) => write!(f, "if {c} then {t} else {e}"),
            Expr::Select(m, idx) => {
                write_operand(f, m, u8::MAX)?;
                write!(f, "[")?;
                write_list(f, idx)?;
                write!(f, "]")
            }
            Expr::Store(m, idx, v) => {
                write_operand(f, m, u8::MAX)?;
                write!(f, "[")?;
                write_list(f, idx)?;
                write!(f, " := {v}]")
            }
            Expr::Apply(func, args) => {
                write!(f, "{func}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Forall(vars, body) => {
                write!(f, "(forall ")?;
                for (i, (name, ty)) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, " :: {body})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{:{}", self.key)?;
        for (i, value) in self.values.iter().enumerate() {
            write!(f, "{}", if i == 0 { " " } else { ", " })?;
            match value {
                AttrValue::Str(s) => write!(f, "\"{s}\"")?,
                AttrValue::Expr(e) => write!(f, "{e}")?,
            }
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attr in self.iter() {
            write!(f, "{attr} ")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Commands and blocks
// ---------------------------------------------------------------------------

impl fmt::Display for Lhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lhs::Var(name) => write!(f, "{name}"),
            Lhs::Map { map, indices } => {
                write!(f, "{map}[")?;
                write_list(f, indices)?;
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmd::Assign { lhs, rhs } => write!(f, "{lhs} := {rhs};"),
            Cmd::Havoc { vars } => {
                write!(f, "havoc ")?;
                write_list(f, vars)?;
                write!(f, ";")
            }
            Cmd::Assert { attrs, expr } => write!(f, "assert {attrs}{expr};"),
            Cmd::Assume { attrs, expr } => write!(f, "assume {attrs}{expr};"),
            Cmd::Call {
                attrs,
                callee,
                args,
                outs,
            } => {
                write!(f, "call {attrs}")?;
                if !outs.is_empty() {
                    write_list(f, outs)?;
                    write!(f, " := ")?;
                }
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                write!(f, ");")
            }
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Return => write!(f, "return;"),
            Transfer::Goto(targets) => {
                write!(f, "goto ")?;
                write_list(f, targets)?;
                write!(f, ";")
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {}:", self.label)?;
        for cmd in &self.cmds {
            writeln!(f, "    {cmd}")?;
        }
        writeln!(f, "    {}", self.transfer)
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}: {}", self.attrs, self.name, self.ty)
    }
}

fn write_clause(f: &mut fmt::Formatter<'_>, kind: &str, clause: &SpecClause) -> fmt::Result {
    let free = if clause.free { "free " } else { "" };
    writeln!(f, "  {free}{kind} {}{};", clause.attrs, clause.expr)
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "procedure {}{}(", self.attrs, self.name)?;
        write_list(f, &self.params)?;
        write!(f, ")")?;
        if !self.returns.is_empty() {
            write!(f, " returns (")?;
            write_list(f, &self.returns)?;
            write!(f, ")")?;
        }
        if self.is_declaration() {
            writeln!(f, ";")?;
        } else {
            writeln!(f)?;
        }
        if !self.contract.modifies.is_empty() {
            write!(f, "  modifies ")?;
            write_list(f, &self.contract.modifies)?;
            writeln!(f, ";")?;
        }
        for clause in &self.contract.requires {
            write_clause(f, "requires", clause)?;
        }
        for clause in &self.contract.ensures {
            write_clause(f, "ensures", clause)?;
        }
        if self.is_declaration() {
            return Ok(());
        }
        writeln!(f, "{{")?;
        for local in &self.locals {
            writeln!(f, "  var {local};")?;
        }
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for decl in &self.types {
            match &decl.synonym {
                Some(ty) => writeln!(f, "type {} = {ty};", decl.name)?,
                None => writeln!(f, "type {};", decl.name)?,
            }
        }
        for c in &self.constants {
            let unique = if c.unique { "unique " } else { "" };
            writeln!(f, "const {}{unique}{}: {};", c.attrs, c.name, c.ty)?;
        }
        for g in &self.globals {
            writeln!(f, "var {g};")?;
        }
        for func in &self.functions {
            write!(f, "function {}{}(", func.attrs, func.name)?;
            write_list(f, &func.params)?;
            write!(f, ") returns ({})", func.ret)?;
            match &func.body {
                Some(body) => writeln!(f, " {{ {body} }}")?,
                None => writeln!(f, ";")?,
            }
        }
        for axiom in &self.axioms {
            writeln!(f, "axiom {axiom};")?;
        }
        for proc in &self.procedures {
            writeln!(f)?;
            write!(f, "{proc}")?;
        }
        Ok(())
    }
}
