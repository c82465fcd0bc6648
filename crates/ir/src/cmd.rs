use serde::{Deserialize, Serialize};

use crate::attr::Attributes;
use crate::expr::{Expr, is_region_name};

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lhs {
    /// `x := ...`
    Var(String),
    /// `m[i] := ...`
    Map { map: String, indices: Vec<Expr> },
}

impl Lhs {
    pub fn var(name: impl Into<String>) -> Self {
        Lhs::Var(name.into())
    }

    pub fn map(map: impl Into<String>, index: Expr) -> Self {
        Lhs::Map {
            map: map.into(),
            indices: vec![index],
        }
    }

    /// The variable or map being updated.
    pub fn target(&self) -> &str {
        match self {
            Lhs::Var(name) => name,
            Lhs::Map { map, .. } => map,
        }
    }
}

/// A straight-line command inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cmd {
    Assign {
        lhs: Lhs,
        rhs: Expr,
    },
    Havoc {
        vars: Vec<String>,
    },
    Assert {
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attrs: Attributes,
        expr: Expr,
    },
    Assume {
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attrs: Attributes,
        expr: Expr,
    },
    Call {
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attrs: Attributes,
        callee: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        outs: Vec<String>,
    },
}

impl Cmd {
    pub fn assign(lhs: Lhs, rhs: Expr) -> Self {
        Cmd::Assign { lhs, rhs }
    }

    pub fn havoc(vars: Vec<String>) -> Self {
        Cmd::Havoc { vars }
    }

    pub fn assert(expr: Expr) -> Self {
        Cmd::Assert {
            attrs: Attributes::new(),
            expr,
        }
    }

    pub fn assume(expr: Expr) -> Self {
        Cmd::Assume {
            attrs: Attributes::new(),
            expr,
        }
    }

    pub fn assume_with(attrs: Attributes, expr: Expr) -> Self {
        Cmd::Assume { attrs, expr }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Cmd::Call {
            attrs: Attributes::new(),
            callee: callee.into(),
            args,
            outs: Vec::new(),
        }
    }

    /// Callee name when this is a call.
    pub fn callee(&self) -> Option<&str> {
        match self {
            Cmd::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }

    pub fn call_args(&self) -> &[Expr] {
        match self {
            Cmd::Call { args, .. } => args,
            _ => &[],
        }
    }

    pub fn attrs(&self) -> Option<&Attributes> {
        match self {
            Cmd::Assert { attrs, .. } | Cmd::Assume { attrs, .. } | Cmd::Call { attrs, .. } => {
                Some(attrs)
            }
            _ => None,
        }
    }

    /// Whether this is an `assume` carrying attribute `key`.
    pub fn is_assume_with(&self, key: &str) -> bool {
        matches!(self, Cmd::Assume { attrs, .. } if attrs.has(key))
    }

    /// Region write `$M.x[i] := v`, as `(region, index)`.
    pub fn region_write(&self) -> Option<(&str, &Expr)> {
        match self {
            Cmd::Assign {
                lhs: Lhs::Map { map, indices },
                ..
            } if indices.len() == 1 && is_region_name(map) => Some((map, &indices[0])),
            _ => None,
        }
    }

    /// Region reads on the right-hand side of an assignment.
    pub fn region_reads(&self) -> Vec<(&str, &Expr)> {
        match self {
            Cmd::Assign { rhs, .. } => rhs.region_reads(),
            _ => Vec::new(),
        }
    }

    /// Variables whose value this command (re)defines.
    pub fn defined_vars(&self) -> Vec<&str> {
        match self {
            Cmd::Assign { lhs, .. } => vec![lhs.target()],
            Cmd::Havoc { vars } => vars.iter().map(String::as_str).collect(),
            Cmd::Call { outs, .. } => outs.iter().map(String::as_str).collect(),
            Cmd::Assert { .. } | Cmd::Assume { .. } => Vec::new(),
        }
    }

    /// Apply `f` to every expression of this command, including map indices.
    pub fn map_exprs(&self, f: &mut impl FnMut(&Expr) -> Expr) -> Cmd {
        match self {
            Cmd::Assign { lhs, rhs } => Cmd::Assign {
                lhs: match lhs {
                    Lhs::Var(v) => Lhs::Var(v.clone()),
                    Lhs::Map { map, indices } => Lhs::Map {
                        map: map.clone(),
                        indices: indices.iter().map(&mut *f).collect(),
                    },
                },
                rhs: f(rhs),
            },
            Cmd::Havoc { vars } => Cmd::Havoc { vars: vars.clone() },
            Cmd::Assert { attrs, expr } => Cmd::Assert {
                attrs: attrs.clone(),
                expr: f(expr),
            },
            Cmd::Assume { attrs, expr } => Cmd::Assume {
                attrs: attrs.clone(),
                expr: f(expr),
            },
            Cmd::Call {
                attrs,
                callee,
                args,
                outs,
            } => Cmd::Call {
                attrs: attrs.clone(),
                callee: callee.clone(),
                args: args.iter().map(&mut *f).collect(),
                outs: outs.clone(),
            },
        }
    }

    /// Rename variables (including assigned and havocked ones).
    pub fn rename_vars(&self, rename: &impl Fn(&str) -> Option<String>) -> Cmd {
        let name = |n: &String| rename(n).unwrap_or_else(|| n.clone());
        let renamed = self.map_exprs(&mut |e| e.rename(rename));
        match renamed {
            Cmd::Assign { lhs, rhs } => Cmd::Assign {
                lhs: match lhs {
                    Lhs::Var(v) => Lhs::Var(name(&v)),
                    Lhs::Map { map, indices } => Lhs::Map {
                        map: name(&map),
                        indices,
                    },
                },
                rhs,
            },
            Cmd::Havoc { vars } => Cmd::Havoc {
                vars: vars.iter().map(name).collect(),
            },
            Cmd::Call {
                attrs,
                callee,
                args,
                outs,
            } => Cmd::Call {
                attrs,
                callee,
                args,
                outs: outs.iter().map(name).collect(),
            },
            other => other,
        }
    }
}

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transfer {
    Goto(Vec<String>),
    Return,
}

impl Transfer {
    pub fn targets(&self) -> &[String] {
        match self {
            Transfer::Goto(targets) => targets,
            Transfer::Return => &[],
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Transfer::Return)
    }
}
