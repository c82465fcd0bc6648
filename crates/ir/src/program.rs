use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::attr::{Attribute, Attributes};
use crate::cmd::{Cmd, Transfer};
use crate::error::IrError;
use crate::expr::Expr;
use crate::ty::Type;

/// A typed name: global variable, formal, return value or local.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr);
        self
    }
}

/// A constant, optionally `unique` (pairwise distinct from other unique constants).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
}

impl Constant {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            unique: false,
            attrs: Attributes::new(),
        }
    }

    pub fn unique(name: impl Into<String>, ty: Type) -> Self {
        Self {
            unique: true,
            ..Self::new(name, ty)
        }
    }

    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr);
        self
    }
}

/// Type synonym `type ref = int;` or uninterpreted type `type T;`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonym: Option<Type>,
}

/// Pure function, optionally with a defining body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Variable>,
    pub ret: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Expr>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
}

/// One `requires` or `ensures` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecClause {
    pub expr: Expr,
    #[serde(default)]
    pub free: bool,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
}

impl SpecClause {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            free: false,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr);
        self
    }
}

/// Procedure contract: preconditions, postconditions and frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default)]
    pub requires: Vec<SpecClause>,
    #[serde(default)]
    pub ensures: Vec<SpecClause>,
    #[serde(default)]
    pub modifies: Vec<String>,
}

impl Contract {
    /// Add `name` to the frame unless already present.
    pub fn add_modifies(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.modifies.contains(&name) {
            self.modifies.push(name);
        }
    }
}

/// Labelled basic block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    #[serde(default)]
    pub cmds: Vec<Cmd>,
    pub transfer: Transfer,
}

impl Block {
    pub fn new(label: impl Into<String>, cmds: Vec<Cmd>, transfer: Transfer) -> Self {
        Self {
            label: label.into(),
            cmds,
            transfer,
        }
    }
}

/// Procedure declaration; a procedure without blocks is a bodiless declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
    #[serde(default)]
    pub params: Vec<Variable>,
    #[serde(default)]
    pub returns: Vec<Variable>,
    #[serde(default)]
    pub contract: Contract,
    #[serde(default)]
    pub locals: Vec<Variable>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            params: Vec::new(),
            returns: Vec::new(),
            contract: Contract::default(),
            locals: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_label(&self) -> Option<&str> {
        self.blocks.first().map(|b| b.label.as_str())
    }

    pub fn block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }

    pub fn block_mut(&mut self, label: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Labels of blocks that end in `return`.
    pub fn return_labels(&self) -> Vec<String> {
        self.blocks
            .iter()
            .filter(|b| b.transfer.is_return())
            .map(|b| b.label.clone())
            .collect()
    }

    /// Names of procedures called from this body, deduplicated, in order of first call.
    pub fn callees(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.commands()
            .filter_map(|(_, _, cmd)| cmd.callee())
            .filter(|c| seen.insert(c.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Every command with its block label and position.
    pub fn commands(&self) -> impl Iterator<Item = (&str, usize, &Cmd)> {
        self.blocks.iter().flat_map(|b| {
            b.cmds
                .iter()
                .enumerate()
                .map(move |(i, c)| (b.label.as_str(), i, c))
        })
    }

    pub fn is_formal(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn formal_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Names visible in the body: formals, return values and locals.
    pub fn local_names(&self) -> BTreeSet<String> {
        self.params
            .iter()
            .chain(&self.returns)
            .chain(&self.locals)
            .map(|v| v.name.clone())
            .collect()
    }

    /// Add a local unless one with the same name exists.
    pub fn add_local(&mut self, var: Variable) {
        if !self.locals.iter().any(|v| v.name == var.name) {
            self.locals.push(var);
        }
    }
}

/// Whole IR program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub constants: Vec<Constant>,
    #[serde(default)]
    pub globals: Vec<Variable>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub axioms: Vec<Expr>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, IrError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn procedure_mut(&mut self, name: &str) -> Option<&mut Procedure> {
        self.procedures.iter_mut().find(|p| p.name == name)
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedure(name).is_some()
    }

    pub fn global(&self, name: &str) -> Option<&Variable> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name == name)
    }

    /// Whether `name` is a program-level constant or variable.
    pub fn is_global_name(&self, name: &str) -> bool {
        self.global(name).is_some() || self.constant(name).is_some()
    }

    /// Every declared top-level name.
    pub fn declared_names(&self) -> BTreeSet<String> {
        self.types
            .iter()
            .map(|t| t.name.clone())
            .chain(self.constants.iter().map(|c| c.name.clone()))
            .chain(self.globals.iter().map(|g| g.name.clone()))
            .chain(self.functions.iter().map(|f| f.name.clone()))
            .chain(self.procedures.iter().map(|p| p.name.clone()))
            .collect()
    }

    /// Call sites of `callee` as `(caller, block, position, cmd)`.
    pub fn call_sites<'a>(
        &'a self,
        callee: &'a str,
    ) -> impl Iterator<Item = (&'a Procedure, &'a str, usize, &'a Cmd)> + 'a {
        self.procedures.iter().flat_map(move |p| {
            p.commands()
                .filter(move |(_, _, c)| c.callee() == Some(callee))
                .map(move |(label, i, c)| (p, label, i, c))
        })
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn add_global(&mut self, var: Variable) {
        if self.global(&var.name).is_none() {
            self.globals.push(var);
        }
    }

    pub fn add_constant(&mut self, constant: Constant) {
        if self.constant(&constant.name).is_none() {
            self.constants.push(constant);
        }
    }

    /// Add a procedure, replacing any previous one of the same name.
    pub fn add_procedure(&mut self, proc: Procedure) {
        match self.procedures.iter_mut().find(|p| p.name == proc.name) {
            Some(slot) => *slot = proc,
            None => self.procedures.push(proc),
        }
    }

    pub fn remove_procedure(&mut self, name: &str) -> Option<Procedure> {
        let idx = self.procedures.iter().position(|p| p.name == name)?;
        Some(self.procedures.remove(idx))
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check declarations are unique, calls resolve with the right arity and
    /// gotos target existing labels.
    pub fn validate(&self) -> Result<(), IrError> {
        let mut seen = HashSet::new();
        let names = self
            .types
            .iter()
            .map(|t| &t.name)
            .chain(self.constants.iter().map(|c| &c.name))
            .chain(self.globals.iter().map(|g| &g.name))
            .chain(self.functions.iter().map(|f| &f.name))
            .chain(self.procedures.iter().map(|p| &p.name));
        for name in names {
            if !seen.insert(name) {
                return Err(IrError::DuplicateDeclaration(name.clone()));
            }
        }

        let arity: BTreeMap<&str, usize> = self
            .procedures
            .iter()
            .map(|p| (p.name.as_str(), p.params.len()))
            .collect();

        for proc in &self.procedures {
            let mut labels = HashSet::new();
            for block in &proc.blocks {
                if !labels.insert(block.label.as_str()) {
                    return Err(IrError::DuplicateLabel {
                        procedure: proc.name.clone(),
                        label: block.label.clone(),
                    });
                }
            }
            for block in &proc.blocks {
                for target in block.transfer.targets() {
                    if !labels.contains(target.as_str()) {
                        return Err(IrError::UnknownBlock {
                            procedure: proc.name.clone(),
                            label: target.clone(),
                        });
                    }
                }
                for cmd in &block.cmds {
                    let Cmd::Call { callee, args, .. } = cmd else {
                        continue;
                    };
                    let Some(&expected) = arity.get(callee.as_str()) else {
                        return Err(IrError::UnknownProcedure {
                            caller: proc.name.clone(),
                            callee: callee.clone(),
                        });
                    };
                    if expected != args.len() {
                        return Err(IrError::ArityMismatch {
                            caller: proc.name.clone(),
                            callee: callee.clone(),
                            expected,
                            found: args.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
