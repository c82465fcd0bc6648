//! Block-structured verification IR.
//!
//! Programs are made of global declarations and procedures whose bodies are
//! labelled blocks of straight-line commands ending in `goto` or `return`.
//! Regions of driver memory are global maps named `$M.<n>`; every other
//! analysis in the workspace is phrased over this representation.

pub mod attr;
pub mod cfg;
pub mod cmd;
pub mod error;
pub mod expr;
pub mod printer;
pub mod program;
pub mod ty;

pub use attr::{AttrValue, Attribute, Attributes};
pub use cfg::Cfg;
pub use cmd::{Cmd, Lhs, Transfer};
pub use error::IrError;
pub use expr::{BinOp, Expr, REGION_PREFIX, base_function_name, is_region_name};
pub use program::{
    Block, Constant, Contract, Function, Procedure, Program, SpecClause, TypeDecl, Variable,
};
pub use ty::Type;
