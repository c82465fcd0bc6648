//! Discovery of shared memory regions and of the accesses made to them.

use std::fmt;

use lockwatch_ir::{Expr, Procedure, Program, Type, is_region_name};
use serde::{Deserialize, Serialize};

/// A global map modelling one region of driver memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MemoryRegion {
    pub name: String,
    pub ty: Type,
}

impl MemoryRegion {
    /// Type of the addresses indexing this region.
    pub fn index_type(&self) -> Type {
        match &self.ty {
            Type::Map(indices, _) => indices.first().cloned().unwrap_or(Type::Int),
            _ => Type::Int,
        }
    }
}

/// Regions declared by the program, in declaration order.
pub fn discover_regions(program: &Program) -> Vec<MemoryRegion> {
    program
        .globals
        .iter()
        .filter(|g| is_region_name(&g.name) && g.ty.is_map())
        .map(|g| MemoryRegion {
            name: g.name.clone(),
            ty: g.ty.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccessKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessKind::Read),
            "write" => Ok(AccessKind::Write),
            _ => Err(format!("Unknown access kind: {s}")),
        }
    }
}

/// One access to a region made by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub region: String,
    pub kind: AccessKind,
    pub address: Expr,
}

/// Accesses made by one command: reads on the right-hand side first, then
/// the write of the left-hand side.
pub fn accesses_of(cmd: &lockwatch_ir::Cmd) -> Vec<Access> {
    let mut out: Vec<Access> = cmd
        .region_reads()
        .into_iter()
        .map(|(region, address)| Access {
            region: region.to_string(),
            kind: AccessKind::Read,
            address: address.clone(),
        })
        .collect();
    if let Some((region, address)) = cmd.region_write() {
        out.push(Access {
            region: region.to_string(),
            kind: AccessKind::Write,
            address: address.clone(),
        });
    }
    out
}

/// Every access in a procedure body, as `(block, position, access)`.
pub fn procedure_accesses(proc: &Procedure) -> Vec<(String, usize, Access)> {
    proc.commands()
        .flat_map(|(label, idx, cmd)| {
            accesses_of(cmd)
                .into_iter()
                .map(move |a| (label.to_string(), idx, a))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwatch_ir::{Block, Cmd, Lhs, Transfer, Variable};

    fn region_map() -> Type {
        Type::map(Type::Int, Type::Int)
    }

    #[test]
    fn only_region_maps_are_regions() {
        let mut program = Program::new();
        program.add_global(Variable::new("$M.0", region_map()));
        program.add_global(Variable::new("$M.scalar", Type::Int));
        program.add_global(Variable::new("other", region_map()));
        let regions = discover_regions(&program);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "$M.0");
    }

    #[test]
    fn copy_between_regions_is_read_then_write() {
        let cmd = Cmd::assign(
            Lhs::map("$M.0", Expr::ident("p")),
            Expr::select(Expr::ident("$M.1"), Expr::ident("q")),
        );
        let accesses = accesses_of(&cmd);
        assert_eq!(accesses.len(), 2);
        assert_eq!(accesses[0].kind, AccessKind::Read);
        assert_eq!(accesses[0].region, "$M.1");
        assert_eq!(accesses[1].kind, AccessKind::Write);
        assert_eq!(accesses[1].address, Expr::ident("p"));
    }

    #[test]
    fn procedure_accesses_carry_positions() {
        let mut proc = Procedure::new("p");
        proc.blocks.push(Block::new(
            "bb",
            vec![
                Cmd::assume(Expr::bool(true)),
                Cmd::assign(Lhs::map("$M.0", Expr::int(0)), Expr::int(1)),
            ],
            Transfer::Return,
        ));
        let found = procedure_accesses(&proc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "bb");
        assert_eq!(found[0].1, 1);
    }

    #[test]
    fn access_kind_parses() {
        assert_eq!("write".parse::<AccessKind>(), Ok(AccessKind::Write));
        assert!("rw".parse::<AccessKind>().is_err());
    }
}
