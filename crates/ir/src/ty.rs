use serde::{Deserialize, Serialize};

/// Type of an IR variable, constant or function result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Bool,
    Int,
    /// Fixed-width bitvector: `bv32`
    Bv(u32),
    /// Map from index types to an element type: `[int]int`
    Map(Vec<Type>, Box<Type>),
    /// Named type synonym or uninterpreted type, e.g. `ref`
    Named(String),
}

impl Type {
    pub fn map(index: Type, element: Type) -> Self {
        Type::Map(vec![index], Box::new(element))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Type::Named(name.into())
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Type::Map(..))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    /// Element type of a map, `None` for scalar types.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Map(_, elem) => Some(elem),
            _ => None,
        }
    }
}
