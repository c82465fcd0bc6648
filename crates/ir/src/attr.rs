use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// One argument of an attribute: `{:captureState "access_state_0"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Str(String),
    Expr(Expr),
}

/// A named attribute `{:key v1, v2}` attached to a declaration or command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<AttrValue>,
}

impl Attribute {
    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: Vec::new(),
        }
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: vec![AttrValue::Str(value.into())],
        }
    }

    pub fn expr(key: impl Into<String>, value: Expr) -> Self {
        Self {
            key: key.into(),
            values: vec![AttrValue::Expr(value)],
        }
    }
}

/// Ordered attribute list. Keys may repeat; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, attr: Attribute) {
        self.0.push(attr);
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, attr: Attribute) -> Self {
        self.0.push(attr);
        self
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.iter().any(|a| a.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.0.iter().find(|a| a.key == key)
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|a| a.key != key);
    }

    /// First value of `key` when it is a string.
    pub fn string_value(&self, key: &str) -> Option<&str> {
        match self.get(key)?.values.first()? {
            AttrValue::Str(s) => Some(s),
            AttrValue::Expr(Expr::Ident(s)) => Some(s),
            AttrValue::Expr(_) => None,
        }
    }

    /// First value of `key` when it is an integer literal.
    pub fn int_value(&self, key: &str) -> Option<i128> {
        match self.get(key)?.values.first()? {
            AttrValue::Expr(e) => e.as_int(),
            AttrValue::Str(s) => s.parse().ok(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
