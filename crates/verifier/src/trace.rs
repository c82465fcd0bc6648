//! Counterexample traces reported by the verifier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which kind of check failed, with the attributes of the failing
/// assertion, precondition or postcondition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Assert {
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    /// A precondition of `callee` might not hold at a call.
    Call {
        callee: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    /// A postcondition might not hold on some return path.
    Return {
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
}

impl FailureKind {
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        match self {
            FailureKind::Assert { attributes }
            | FailureKind::Call { attributes, .. }
            | FailureKind::Return { attributes } => attributes,
        }
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes().contains_key(key)
    }
}

/// Program state at one `captureState` assume along the failing path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedState {
    pub name: String,
    /// Variable assignments: name to printed value.
    #[serde(default)]
    pub assignments: BTreeMap<String, String>,
}

impl CapturedState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assignments: BTreeMap::new(),
        }
    }

    pub fn with_assignment(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.assignments.insert(var.into(), value.into());
        self
    }

    /// Look up a variable's value by name.
    pub fn get(&self, var: &str) -> Option<&str> {
        self.assignments.get(var).map(String::as_str)
    }

    /// Whether `var` holds the boolean `true` in this state.
    pub fn is_true(&self, var: &str) -> bool {
        self.get(var) == Some("true")
    }
}

/// A failing execution of one procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterexample {
    pub failure: FailureKind,
    pub procedure: String,
    /// Captured states in execution order.
    #[serde(default)]
    pub states: Vec<CapturedState>,
}

impl Counterexample {
    pub fn new(failure: FailureKind, procedure: impl Into<String>) -> Self {
        Self {
            failure,
            procedure: procedure.into(),
            states: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: CapturedState) -> Self {
        self.states.push(state);
        self
    }

    pub fn state(&self, name: &str) -> Option<&CapturedState> {
        self.states.iter().find(|s| s.name == name)
    }

    /// States whose name starts with `prefix`, in execution order.
    pub fn states_named<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a CapturedState> + 'a {
        self.states.iter().filter(move |s| s.name.starts_with(prefix))
    }

    /// The last captured state, i.e. the one closest to the failure.
    pub fn last_state(&self) -> Option<&CapturedState> {
        self.states.last()
    }
}
