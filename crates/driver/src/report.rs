//! Counterexample interpretation.
//!
//! A failing trace from the verifier is a list of captured-state names in
//! execution order. The instrumented program maps each name back to the
//! metadata attached when it was generated: region, access kind, instance and
//! source location for accesses; instance and location for deadlock checks.
//!
//! Because every access capture precedes its helper call, a failing race
//! check has its own access as the last captured state. The conflicting
//! accesses are the earlier captures on the same region by the other instance,
//! narrowed to those at the failing address when the trace gives its value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use lockwatch_analysis::Instance;
use lockwatch_analysis::instrumentation::error_reporting::{
    ADDRESS_ATTR, CHECK_DEADLOCK_STATE, COLUMN_ATTR, LINE_ATTR, SOURCE_FILE_ATTR,
};
use lockwatch_analysis::instrumentation::{
    ACCESS_ATTR, CAPTURE_STATE_ATTR, DEADLOCK_CHECKING_ATTR, ENTRYPOINT_ATTR, RACE_CHECKING_ATTR,
    RESOURCE_ATTR, watched_offset,
};
use lockwatch_ir::{AttrValue, Attributes, BinOp, Cmd, Expr, Program};
use lockwatch_verifier::{CapturedState, Counterexample, FailureKind};

const ACCESS_STATE_PREFIX: &str = "access_state_";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub file: String,
    pub line: i128,
    pub column: i128,
}

impl Location {
    fn from_attrs(attrs: &Attributes) -> Option<Self> {
        Some(Self {
            file: attrs.string_value(SOURCE_FILE_ATTR)?.to_string(),
            line: attrs.int_value(LINE_ATTR)?,
            column: attrs.int_value(COLUMN_ATTR)?,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One recorded shared-memory access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub state: String,
    pub resource: String,
    /// `read` or `write`
    pub access: String,
    /// Instance performing the access, e.g. `ep_open$1`.
    pub instance: String,
    /// Entry point the instance was created for.
    pub entry_point: String,
    pub location: Option<Location>,
    /// Value of the accessed address in the trace, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<i128>,
}

/// Human-level explanation of one failing check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorReport {
    Race {
        resource: String,
        first: AccessRecord,
        second: AccessRecord,
    },
    Deadlock {
        entry_point: String,
        location: Option<Location>,
    },
    Assertion {
        procedure: String,
    },
    Precondition {
        procedure: String,
        callee: String,
    },
    Postcondition {
        procedure: String,
    },
}

impl ErrorReport {
    pub fn is_race(&self) -> bool {
        matches!(self, ErrorReport::Race { .. })
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, ErrorReport::Deadlock { .. })
    }

    /// The report as printed to the user, one line per entry.
    pub fn render(&self) -> Vec<String> {
        match self {
            ErrorReport::Race { first, second, .. } => {
                let file = second
                    .location
                    .as_ref()
                    .or(first.location.as_ref())
                    .map_or("<unknown>", |l| l.file.as_str());
                vec![
                    format!("{file}: error: potential {}-{} race:", first.access, second.access),
                    access_line(first),
                    access_line(second),
                ]
            }
            ErrorReport::Deadlock {
                entry_point,
                location,
            } => {
                let file = location.as_ref().map_or("<unknown>", |l| l.file.as_str());
                let mut lines =
                    vec![format!("{file}: error: lock held at return by entry point {entry_point}")];
                if let Some(location) = location {
                    lines.push(format!("check at {location}"));
                }
                lines
            }
            ErrorReport::Assertion { procedure } => {
                vec![format!("error: assertion might not hold in {procedure}")]
            }
            ErrorReport::Precondition { procedure, callee } => vec![format!(
                "call to {callee} in {procedure}: error: a precondition for this call might not hold"
            )],
            ErrorReport::Postcondition { procedure } => vec![format!(
                "{procedure}: error: a postcondition might not hold on this return path"
            )],
        }
    }
}

fn access_line(record: &AccessRecord) -> String {
    match &record.location {
        Some(location) => format!("{} by entry point {}, {location}", record.access, record.entry_point),
        None => format!("{} by entry point {}", record.access, record.entry_point),
    }
}

/// Metadata of every `captureState` assume in a program.
#[derive(Debug, Default)]
pub struct CaptureIndex {
    states: BTreeMap<String, Attributes>,
    entry_points: BTreeMap<String, String>,
}

impl CaptureIndex {
    pub fn build(program: &Program, instances: &[Instance]) -> Self {
        let mut states = BTreeMap::new();
        for proc in &program.procedures {
            for (_, _, cmd) in proc.commands() {
                if let Cmd::Assume { attrs, .. } = cmd
                    && let Some(name) = attrs.string_value(CAPTURE_STATE_ATTR)
                {
                    states.entry(name.to_string()).or_insert_with(|| attrs.clone());
                }
            }
        }
        let entry_points = instances
            .iter()
            .map(|inst| (inst.name.clone(), inst.entry.name.clone()))
            .collect();
        Self {
            states,
            entry_points,
        }
    }

    pub fn get(&self, state: &str) -> Option<&Attributes> {
        self.states.get(state)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn entry_point_of(&self, instance: &str) -> String {
        if let Some(entry) = self.entry_points.get(instance) {
            return entry.clone();
        }
        match instance.rsplit_once('$') {
            Some((entry, side)) if side.chars().all(|c| c.is_ascii_digit()) => entry.to_string(),
            _ => instance.to_string(),
        }
    }

    fn access(&self, state: &CapturedState) -> Option<AccessRecord> {
        let attrs = self.get(&state.name)?;
        let instance = attrs.string_value(ENTRYPOINT_ATTR)?.to_string();
        let address = match attrs.get(ADDRESS_ATTR).and_then(|a| a.values.first()) {
            Some(AttrValue::Expr(e)) => evaluate(e, state),
            _ => None,
        };
        Some(AccessRecord {
            state: state.name.clone(),
            resource: attrs.string_value(RESOURCE_ATTR)?.to_string(),
            access: attrs.string_value(ACCESS_ATTR)?.to_string(),
            entry_point: self.entry_point_of(&instance),
            instance,
            location: Location::from_attrs(attrs),
            address,
        })
    }
}

/// Integer value of `expr` under the assignments of `state`.
fn evaluate(expr: &Expr, state: &CapturedState) -> Option<i128> {
    match expr {
        Expr::Ident(name) => parse_value(state.get(name)?),
        Expr::Binary(op, lhs, rhs) => {
            let (l, r) = (evaluate(lhs, state)?, evaluate(rhs, state)?);
            match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                _ => None,
            }
        }
        _ => expr.as_int(),
    }
}

/// Accepts `12` and `12bv64`.
fn parse_value(value: &str) -> Option<i128> {
    let value = value.trim();
    let digits = value.split_once("bv").map_or(value, |(n, _)| n);
    digits.parse().ok()
}

/// Explain `cex`. A race failure may yield one report per conflicting access.
pub fn interpret(index: &CaptureIndex, cex: &Counterexample) -> Vec<ErrorReport> {
    match &cex.failure {
        FailureKind::Assert { attributes } if attributes.contains_key(RACE_CHECKING_ATTR) => {
            let reports = interpret_race(index, cex, attributes);
            if reports.is_empty() {
                tracing::warn!(procedure = %cex.procedure, "Race trace without matching accesses");
                vec![ErrorReport::Assertion {
                    procedure: cex.procedure.clone(),
                }]
            } else {
                reports
            }
        }
        FailureKind::Assert { attributes } if attributes.contains_key(DEADLOCK_CHECKING_ATTR) => {
            vec![interpret_deadlock(index, cex)]
        }
        FailureKind::Assert { .. } => vec![ErrorReport::Assertion {
            procedure: cex.procedure.clone(),
        }],
        FailureKind::Call { callee, .. } => vec![ErrorReport::Precondition {
            procedure: cex.procedure.clone(),
            callee: callee.clone(),
        }],
        FailureKind::Return { .. } => vec![ErrorReport::Postcondition {
            procedure: cex.procedure.clone(),
        }],
    }
}

fn interpret_race(
    index: &CaptureIndex,
    cex: &Counterexample,
    attributes: &BTreeMap<String, String>,
) -> Vec<ErrorReport> {
    let accesses: Vec<AccessRecord> = cex
        .states_named(ACCESS_STATE_PREFIX)
        .filter_map(|s| index.access(s))
        .collect();
    let Some((second, earlier)) = accesses.split_last() else {
        return Vec::new();
    };
    if let Some(resource) = attributes.get(RESOURCE_ATTR)
        && *resource != second.resource
    {
        return Vec::new();
    }
    let watched = second.address.or_else(|| {
        let var = watched_offset(&second.resource);
        cex.states.iter().rev().find_map(|s| parse_value(s.get(&var)?))
    });

    let mut seen = BTreeSet::new();
    earlier
        .iter()
        .rev()
        .filter(|first| first.resource == second.resource && first.instance != second.instance)
        .filter(|first| first.access == "write" || second.access == "write")
        .filter(|first| match (first.address, watched) {
            (Some(address), Some(watched)) => address == watched,
            _ => true,
        })
        .filter(|first| seen.insert(first.location.clone()))
        .map(|first| ErrorReport::Race {
            resource: second.resource.clone(),
            first: first.clone(),
            second: second.clone(),
        })
        .collect()
}

fn interpret_deadlock(index: &CaptureIndex, cex: &Counterexample) -> ErrorReport {
    let check = cex
        .states_named(CHECK_DEADLOCK_STATE)
        .last()
        .and_then(|s| index.get(&s.name));
    match check {
        Some(attrs) => ErrorReport::Deadlock {
            entry_point: attrs
                .string_value(ENTRYPOINT_ATTR)
                .map_or_else(|| cex.procedure.clone(), |i| index.entry_point_of(i)),
            location: Location::from_attrs(attrs),
        },
        None => ErrorReport::Deadlock {
            entry_point: cex.procedure.clone(),
            location: None,
        },
    }
}
