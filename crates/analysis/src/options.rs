use std::fmt;

/// Shadow-state encoding used for memory locksets and access flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrategyKind {
    /// One tracked address per region; scalar shadow state.
    #[default]
    Watchdog,
    /// Address-indexed shadow maps.
    Map,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Watchdog => write!(f, "watchdog"),
            StrategyKind::Map => write!(f, "map"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "watchdog" | "scalar" => Ok(StrategyKind::Watchdog),
            "map" | "indexed" => Ok(StrategyKind::Map),
            _ => Err(format!(
                "Unknown shadow strategy: {s}. Valid options: watchdog, map"
            )),
        }
    }
}

/// Knobs of one instrumentation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub strategy: StrategyKind,
    /// Emit candidate pre/postconditions and loop invariants.
    pub summaries: bool,
    /// Emit captured-state metadata used to explain counterexamples.
    pub error_reporting: bool,
    /// Upper bound on definitions followed by one address resolution.
    pub max_resolver_depth: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Watchdog,
            summaries: true,
            error_reporting: true,
            max_resolver_depth: 256,
        }
    }
}

impl AnalysisOptions {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_summaries(mut self, enabled: bool) -> Self {
        self.summaries = enabled;
        self
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.error_reporting = enabled;
        self
    }

    pub fn with_max_resolver_depth(mut self, depth: usize) -> Self {
        self.max_resolver_depth = depth;
        self
    }
}
