use crate::trace::Counterexample;

/// Verdict of the verifier on one procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifierResult {
    /// Every assertion holds.
    Proved,
    /// Some assertion fails along the reported trace.
    Disproved(Counterexample),
    /// The verifier could not decide (timeout, incompleteness).
    Inconclusive(String),
    /// The verifier ran out of memory or another resource.
    ResourceExhausted(String),
}

impl VerifierResult {
    pub fn is_proved(&self) -> bool {
        matches!(self, VerifierResult::Proved)
    }

    pub fn is_disproved(&self) -> bool {
        matches!(self, VerifierResult::Disproved(_))
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, VerifierResult::Inconclusive(_))
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, VerifierResult::ResourceExhausted(_))
    }

    pub fn counterexample(&self) -> Option<&Counterexample> {
        match self {
            VerifierResult::Disproved(cex) => Some(cex),
            _ => None,
        }
    }
}
