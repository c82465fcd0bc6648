//! Abstraction over verifier back ends.
//!
//! The pipeline only needs two questions answered: does a procedure verify,
//! and which candidate guards are refuted. [`ProcessBackend`] answers both
//! by running an external tool; tests substitute in-memory backends.

use lockwatch_ir::Program;

use crate::config::VerifierConfig;
use crate::error::VerifierError;
use crate::process::ProcessBackend;
use crate::result::VerifierResult;

/// Trait abstracting over different verifier back ends.
pub trait VerifierBackend: Send + Sync {
    /// Verify `procedure` of `program`.
    ///
    /// Returns:
    /// - `Ok(VerifierResult::Proved)` if every assertion holds
    /// - `Ok(VerifierResult::Disproved(cex))` with the failing trace
    /// - `Ok(VerifierResult::Inconclusive(reason))` / `ResourceExhausted`
    /// - `Err(VerifierError)` if the verifier invocation failed
    fn verify(&self, program: &Program, procedure: &str) -> Result<VerifierResult, VerifierError>;

    /// Guards among `guards` whose clauses do not hold when every guard in
    /// `guards` is assumed true.
    fn refute_candidates(
        &self,
        program: &Program,
        guards: &[String],
    ) -> Result<Vec<String>, VerifierError>;
}

/// Create the process back end for `config`.
pub fn create_backend(config: VerifierConfig) -> Result<Box<dyn VerifierBackend>, VerifierError> {
    config.validate()?;
    tracing::debug!(verifier = %config.verifier_path.display(), "Using process backend");
    Ok(Box::new(ProcessBackend::new(config)))
}

/// Create the back end for the auto-detected verifier.
pub fn create_default_backend() -> Result<Box<dyn VerifierBackend>, VerifierError> {
    create_backend(VerifierConfig::auto_detect()?)
}
