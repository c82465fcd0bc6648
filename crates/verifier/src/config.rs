use std::path::PathBuf;

use crate::error::VerifierError;

/// Binary looked up on `PATH` when no verifier is configured.
pub const DEFAULT_VERIFIER: &str = "lockwatch-verify";

/// Environment variable naming the verifier binary.
pub const VERIFIER_ENV: &str = "LOCKWATCH_VERIFIER";

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Path to the verifier binary.
    pub verifier_path: PathBuf,
    /// Timeout in milliseconds (0 = no timeout).
    pub timeout_ms: u64,
    /// Arguments passed before the generated ones.
    pub extra_args: Vec<String>,
}

impl VerifierConfig {
    pub fn new(verifier_path: PathBuf) -> Self {
        Self {
            verifier_path,
            timeout_ms: 0,
            extra_args: Vec::new(),
        }
    }

    /// Create config with a specific timeout (in milliseconds).
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Locate the verifier.
    ///
    /// Tries `$LOCKWATCH_VERIFIER` first, then `which lockwatch-verify`.
    pub fn auto_detect() -> Result<Self, VerifierError> {
        if let Ok(path) = std::env::var(VERIFIER_ENV)
            && !path.is_empty()
        {
            return Ok(Self::new(PathBuf::from(path)));
        }

        if let Ok(output) = std::process::Command::new("which")
            .arg(DEFAULT_VERIFIER)
            .output()
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                let path = PathBuf::from(&path_str);
                if path.exists() {
                    return Ok(Self::new(path));
                }
            }
        }

        Err(VerifierError::NotFound(PathBuf::from(DEFAULT_VERIFIER)))
    }

    /// Arguments verifying `procedure`.
    pub fn verify_args(&self, procedure: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.push("--procedure".to_string());
        args.push(procedure.to_string());
        args
    }

    /// Arguments asking which of `guards` are refuted.
    pub fn refute_args(&self, guards: &[String]) -> Vec<String> {
        let mut args = self.base_args();
        args.push("--refute-candidates".to_string());
        args.extend(guards.iter().cloned());
        args
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        if self.timeout_ms > 0 {
            args.push(format!("--timeout={}", self.timeout_ms.div_ceil(1000)));
        }
        args
    }

    /// Validate that the configured verifier binary exists.
    pub fn validate(&self) -> Result<(), VerifierError> {
        if !self.verifier_path.exists() {
            return Err(VerifierError::NotFound(self.verifier_path.clone()));
        }
        Ok(())
    }
}
