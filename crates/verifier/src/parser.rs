use serde::Deserialize;

use crate::error::VerifierError;
use crate::result::VerifierResult;
use crate::trace::Counterexample;

/// JSON verdict printed by the verifier for one procedure.
#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum Verdict {
    Proved,
    Disproved {
        counterexample: Counterexample,
    },
    Inconclusive {
        #[serde(default)]
        reason: Option<String>,
    },
    ResourceExhausted {
        #[serde(default)]
        reason: Option<String>,
    },
    Timeout,
}

/// JSON answer to a candidate refutation query.
#[derive(Debug, Deserialize)]
struct Refutation {
    refuted: Vec<String>,
}

/// Parse the verifier's stdout into a `VerifierResult`.
///
/// Expected output is a single JSON object such as
/// `{"outcome": "disproved", "counterexample": {...}}`.
pub fn parse_verdict(stdout: &str, stderr: &str) -> Result<VerifierResult, VerifierError> {
    let stdout = stdout.trim();

    if stdout.is_empty() {
        if stderr.contains("timeout") {
            return Ok(VerifierResult::Inconclusive("timeout".to_string()));
        }
        if stderr.contains("out of memory") {
            return Ok(VerifierResult::ResourceExhausted("out of memory".to_string()));
        }
        return Err(missing_verdict(stderr));
    }

    let verdict: Verdict = serde_json::from_str(stdout).map_err(|e| malformed(&e, stdout))?;
    Ok(match verdict {
        Verdict::Proved => VerifierResult::Proved,
        Verdict::Disproved { counterexample } => VerifierResult::Disproved(counterexample),
        Verdict::Inconclusive { reason } => {
            VerifierResult::Inconclusive(reason.unwrap_or_else(|| fallback_reason(stderr)))
        }
        Verdict::ResourceExhausted { reason } => {
            VerifierResult::ResourceExhausted(reason.unwrap_or_else(|| fallback_reason(stderr)))
        }
        Verdict::Timeout => VerifierResult::Inconclusive("timeout".to_string()),
    })
}

/// Parse the guards the verifier refuted. Every refuted guard must be one
/// of `queried`.
pub fn parse_refutation(
    stdout: &str,
    stderr: &str,
    queried: &[String],
) -> Result<Vec<String>, VerifierError> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        if stderr.contains("timeout") {
            return Err(VerifierError::Timeout);
        }
        return Err(missing_verdict(stderr));
    }
    let refutation: Refutation = serde_json::from_str(stdout).map_err(|e| malformed(&e, stdout))?;
    if let Some(unknown) = refutation.refuted.iter().find(|g| !queried.contains(g)) {
        return Err(VerifierError::UnknownGuard(unknown.clone()));
    }
    Ok(refutation.refuted)
}

fn missing_verdict(stderr: &str) -> VerifierError {
    VerifierError::MissingVerdict {
        stderr: stderr.trim().to_string(),
    }
}

fn malformed(err: &serde_json::Error, output: &str) -> VerifierError {
    VerifierError::MalformedVerdict {
        reason: err.to_string(),
        output: output.to_string(),
    }
}

fn fallback_reason(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        "unknown".to_string()
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::FailureKind;

    #[test]
    fn parse_proved() {
        let result = parse_verdict(r#"{"outcome": "proved"}"#, "").unwrap();
        assert_eq!(result, VerifierResult::Proved);
    }

    #[test]
    fn parse_disproved_with_trace() {
        let stdout = r#"
            {"outcome": "disproved",
             "counterexample": {
                "failure": {"kind": "assert", "attributes": {"race_checking": ""}},
                "procedure": "check$a$b",
                "states": [{"name": "access_state_0", "assignments": {"x": "1"}}]
             }}"#;
        let result = parse_verdict(stdout, "").unwrap();
        let cex = result.counterexample().unwrap();
        assert_eq!(cex.procedure, "check$a$b");
        assert!(matches!(cex.failure, FailureKind::Assert { .. }));
        assert_eq!(cex.states[0].get("x"), Some("1"));
    }

    #[test]
    fn parse_inconclusive_uses_stderr() {
        let result = parse_verdict(r#"{"outcome": "inconclusive"}"#, "solver gave up\n").unwrap();
        assert_eq!(result, VerifierResult::Inconclusive("solver gave up".to_string()));
    }

    #[test]
    fn parse_timeout_variants() {
        assert_eq!(
            parse_verdict(r#"{"outcome": "timeout"}"#, "").unwrap(),
            VerifierResult::Inconclusive("timeout".to_string())
        );
        assert_eq!(
            parse_verdict("", "error: timeout reached").unwrap(),
            VerifierResult::Inconclusive("timeout".to_string())
        );
    }

    #[test]
    fn parse_resource_exhausted() {
        let result =
            parse_verdict(r#"{"outcome": "resource_exhausted", "reason": "memory"}"#, "").unwrap();
        assert_eq!(result, VerifierResult::ResourceExhausted("memory".to_string()));
    }

    #[test]
    fn parse_garbage_is_malformed() {
        assert!(matches!(
            parse_verdict("sat", ""),
            Err(VerifierError::MalformedVerdict { output, .. }) if output == "sat"
        ));
        assert!(matches!(
            parse_verdict(r#"{"outcome": "maybe"}"#, ""),
            Err(VerifierError::MalformedVerdict { .. })
        ));
    }

    #[test]
    fn empty_stdout_is_missing_verdict() {
        assert_eq!(
            parse_verdict("", "  warning: unused label\n"),
            Err(VerifierError::MissingVerdict {
                stderr: "warning: unused label".into()
            })
        );
    }

    #[test]
    fn parse_refuted_guards() {
        let queried = vec!["_b$ls$a$1$0".to_string(), "_b$ac$a$1$0".to_string()];
        let refuted = parse_refutation(r#"{"refuted": ["_b$ls$a$1$0"]}"#, "", &queried).unwrap();
        assert_eq!(refuted, vec!["_b$ls$a$1$0".to_string()]);
        assert_eq!(parse_refutation("", "timeout", &queried), Err(VerifierError::Timeout));
    }

    #[test]
    fn refuting_unqueried_guard_is_error() {
        let queried = vec!["_b$ls$a$1$0".to_string()];
        assert_eq!(
            parse_refutation(r#"{"refuted": ["_b$dk$b$2$0"]}"#, "", &queried),
            Err(VerifierError::UnknownGuard("_b$dk$b$2$0".into()))
        );
    }
}
