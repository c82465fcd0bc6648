use std::fmt;
use std::path::PathBuf;

/// Ways a conversation with the verifier process can fail.
///
/// A verdict of `inconclusive` or `resource_exhausted` is not an error; these
/// are failures to obtain any verdict at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierError {
    /// No verifier executable at the configured path.
    NotFound(PathBuf),
    /// An I/O step of the exchange failed (`action` is e.g. "start").
    Io { action: &'static str, message: String },
    /// The verifier exited unsuccessfully without printing a verdict.
    /// `code` is `None` when it was killed by a signal.
    Exit { code: Option<i32>, stderr: String },
    /// The verifier exited cleanly but stdout was empty.
    MissingVerdict { stderr: String },
    /// Stdout was not a verdict object of the expected shape.
    MalformedVerdict { reason: String, output: String },
    /// A refutation answer named a guard that was not part of the query.
    UnknownGuard(String),
    /// The verifier reported running out of time before answering.
    Timeout,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierError::NotFound(path) => {
                write!(f, "no verifier executable at {}", path.display())
            }
            VerifierError::Io { action, message } => {
                write!(f, "could not {action} the verifier: {message}")
            }
            VerifierError::Exit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "verifier exited with status {code} and no verdict")?,
                    None => write!(f, "verifier was killed before printing a verdict")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            VerifierError::MissingVerdict { stderr } if stderr.is_empty() => {
                write!(f, "verifier printed no verdict")
            }
            VerifierError::MissingVerdict { stderr } => {
                write!(f, "verifier printed no verdict (stderr: {stderr})")
            }
            VerifierError::MalformedVerdict { reason, output } => {
                write!(f, "malformed verdict `{output}`: {reason}")
            }
            VerifierError::UnknownGuard(guard) => {
                write!(f, "verifier refuted `{guard}`, which was not queried")
            }
            VerifierError::Timeout => write!(f, "verifier timed out before answering"),
        }
    }
}

impl std::error::Error for VerifierError {}
