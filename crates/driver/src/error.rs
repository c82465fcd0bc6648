use std::fmt;
use std::path::PathBuf;

use lockwatch_analysis::AnalysisError;
use lockwatch_ir::IrError;
use lockwatch_verifier::VerifierError;

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done = 0,
    FatalError = 1,
    ParsingError = 2,
    InstrumentationError = 3,
    LocksetAnalysisError = 4,
}

impl Outcome {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Errors that abort a driver run.
#[derive(Debug)]
pub enum DriverError {
    Io { path: PathBuf, message: String },
    /// Input program or metadata could not be parsed.
    Parse(String),
    Analysis(AnalysisError),
    Verifier(VerifierError),
    /// The worker pool could not be set up.
    ThreadPool(String),
}

impl DriverError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Exit status this error terminates the run with.
    pub fn outcome(&self) -> Outcome {
        match self {
            DriverError::Parse(_) => Outcome::ParsingError,
            DriverError::Analysis(err) if err.is_configuration() => Outcome::ParsingError,
            DriverError::Analysis(AnalysisError::Ir(IrError::Parse(_))) => Outcome::ParsingError,
            DriverError::Analysis(_) => Outcome::InstrumentationError,
            DriverError::Io { .. } | DriverError::Verifier(_) | DriverError::ThreadPool(_) => {
                Outcome::FatalError
            }
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Io { path, message } => write!(f, "{}: {message}", path.display()),
            DriverError::Parse(msg) => write!(f, "parse error: {msg}"),
            DriverError::Analysis(err) => write!(f, "{err}"),
            DriverError::Verifier(err) => write!(f, "{err}"),
            DriverError::ThreadPool(msg) => write!(f, "failed to start worker pool: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Analysis(err) => Some(err),
            DriverError::Verifier(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AnalysisError> for DriverError {
    fn from(err: AnalysisError) -> Self {
        DriverError::Analysis(err)
    }
}

impl From<VerifierError> for DriverError {
    fn from(err: VerifierError) -> Self {
        DriverError::Verifier(err)
    }
}

impl From<IrError> for DriverError {
    fn from(err: IrError) -> Self {
        match err {
            IrError::Parse(msg) => DriverError::Parse(msg),
            other => DriverError::Analysis(AnalysisError::Ir(other)),
        }
    }
}
