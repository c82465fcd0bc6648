use std::fmt;

use lockwatch_ir::IrError;

/// Errors raised by the analysis pipeline.
///
/// Configuration errors stem from inconsistent driver metadata. Invariant
/// violations mean a pass found the program in a shape an earlier pass
/// should have guaranteed; they abort instead of emitting an unsound program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// An entry point named in the metadata has no procedure body.
    EntryPointWithoutBody(String),
    /// The metadata names a procedure that does not exist at all.
    UnknownEntryPoint(String),
    /// More than one entry point is bound to the init host function.
    DuplicateInitEntryPoint { first: String, second: String },
    /// The driver metadata could not be read.
    Metadata(String),
    /// An access command has no `sourceloc` assume directly before it.
    MissingSourceLocation { procedure: String, block: String },
    /// A lock operation does not have the expected single pointer argument.
    MalformedLockCall { procedure: String, callee: String },
    /// A pass expected a procedure that is absent.
    MissingProcedure(String),
    /// Some other structural invariant did not hold.
    Invariant(String),
    /// The rewritten program is no longer well formed.
    Ir(IrError),
}

impl AnalysisError {
    /// Whether this is a configuration problem rather than an internal defect.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AnalysisError::EntryPointWithoutBody(_)
                | AnalysisError::UnknownEntryPoint(_)
                | AnalysisError::DuplicateInitEntryPoint { .. }
                | AnalysisError::Metadata(_)
        )
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::EntryPointWithoutBody(name) => {
                write!(f, "entry point '{name}' has no implementation")
            }
            AnalysisError::UnknownEntryPoint(name) => {
                write!(f, "entry point '{name}' is not declared in the program")
            }
            AnalysisError::DuplicateInitEntryPoint { first, second } => write!(
                f,
                "cannot have more than one init entry point ('{first}' and '{second}')"
            ),
            AnalysisError::Metadata(msg) => write!(f, "invalid driver metadata: {msg}"),
            AnalysisError::MissingSourceLocation { procedure, block } => write!(
                f,
                "access in '{procedure}' block '{block}' is not preceded by a source location"
            ),
            AnalysisError::MalformedLockCall { procedure, callee } => {
                write!(f, "malformed call to '{callee}' in '{procedure}'")
            }
            AnalysisError::MissingProcedure(name) => write!(f, "procedure '{name}' not found"),
            AnalysisError::Invariant(msg) => write!(f, "instrumentation invariant violated: {msg}"),
            AnalysisError::Ir(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Ir(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IrError> for AnalysisError {
    fn from(err: IrError) -> Self {
        AnalysisError::Ir(err)
    }
}
