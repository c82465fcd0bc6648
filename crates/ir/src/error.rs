use std::fmt;

/// Structural errors in an IR program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    /// A name is declared more than once in the same scope.
    DuplicateDeclaration(String),
    /// A call targets a procedure that does not exist.
    UnknownProcedure { caller: String, callee: String },
    /// A goto targets a label that does not exist in the procedure.
    UnknownBlock { procedure: String, label: String },
    /// Two blocks of one procedure share a label.
    DuplicateLabel { procedure: String, label: String },
    /// A call passes the wrong number of arguments.
    ArityMismatch {
        caller: String,
        callee: String,
        expected: usize,
        found: usize,
    },
    /// The program text could not be deserialized.
    Parse(String),
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrError::DuplicateDeclaration(name) => write!(f, "duplicate declaration of '{name}'"),
            IrError::UnknownProcedure { caller, callee } => {
                write!(f, "procedure '{caller}' calls unknown procedure '{callee}'")
            }
            IrError::UnknownBlock { procedure, label } => {
                write!(f, "procedure '{procedure}' jumps to unknown block '{label}'")
            }
            IrError::DuplicateLabel { procedure, label } => {
                write!(f, "procedure '{procedure}' declares block '{label}' twice")
            }
            IrError::ArityMismatch {
                caller,
                callee,
                expected,
                found,
            } => write!(
                f,
                "call from '{caller}' to '{callee}' passes {found} arguments, expected {expected}"
            ),
            IrError::Parse(msg) => write!(f, "failed to parse program: {msg}"),
        }
    }
}

impl std::error::Error for IrError {}

impl From<serde_json::Error> for IrError {
    fn from(err: serde_json::Error) -> Self {
        IrError::Parse(err.to_string())
    }
}
