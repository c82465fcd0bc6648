//! # lockwatch-verifier
//!
//! Interface to the external verifier that discharges pair checkers.
//!
//! The verifier runs as a separate process: the printed program is piped to
//! its stdin and a JSON verdict is read back from stdout. On top of that,
//! [`houdini`] eliminates refuted candidate invariants before the final check.
//!
//! ## Usage
//!
//! ```no_run
//! use lockwatch_ir::Program;
//! use lockwatch_verifier::{ProcessBackend, VerifierBackend, VerifierConfig, VerifierResult};
//!
//! let backend = ProcessBackend::new(VerifierConfig::auto_detect().unwrap());
//! let program = Program::new();
//! match backend.verify(&program, "check$a$b").unwrap() {
//!     VerifierResult::Proved => println!("no race"),
//!     VerifierResult::Disproved(cex) => println!("failure in {}", cex.procedure),
//!     other => println!("{other:?}"),
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod houdini;
mod parser;
pub mod process;
pub mod result;
pub mod trace;

pub use backend::{VerifierBackend, create_backend, create_default_backend};
pub use config::VerifierConfig;
pub use error::VerifierError;
pub use houdini::{
    HoudiniOutcome, apply_candidates, candidate_guards, eliminate_candidates,
    eliminate_candidates_bounded,
};
pub use process::ProcessBackend;
pub use result::VerifierResult;
pub use trace::{CapturedState, Counterexample, FailureKind};
