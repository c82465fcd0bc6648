//! Lockset-based race and deadlock instrumentation for driver programs.
//!
//! A driver is a set of entry points the host may invoke concurrently. For
//! every pair the host can actually run together, the pipeline copies both
//! entry points into per-side instances, abstracts lock operations to
//! catalog constants, instruments shadow locksets around every shared
//! memory access, and merges both sides into a `{:entry_pair}` checker
//! procedure whose assertions fail exactly when a race or a lock leaked at
//! return is possible.

pub mod call_graph;
pub mod context;
pub mod domain;
pub mod entry_point;
pub mod error;
pub mod instance;
pub mod instrumentation;
pub mod lock;
pub mod metadata;
pub mod options;
pub mod pair_checker;
pub mod pairing;
pub mod pipeline;
pub mod resolver;
pub mod shared_state;
pub mod summary;

pub use context::AnalysisContext;
pub use domain::{HostCall, HostLock};
pub use entry_point::{DriverModel, EntryPoint, EntryPointFlags};
pub use error::AnalysisError;
pub use instance::Instance;
pub use lock::{Lock, LockCatalog};
pub use metadata::DriverMetadata;
pub use options::{AnalysisOptions, StrategyKind};
pub use pairing::{EntryPointPair, can_be_paired, enumerate_pairs};
pub use pipeline::{DriverAnalysis, Pass, PairProgram, Pipeline, instrument_pair};
pub use resolver::{Resolution, Resolver, RootAddress};
pub use shared_state::{AccessKind, MemoryRegion};
pub use summary::{Candidate, CandidateKind, CandidateTable};
