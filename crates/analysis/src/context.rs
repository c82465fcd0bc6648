//! State threaded through the passes instrumenting one pair.

use std::collections::BTreeSet;

use lockwatch_ir::Program;

use crate::entry_point::DriverModel;
use crate::error::AnalysisError;
use crate::instance::Instance;
use crate::instrumentation::strategy::{self, ShadowStrategy};
use crate::lock::LockCatalog;
use crate::options::AnalysisOptions;
use crate::pairing::EntryPointPair;
use crate::resolver::ResolverCache;
use crate::shared_state::{self, MemoryRegion};
use crate::summary::CandidateTable;

/// Everything the passes of one pair read and write.
///
/// The context owns its program copy exclusively; passes receive it by
/// `&mut` one at a time.
pub struct AnalysisContext {
    pub program: Program,
    pub model: DriverModel,
    pub options: AnalysisOptions,
    pub pair: EntryPointPair,
    pub regions: Vec<MemoryRegion>,
    pub locks: LockCatalog,
    pub instances: Vec<Instance>,
    pub candidates: CandidateTable,
    pub resolver_cache: ResolverCache,
    /// Name of the pair checker once built.
    pub checker: Option<String>,
    /// Procedures with a body before any pass ran.
    pub(crate) base_procedures: BTreeSet<String>,
    pub(crate) strategy: Box<dyn ShadowStrategy>,
}

impl AnalysisContext {
    pub fn new(
        program: Program,
        model: DriverModel,
        options: AnalysisOptions,
        pair: EntryPointPair,
    ) -> Self {
        let regions = shared_state::discover_regions(&program);
        let strategy = strategy::for_kind(options.strategy);
        let base_procedures = program
            .procedures
            .iter()
            .filter(|p| !p.is_declaration())
            .map(|p| p.name.clone())
            .collect();
        Self {
            program,
            model,
            options,
            pair,
            regions,
            locks: LockCatalog::default(),
            instances: Vec::new(),
            candidates: CandidateTable::default(),
            resolver_cache: ResolverCache::new(),
            checker: None,
            base_procedures,
            strategy,
        }
    }

    pub fn strategy(&self) -> &dyn ShadowStrategy {
        self.strategy.as_ref()
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// The instance on the other side of `index`.
    pub fn other_index(&self, index: usize) -> usize {
        if self.instances.len() < 2 { index } else { 1 - index }
    }

    /// Index of the instance owning procedure `proc`.
    pub fn owner_of(&self, proc: &str) -> Option<usize> {
        self.instances.iter().position(|i| i.owns(proc))
    }

    pub(crate) fn require_instances(&self, pass: &str) -> Result<(), AnalysisError> {
        if self.instances.len() == 2 {
            Ok(())
        } else {
            Err(AnalysisError::Invariant(format!(
                "pass '{pass}' needs both instances, found {}",
                self.instances.len()
            )))
        }
    }
}
