//! Ordered passes turning a driver program into one checker per pair.

use lockwatch_ir::Program;
use serde::Serialize;

use crate::context::AnalysisContext;
use crate::entry_point::DriverModel;
use crate::error::AnalysisError;
use crate::instance::{Instance, SlicingPass};
use crate::instrumentation::{
    DeadlockPass, DomainKnowledgePass, ErrorReportingPass, LocksetPass, RacePass,
};
use crate::lock::{LockAbstractionPass, LockCatalog, LockCatalogPass};
use crate::metadata::DriverMetadata;
use crate::options::AnalysisOptions;
use crate::pair_checker::PairCheckerPass;
use crate::pairing::{self, EntryPointPair};
use crate::summary::{CandidateTable, SummaryPass};

/// One step of the pipeline. Passes run to completion one after another on
/// the same context and keep no state between runs.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError>;
}

pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// The full pass order for `options`.
    pub fn standard(options: &AnalysisOptions) -> Self {
        let mut passes: Vec<Box<dyn Pass>> = vec![
            Box::new(LockCatalogPass),
            Box::new(SlicingPass),
            Box::new(LockAbstractionPass),
            Box::new(LocksetPass),
            Box::new(RacePass),
            Box::new(DeadlockPass),
            Box::new(DomainKnowledgePass),
        ];
        if options.error_reporting {
            passes.push(Box::new(ErrorReportingPass));
        }
        if options.summaries {
            passes.push(Box::new(SummaryPass));
        }
        passes.push(Box::new(PairCheckerPass));
        Self { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        for pass in &self.passes {
            tracing::debug!(pass = pass.name(), pair = %ctx.pair, "Running pass");
            pass.run(ctx)?;
        }
        Ok(())
    }
}

/// Instrumented program of one pair plus the data produced alongside it.
#[derive(Debug, Clone, Serialize)]
pub struct PairProgram {
    pub pair: EntryPointPair,
    /// Name of the `{:entry_pair}` procedure to verify.
    pub checker: String,
    #[serde(skip)]
    pub program: Program,
    pub candidates: CandidateTable,
    pub instances: Vec<Instance>,
    pub locks: LockCatalog,
}

/// Run every pass for `pair` on a private copy of `program`.
pub fn instrument_pair(
    program: &Program,
    model: &DriverModel,
    pair: &EntryPointPair,
    options: &AnalysisOptions,
) -> Result<PairProgram, AnalysisError> {
    tracing::info!(pair = %pair, "Instrumenting pair");
    let mut ctx = AnalysisContext::new(program.clone(), model.clone(), options.clone(), pair.clone());
    Pipeline::standard(options).run(&mut ctx)?;
    ctx.program.validate()?;
    let checker = ctx
        .checker
        .take()
        .ok_or_else(|| AnalysisError::Invariant("pair checker was not built".into()))?;
    Ok(PairProgram {
        pair: ctx.pair,
        checker,
        program: ctx.program,
        candidates: ctx.candidates,
        instances: ctx.instances,
        locks: ctx.locks,
    })
}

/// A driver program bound to its metadata, ready to be paired and instrumented.
#[derive(Debug, Clone)]
pub struct DriverAnalysis {
    program: Program,
    model: DriverModel,
    options: AnalysisOptions,
}

impl DriverAnalysis {
    pub fn new(
        program: Program,
        metadata: &DriverMetadata,
        options: AnalysisOptions,
    ) -> Result<Self, AnalysisError> {
        program.validate()?;
        let model = DriverModel::build(&program, metadata)?;
        Ok(Self {
            program,
            model,
            options,
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn model(&self) -> &DriverModel {
        &self.model
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Every pair the host can run concurrently.
    pub fn pairs(&self) -> Vec<EntryPointPair> {
        pairing::enumerate_pairs(&self.model)
    }

    /// A pair named explicitly, bypassing the pairing rules.
    pub fn explicit_pair(&self, first: &str, second: &str) -> Result<EntryPointPair, AnalysisError> {
        for name in [first, second] {
            if self.model.entry_point(name).is_none() {
                return Err(AnalysisError::UnknownEntryPoint(name.to_string()));
            }
        }
        Ok(EntryPointPair::new(first, second))
    }

    pub fn instrument(&self, pair: &EntryPointPair) -> Result<PairProgram, AnalysisError> {
        instrument_pair(&self.program, &self.model, pair, &self.options)
    }
}
