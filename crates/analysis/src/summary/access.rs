//! Access facts: whether a region has been written or read.

use crate::context::AnalysisContext;
use crate::instance::Instance;
use crate::instrumentation::{read_var, written_var};

use super::{GuardFamily, SummaryFact};

pub fn facts(ctx: &AnalysisContext, inst: &Instance) -> Vec<SummaryFact> {
    let strategy = ctx.strategy();
    let mut out = Vec::new();
    for region in ctx.regions.iter().filter(|r| inst.flags.accesses_region(&r.name)) {
        let index = region.index_type();
        for var in [written_var(&region.name, inst), read_var(&region.name, inst)] {
            out.push(SummaryFact {
                family: GuardFamily::Access,
                holds: strategy.everywhere(&var, true, &index),
                fails: strategy.everywhere(&var, false, &index),
            });
        }
    }
    out
}
