//! Lockset facts: current locksets and per-region memory locksets.

use crate::context::AnalysisContext;
use crate::domain::HostLock;
use crate::instance::Instance;
use crate::instrumentation::{cls_var, mls_var};

use super::{GuardFamily, SummaryFact};

/// Facts about the locks `inst` holds and has held at every access.
///
/// Power and rtnl locks only get candidates when the instance touches them;
/// otherwise their value is fixed for the whole entry point.
pub fn facts(ctx: &AnalysisContext, inst: &Instance) -> Vec<SummaryFact> {
    let strategy = ctx.strategy();
    let mut out = Vec::new();
    for lock in ctx.locks.iter() {
        let relevant = match lock.host_lock() {
            Some(HostLock::Power) => inst.flags.calls_power_lock,
            Some(HostLock::Rtnl) => inst.flags.calls_rtnl_assertion,
            _ => true,
        };
        if relevant {
            out.push(SummaryFact::scalar(GuardFamily::Lockset, &cls_var(&lock.name, inst)));
        }
    }
    for region in ctx.regions.iter().filter(|r| inst.flags.accesses_region(&r.name)) {
        let index = region.index_type();
        for lock in ctx.locks.iter() {
            let var = mls_var(&region.name, &lock.name, inst);
            out.push(SummaryFact {
                family: GuardFamily::Lockset,
                holds: strategy.everywhere(&var, true, &index),
                fails: strategy.everywhere(&var, false, &index),
            });
        }
    }
    out
}
