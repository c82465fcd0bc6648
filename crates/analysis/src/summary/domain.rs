//! Domain facts: device registration state.

use crate::instance::Instance;
use crate::instrumentation::device_registered_var;

use super::{GuardFamily, SummaryFact};

pub fn facts(inst: &Instance) -> Vec<SummaryFact> {
    vec![SummaryFact::scalar(GuardFamily::Domain, &device_registered_var(inst))]
}
