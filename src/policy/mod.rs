// COSCHED POLICIES
// ONE STRATEGY PER DEPLOYMENT MODE. THE SCHEDULER LOOP OWNS SAMPLING,
// COMPLETION POLLING, AND TELEMETRY; A POLICY ONLY DECIDES PLACEMENT.
//
//   dynamic: HYSTERESIS CONTROLLER + SRPT WITH COLOCATION + HEAVY-JOB PROMOTION
//   large:   HYSTERESIS CONTROLLER + ONE PRIMARY ON ALL FREE CORES + SECONDARY FILLER
//   fixed:   SERVICE PINNED TO 0-1, FIFO ONE ADMISSION PER TICK

use anyhow::Result;

use crate::engine::TickCtx;

pub mod dynamic;
pub mod fixed;
pub mod large;

pub use dynamic::DynamicPolicy;
pub use fixed::FixedPolicy;
pub use large::LargePolicy;

pub trait Policy {
    fn name(&self) -> &'static str;

    // AFTER EVERY JOB IS CREATED, BEFORE THE FIRST TICK
    fn init(&mut self, ctx: &mut TickCtx<'_>) -> Result<()>;

    // ONCE PER SAMPLING INTERVAL
    fn tick(&mut self, ctx: &mut TickCtx<'_>) -> Result<()>;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum PolicyKind {
    Dynamic,
    Large,
    Fixed,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn Policy> {
        match self {
            Self::Dynamic => Box::new(DynamicPolicy::new()),
            Self::Large => Box::new(LargePolicy::new()),
            Self::Fixed => Box::new(FixedPolicy::new()),
        }
    }
}

// NAMES IN THE CONFIG THAT THE CATALOG DOES NOT CARRY ARE IGNORED, LOUDLY
pub(crate) fn warn_unknown(ctx: &TickCtx<'_>, what: &str, names: &[String]) {
    for name in names {
        if ctx.state.registry.get(name).is_none() {
            log_warn!("{} JOB {} NOT IN CATALOG, IGNORED", what, name);
        }
    }
}
