// FIXED POLICY
// BASELINE: SERVICE PINNED TO CORES 0-1 FOR THE WHOLE RUN, JOBS START IN
// CATALOG ORDER ON EXACTLY `threads` IDLE CORES, AT MOST ONE PER TICK.
// NO PREEMPTION, NO CONTROLLER.

use anyhow::Result;

use crate::controller;
use crate::cores::CoreList;
use crate::engine::{self, TickCtx};
use crate::job::JobState;
use crate::tuning::LcsPlacement;

use super::Policy;

#[derive(Default)]
pub struct FixedPolicy;

impl FixedPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for FixedPolicy {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn init(&mut self, ctx: &mut TickCtx<'_>) -> Result<()> {
        controller::pin_service(ctx, LcsPlacement::Shared)
    }

    fn tick(&mut self, ctx: &mut TickCtx<'_>) -> Result<()> {
        // HEAD OF LINE BLOCKS: A WIDE JOB WAITS RATHER THAN BEING OVERTAKEN
        let head = ctx.state.registry.iter()
            .find(|j| j.state() == JobState::Created)
            .map(|j| (j.name().to_string(), j.threads()));
        let (name, threads) = match head {
            Some(h) => h,
            None => return Ok(()),
        };

        let free = engine::free_cores(ctx.state);
        if free.len() < threads {
            log_debug!("FIFO HEAD {} WAITING FOR {} CORES ({} FREE)", name, threads, free.len());
            return Ok(());
        }
        let grant = CoreList::from_cores(free.into_iter().take(threads));
        engine::admit(ctx, &name, grant)
    }
}
