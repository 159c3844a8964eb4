// DYNAMIC POLICY
// SERVICE GROWS AND SHRINKS WITH LOAD. JOBS ON THE ELASTIC CORE ARE PAUSED
// WHEN THE SERVICE TAKES IT BACK AND RE-ENTER THE SRPT QUEUE.

use anyhow::Result;

use crate::controller::{self, Reclaim};
use crate::engine::{self, TickCtx};
use crate::tuning::LcsPlacement;

use super::{warn_unknown, Policy};

#[derive(Default)]
pub struct DynamicPolicy;

impl DynamicPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for DynamicPolicy {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn init(&mut self, ctx: &mut TickCtx<'_>) -> Result<()> {
        warn_unknown(ctx, "HEAVY", &ctx.config.heavy);
        // START SHARED: THE FIRST FULL WINDOW DECIDES WHETHER TO SHRINK
        controller::pin_service(ctx, LcsPlacement::Shared)
    }

    fn tick(&mut self, ctx: &mut TickCtx<'_>) -> Result<()> {
        // 1. RECLAIM OR RELEASE THE ELASTIC CORE
        controller::step(ctx, Reclaim::Preempt)?;

        // 2. A FREED ELASTIC CORE GOES TO A HEAVY JOB FIRST
        if ctx.state.lcs == LcsPlacement::Isolated {
            engine::promote_heavy(ctx)?;
        }

        // 3. WHATEVER IS STILL IDLE GOES TO THE SRPT QUEUE
        engine::place_srpt(ctx)?;
        Ok(())
    }
}
