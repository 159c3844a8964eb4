// LARGE-JOB POLICY
// ONE PRIMARY JOB AT A TIME ON EVERY FREE CORE. JOBS ON THE ELASTIC CORE ARE
// SHRUNK, NOT PAUSED, WHEN THE SERVICE TAKES IT BACK. A DESIGNATED SECONDARY
// FILLS TWO CORES WHILE THE SERVICE IS SHARED AND YIELDS WHEN CORE 1 FREES.

use anyhow::Result;

use crate::controller::{self, Reclaim};
use crate::cores::CoreList;
use crate::engine::{self, TickCtx};
use crate::tuning::{LcsPlacement, LARGE_MIN_CORES};

use super::{warn_unknown, Policy};

#[derive(Default)]
pub struct LargePolicy;

impl LargePolicy {
    pub fn new() -> Self {
        Self
    }
}

fn is_secondary(ctx: &TickCtx<'_>, name: &str) -> bool {
    ctx.config.secondary.as_deref() == Some(name)
}

impl Policy for LargePolicy {
    fn name(&self) -> &'static str {
        "large"
    }

    fn init(&mut self, ctx: &mut TickCtx<'_>) -> Result<()> {
        if let Some(sec) = ctx.config.secondary.clone() {
            warn_unknown(ctx, "SECONDARY", &[sec]);
        }
        controller::pin_service(ctx, LcsPlacement::Shared)
    }

    fn tick(&mut self, ctx: &mut TickCtx<'_>) -> Result<()> {
        // 1. SERVICE PLACEMENT; ELASTIC-CORE JOBS MOVE TO THE BATCH CORES
        controller::step(ctx, Reclaim::Repin)?;

        // 2. ELASTIC CORE IDLE: RUNNING PRIMARIES GROW ONTO IT
        if engine::elastic_core_free(ctx.state) {
            for name in ctx.state.registry.running() {
                if is_secondary(ctx, &name) {
                    continue;
                }
                let free = CoreList::from_cores(engine::free_cores(ctx.state));
                if free.is_empty() {
                    break;
                }
                let grant = ctx.state.registry.job(&name)?.cores().union(&free);
                engine::repin(ctx, &name, grant)?;
            }
        }

        // 3. SECONDARY: ADMIT INTO A TWO-CORE GAP, YIELD WHEN CORE 1 FREES
        if let Some(sec) = ctx.config.secondary.clone() {
            let was_running = ctx.state.registry.is_running(&sec);
            let queue = ctx.state.registry.admittable_srpt();
            let free = engine::free_cores(ctx.state);

            if ctx.state.registry.is_admittable(&sec) {
                let gap = ctx.state.lcs == LcsPlacement::Shared && free.len() == LARGE_MIN_CORES;
                let alone = queue.len() == 1 && free.len() >= LARGE_MIN_CORES;
                if gap || alone {
                    engine::admit(ctx, &sec, CoreList::from_cores(free))?;
                }
            }

            let others_waiting = queue.iter().any(|n| *n != sec);
            if was_running && others_waiting && engine::elastic_core_free(ctx.state) {
                log_info!("SECONDARY {} YIELDING TO PRIMARY QUEUE", sec);
                engine::preempt(ctx, &sec)?;
            }
        }

        // 4. PRIMARY: SHORTEST WAITING NON-SECONDARY JOB TAKES EVERY FREE CORE
        let free = engine::free_cores(ctx.state);
        if free.len() >= LARGE_MIN_CORES {
            let next = ctx.state.registry.admittable_srpt()
                .into_iter()
                .find(|n| !is_secondary(ctx, n));
            if let Some(name) = next {
                engine::admit(ctx, &name, CoreList::from_cores(free))?;
            }
        }
        Ok(())
    }
}
