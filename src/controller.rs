// COSCHED SERVICE CONTROLLER
// GROWS THE SERVICE ONTO THE ELASTIC CORE UNDER LOAD, SHRINKS IT BACK WHEN
// IT GOES QUIET AND A BATCH JOB IS WAITING FOR THE CORE.
//
// DECISIONS ONLY ON A FRESH SAMPLE WITH A FULL WINDOW. A SHORT OR FAILED
// SAMPLE LEAVES THE PLACEMENT WHERE IT IS.

use anyhow::{Context, Result};

use crate::cores::{CoreList, ELASTIC_CORE, SERVICE_HOME_CORE};
use crate::engine::{self, TickCtx};
use crate::tuning::{detect_placement, LcsPlacement};

// WHAT HAPPENS TO BATCH JOBS SITTING ON THE ELASTIC CORE WHEN THE SERVICE TAKES IT
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reclaim {
    Preempt,   // PAUSE THEM; THEY RE-ENTER THE SRPT QUEUE WITH A CHARGED ESTIMATE
    Repin,     // SHRINK THEM ONTO THE NON-RESERVED CORES AND KEEP THEM RUNNING
}

// ONE CONTROLLER STEP. RETURNS THE NEW PLACEMENT IF IT CHANGED.
pub fn step(ctx: &mut TickCtx<'_>, reclaim: Reclaim) -> Result<Option<LcsPlacement>> {
    if !ctx.fresh_sample || !ctx.state.window.is_full() {
        return Ok(None);
    }
    let current = ctx.state.lcs;
    let next = detect_placement(
        current,
        &ctx.state.window,
        ctx.config.low_pct,
        ctx.config.high_pct,
        ctx.state.registry.has_admittable(),
    );
    if next == current {
        return Ok(None);
    }

    log_info!(
        "SERVICE {} -> {} (CPU0 WINDOW {:?})",
        current.label(),
        next.label(),
        ctx.state.window.window(SERVICE_HOME_CORE)
    );
    apply(ctx, next, reclaim)?;
    Ok(Some(next))
}

// PIN THE SERVICE FOR `placement`, THEN CLEAR THE ELASTIC CORE IF IT WAS TAKEN.
pub fn apply(ctx: &mut TickCtx<'_>, placement: LcsPlacement, reclaim: Reclaim) -> Result<()> {
    pin_service(ctx, placement)?;
    ctx.state.placement_changes += 1;
    if placement != LcsPlacement::Shared {
        return Ok(());
    }

    let reserved = CoreList::range(0, placement.reserved());
    for name in engine::jobs_on(ctx.state, ELASTIC_CORE) {
        match reclaim {
            Reclaim::Preempt => {
                engine::preempt(ctx, &name)?;
            }
            Reclaim::Repin => {
                let mut grant = ctx.state.registry.job(&name)?.cores().without(&reserved);
                if grant.is_empty() {
                    grant = CoreList::range(placement.reserved(), ctx.state.cores);
                }
                engine::repin(ctx, &name, grant)?;
            }
        }
    }
    Ok(())
}

// SERVICE AFFINITY ONLY. FAILURE IS FATAL: THE SERVICE'S REAL MASK IS UNKNOWN.
pub fn pin_service(ctx: &mut TickCtx<'_>, placement: LcsPlacement) -> Result<()> {
    let cores = CoreList::range(0, placement.reserved());
    ctx.service.set_affinity(&cores)
        .with_context(|| format!("SET SERVICE AFFINITY CPUS {}", cores))?;
    ctx.state.lcs = placement;
    Ok(())
}
