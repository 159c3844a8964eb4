// COSCHED PLACEMENT ENGINE
// OCCUPANCY, FREE CORES, SRPT ADMISSION, COLOCATION, PROMOTION, COMPLETION
//
// OCCUPANCY IS ALWAYS DERIVED FROM THE REGISTRY (RUNNING JOBS' CORES) PLUS
// THE SERVICE'S CURRENT RESERVATION. NOTHING CACHES IT ACROSS STEPS, SO A
// PREEMPTION EARLIER IN THE TICK IS VISIBLE TO EVERY LATER FREE-CORE QUERY.

use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};

use crate::cores::{Core, CoreList, ELASTIC_CORE};
use crate::job::{JobState, PauseCharge};
use crate::runtime::{JobRuntime, PauseOutcome, RunStatus, ServiceAffinity};
use crate::scheduler::SchedState;
use crate::tuning::SchedConfig;

// EVERYTHING ONE TICK IS ALLOWED TO TOUCH
pub struct TickCtx<'a> {
    pub state: &'a mut SchedState,
    pub runtime: &'a mut dyn JobRuntime,
    pub service: &'a mut dyn ServiceAffinity,
    pub config: &'a SchedConfig,
    pub now: Instant,
    pub fresh_sample: bool,   // FALSE WHEN THIS TICK'S SAMPLE FAILED
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Occupant {
    Service,
    Job(String),
}

// PER-CORE OCCUPANTS, INDEX = CORE
pub fn occupancy(state: &SchedState) -> Vec<Vec<Occupant>> {
    let mut cores: Vec<Vec<Occupant>> = vec![Vec::new(); state.cores];
    for core in state.service_cores().iter() {
        if let Some(slot) = cores.get_mut(core) {
            slot.push(Occupant::Service);
        }
    }
    for job in state.registry.iter() {
        if job.state() != JobState::Running {
            continue;
        }
        for core in job.cores().iter() {
            if let Some(slot) = cores.get_mut(core) {
                slot.push(Occupant::Job(job.name().to_string()));
            }
        }
    }
    cores
}

// RUNNING JOBS HOLDING `core`, CATALOG ORDER
pub fn jobs_on(state: &SchedState, core: Core) -> Vec<String> {
    state.registry.iter()
        .filter(|j| j.state() == JobState::Running && j.cores().contains(core))
        .map(|j| j.name().to_string())
        .collect()
}

// IDLE CORES, HIGHEST INDEX FIRST: CORES FAR FROM THE SERVICE ARE THE
// LEAST LIKELY TO BE RECLAIMED, SO JOBS LANDING THERE GET PAUSED LESS.
pub fn free_cores(state: &SchedState) -> Vec<Core> {
    let occ = occupancy(state);
    (0..state.cores).rev().filter(|&c| occ[c].is_empty()).collect()
}

pub fn elastic_core_free(state: &SchedState) -> bool {
    occupancy(state).get(ELASTIC_CORE).map(|o| o.is_empty()).unwrap_or(false)
}

// --- ACTIONS ---

// PIN THEN START (CREATED) OR UNPAUSE (PAUSED). ANY RUNTIME FAILURE IS FATAL:
// THE REGISTRY WOULD NO LONGER MATCH THE MACHINE.
pub fn admit(ctx: &mut TickCtx<'_>, name: &str, cores: CoreList) -> Result<()> {
    let job = ctx.state.registry.job(name)?;
    let state = job.state();
    if !state.is_admittable() {
        bail!("ADMIT JOB {}: STATE IS {}", name, state.label());
    }
    let handle = job.handle.clone()
        .ok_or_else(|| anyhow!("JOB {} WAS NEVER CREATED", name))?;

    ctx.runtime.set_core_affinity(&handle, &cores)
        .with_context(|| format!("SET AFFINITY JOB {} CPUS {}", name, cores))?;

    match state {
        JobState::Created => {
            ctx.runtime.start(&handle)
                .with_context(|| format!("START JOB {}", name))?;
            ctx.state.registry.job_mut(name)?.mark_started(cores.clone(), ctx.now)?;
            log_info!("STARTED JOB {} ON CPUS {}", name, cores);
        }
        _ => {
            ctx.runtime.unpause(&handle)
                .with_context(|| format!("UNPAUSE JOB {}", name))?;
            ctx.state.registry.job_mut(name)?.mark_unpaused(cores.clone(), ctx.now)?;
            log_info!("UNPAUSED JOB {} ON CPUS {}", name, cores);
        }
    }
    Ok(())
}

// PAUSE A RUNNING JOB. A JOB THAT ALREADY EXITED IS LEFT RUNNING IN THE
// REGISTRY; THE COMPLETION POLL RETIRES IT. RETURNS TRUE IF PAUSED.
pub fn preempt(ctx: &mut TickCtx<'_>, name: &str) -> Result<bool> {
    let job = ctx.state.registry.job(name)?;
    let handle = job.handle.clone()
        .ok_or_else(|| anyhow!("JOB {} WAS NEVER CREATED", name))?;

    match ctx.runtime.pause(&handle).with_context(|| format!("PAUSE JOB {}", name))? {
        PauseOutcome::Gone => {
            log_warn!("PAUSE JOB {}: CONTAINER ALREADY GONE, LEAVING IT TO THE COMPLETION POLL", name);
            Ok(false)
        }
        PauseOutcome::Paused => {
            let floor = ctx.config.eta_floor;
            let job = ctx.state.registry.job_mut(name)?;
            match job.mark_paused(ctx.now, floor)? {
                PauseCharge::Underflow => {
                    log_warn!("ETA UNDERESTIMATED FOR JOB {}: CLAMPED TO {}s", name, floor.as_secs());
                }
                PauseCharge::Charged(d) => {
                    log_debug!("JOB {} CHARGED {:.1}s", name, d.as_secs_f64());
                }
            }
            log_info!("PAUSED JOB {} ({:.1}s REMAINING)", name, job.remaining().as_secs_f64());
            ctx.state.preemptions += 1;
            Ok(true)
        }
    }
}

// MOVE A RUNNING JOB TO A NEW CORE SET
pub fn repin(ctx: &mut TickCtx<'_>, name: &str, cores: CoreList) -> Result<()> {
    let job = ctx.state.registry.job(name)?;
    if job.cores() == &cores {
        return Ok(());
    }
    let handle = job.handle.clone()
        .ok_or_else(|| anyhow!("JOB {} WAS NEVER CREATED", name))?;
    ctx.runtime.set_core_affinity(&handle, &cores)
        .with_context(|| format!("SET AFFINITY JOB {} CPUS {}", name, cores))?;
    ctx.state.registry.job_mut(name)?.set_cores(cores.clone())?;
    log_info!("JOB {} NOW RUNNING ON CPUS {}", name, cores);
    Ok(())
}

// --- ADMISSION ---

// SRPT ADMISSION AGAINST THE CURRENT FREE CORES.
// MULTI-CORE JOBS FIRST (FIRST FIT IN SRPT ORDER, EXACTLY `threads` CORES),
// THEN SINGLE-CORE JOBS ONE CORE EACH. WHEN IDLE CORES RUN OUT WITH SINGLES
// STILL WAITING, ONE MORE SINGLE SHARES THE LAST CORE GRANTED THIS TICK.
pub fn place_srpt(ctx: &mut TickCtx<'_>) -> Result<usize> {
    let mut free = free_cores(ctx.state);
    let (singles, multis): (Vec<String>, Vec<String>) = ctx.state.registry
        .admittable_srpt()
        .into_iter()
        .partition(|n| ctx.state.registry.get(n).map(|j| j.spec.is_single_core()).unwrap_or(false));

    let mut admitted = 0usize;

    for name in multis {
        let threads = ctx.state.registry.job(&name)?.threads();
        if free.len() < threads {
            continue;
        }
        let grant: Vec<Core> = free.drain(..threads).collect();
        admit(ctx, &name, CoreList::from_cores(grant))?;
        admitted += 1;
    }

    let mut singles = singles.into_iter();
    let mut last_grant: Option<Core> = None;
    while !free.is_empty() {
        let name = match singles.next() {
            Some(n) => n,
            None => break,
        };
        let core = free.remove(0);
        admit(ctx, &name, CoreList::from_cores([core]))?;
        last_grant = Some(core);
        admitted += 1;
    }

    if free.is_empty() {
        if let (Some(core), Some(name)) = (last_grant, singles.next()) {
            admit(ctx, &name, CoreList::from_cores([core]))?;
            log_info!("COLOCATED JOB {} ON CPU {}", name, core);
            admitted += 1;
        }
    }

    Ok(admitted)
}

// ELASTIC CORE JUST WENT IDLE. GROW THE FIRST RUNNING HEAVY JOB ONTO ALL
// IDLE CORES; IF NO HEAVY JOB RUNS, GIVE THE FIRST ADMITTABLE ONE EVERY
// NON-SERVICE CORE AND PAUSE EVERYTHING ELSE. RETURNS TRUE IF IT ACTED.
pub fn promote_heavy(ctx: &mut TickCtx<'_>) -> Result<bool> {
    if !elastic_core_free(ctx.state) {
        return Ok(false);
    }
    let heavy = ctx.config.heavy.clone();

    for name in &heavy {
        if ctx.state.registry.is_running(name) {
            let free = CoreList::from_cores(free_cores(ctx.state));
            let grant = ctx.state.registry.job(name)?.cores().union(&free);
            repin(ctx, name, grant)?;
            return Ok(true);
        }
    }

    for name in &heavy {
        if ctx.state.registry.is_admittable(name) {
            priority_admit(ctx, name)?;
            return Ok(true);
        }
    }

    Ok(false)
}

fn priority_admit(ctx: &mut TickCtx<'_>, name: &str) -> Result<()> {
    for other in ctx.state.registry.running() {
        preempt(ctx, &other)?;
    }
    let grant = CoreList::range(ctx.state.lcs.reserved(), ctx.state.cores);
    log_info!("PRIORITIZING HEAVY JOB {} ON CPUS {}", name, grant);
    admit(ctx, name, grant)
}

// --- COMPLETION ---

pub fn poll_completions(ctx: &mut TickCtx<'_>) -> Result<usize> {
    let mut done = 0usize;
    for name in ctx.state.registry.running() {
        let handle = ctx.state.registry.job(&name)?.handle.clone()
            .ok_or_else(|| anyhow!("JOB {} WAS NEVER CREATED", name))?;
        let status = ctx.runtime.inspect_status(&handle)
            .with_context(|| format!("INSPECT JOB {}", name))?;
        if status == RunStatus::Exited {
            ctx.state.registry.job_mut(&name)?.mark_completed()?;
            done += 1;
            log_info!(
                "COMPLETED JOB {} ({}/{})",
                name,
                ctx.state.registry.completed(),
                ctx.state.registry.len()
            );
        }
    }
    Ok(done)
}
