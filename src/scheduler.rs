// COSCHED SCHEDULER
// OWNS THE COLLABORATORS AND DRIVES THE LOOP: CREATE, INIT, TICK, TEARDOWN
//
// EACH TICK: SAMPLE (BLOCKS ONE INTERVAL) -> POLICY -> COMPLETION POLL -> TELEMETRY.
// SINGLE-THREADED. THE ONLY CROSS-THREAD STATE IS THE SHUTDOWN FLAG.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use crate::cores::{CoreList, SERVICE_HOME_CORE};
use crate::engine::{self, TickCtx};
use crate::event::EventLog;
use crate::job::{JobSpec, JobState};
use crate::monitor::{UtilWindow, UtilizationSampler};
use crate::policy::Policy;
use crate::registry::{Counts, JobRegistry};
use crate::report;
use crate::runtime::{JobRuntime, ServiceAffinity};
use crate::tuning::{self, LcsPlacement, SchedConfig};

// MUTABLE SCHEDULING STATE. POLICIES SEE IT THROUGH TickCtx.
pub struct SchedState {
    pub registry: JobRegistry,
    pub lcs: LcsPlacement,
    pub window: UtilWindow,
    pub cores: usize,
    pub preemptions: u64,
    pub placement_changes: u64,
}

impl SchedState {
    // NO JOB MAY BE WIDER THAN THE MOST CORES EVER FREE (SERVICE ISOLATED)
    pub fn new(specs: Vec<JobSpec>, config: &SchedConfig) -> Result<Self> {
        config.validate()?;
        let widest = config.cores - LcsPlacement::Isolated.reserved();
        for spec in &specs {
            if spec.threads > widest {
                bail!(
                    "JOB {} NEEDS {} CORES, AT MOST {} OF {} ARE EVER FREE",
                    spec.name, spec.threads, widest, config.cores
                );
            }
        }
        Ok(Self {
            registry: JobRegistry::new(specs)?,
            lcs: LcsPlacement::Shared,
            window: UtilWindow::new(config.cores, config.window),
            cores: config.cores,
            preemptions: 0,
            placement_changes: 0,
        })
    }

    pub fn service_cores(&self) -> CoreList {
        CoreList::range(0, self.lcs.reserved())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunOutcome {
    Completed,     // EVERY JOB EXITED
    Interrupted,   // SHUTDOWN FLAG RAISED FIRST
}

#[derive(Clone, Debug)]
pub struct TickReport {
    pub tick: u64,
    pub cpu0_pct: Option<f64>,
    pub lcs: LcsPlacement,
    pub counts: Counts,
    pub completed_now: usize,
    pub changed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSnapshot {
    pub name: String,
    pub threads: usize,
    pub state: JobState,
    pub cores: CoreList,      // LAST CORES THE JOB RAN ON
    pub remaining: Duration,
    pub pauses: u32,
}

pub struct Scheduler {
    state: SchedState,
    config: SchedConfig,
    policy: Box<dyn Policy>,
    runtime: Box<dyn JobRuntime>,
    service: Box<dyn ServiceAffinity>,
    sampler: Box<dyn UtilizationSampler>,
    verbose: bool,
    tick_counter: u64,
    initialized: bool,
    pub log: EventLog,
}

impl Scheduler {
    pub fn new(
        specs: Vec<JobSpec>,
        config: SchedConfig,
        policy: Box<dyn Policy>,
        runtime: Box<dyn JobRuntime>,
        service: Box<dyn ServiceAffinity>,
        sampler: Box<dyn UtilizationSampler>,
        verbose: bool,
    ) -> Result<Self> {
        let state = SchedState::new(specs, &config)?;
        Ok(Self {
            state,
            config,
            policy,
            runtime,
            service,
            sampler,
            verbose,
            tick_counter: 0,
            initialized: false,
            log: EventLog::new(),
        })
    }

    pub fn state(&self) -> &SchedState {
        &self.state
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    // PULL + CREATE EVERY JOB, THEN LET THE POLICY PIN THE SERVICE.
    // ANY FAILURE HERE ABORTS THE RUN BEFORE A SINGLE JOB STARTS.
    pub fn initialize(&mut self) -> Result<()> {
        let specs: Vec<JobSpec> = self.state.registry.iter().map(|j| j.spec.clone()).collect();
        for spec in &specs {
            let image = self.runtime.image_ref(spec);
            self.runtime.pull_image(&image)
                .with_context(|| format!("PULL IMAGE {} FOR JOB {}", image, spec.name))?;
            let handle = self.runtime.create(spec)
                .with_context(|| format!("CREATE JOB {}", spec.name))?;
            log_info!("CREATED JOB {} ({} THREADS, ETA {}s)", spec.name, spec.threads, spec.baseline.as_secs());
            self.state.registry.job_mut(&spec.name)?.handle = Some(handle);
        }

        let mut ctx = TickCtx {
            state: &mut self.state,
            runtime: &mut *self.runtime,
            service: &mut *self.service,
            config: &self.config,
            now: Instant::now(),
            fresh_sample: false,
        };
        self.policy.init(&mut ctx)?;
        self.initialized = true;
        log_info!(
            "POLICY {} READY: {} JOBS, {} CORES, SERVICE ON CPUS {}",
            self.policy.name(),
            self.state.registry.len(),
            self.state.cores,
            self.state.service_cores()
        );
        Ok(())
    }

    // ONE SCHEDULING TICK
    pub fn tick(&mut self) -> Result<TickReport> {
        if !self.initialized {
            return Err(anyhow!("TICK BEFORE INITIALIZE"));
        }
        self.tick_counter += 1;

        // 1. SAMPLE (BLOCKS FOR ONE INTERVAL)
        let fresh = match self.sampler.sample(self.config.interval) {
            Ok(reading) => match self.state.window.push(&reading) {
                Ok(()) => true,
                Err(e) => {
                    log_warn!("UTILIZATION READING REJECTED: {:#}", e);
                    false
                }
            },
            Err(e) => {
                log_warn!("UTILIZATION SAMPLE FAILED: {:#}", e);
                false
            }
        };
        let cpu0 = if fresh { self.state.window.latest(SERVICE_HOME_CORE) } else { None };

        let lcs_before = self.state.lcs;
        let counts_before = self.state.registry.counts();
        let preempt_before = self.state.preemptions;

        // 2. POLICY, 3. COMPLETIONS
        let completed_now = {
            let mut ctx = TickCtx {
                state: &mut self.state,
                runtime: &mut *self.runtime,
                service: &mut *self.service,
                config: &self.config,
                now: Instant::now(),
                fresh_sample: fresh,
            };
            self.policy.tick(&mut ctx)?;
            engine::poll_completions(&mut ctx)?
        };

        // 4. TELEMETRY
        let counts = self.state.registry.counts();
        let changed = self.state.lcs != lcs_before
            || counts != counts_before
            || self.state.preemptions != preempt_before;

        self.log.snapshot(cpu0, self.state.lcs, counts, self.state.preemptions);

        if tuning::should_print_telemetry(self.tick_counter, changed, self.verbose) {
            let cpu_str = if fresh {
                (0..self.state.cores)
                    .map(|c| format!("{:>5.1}", self.state.window.latest(c).unwrap_or(0.0)))
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                "n/a".to_string()
            };
            println!(
                "tick: {:<6} cpu: [{}] service: {:<8} run: {:<3} pause: {:<3} wait: {:<3} done: {}/{} preempt: {}",
                self.tick_counter,
                cpu_str,
                self.state.lcs.label(),
                counts.running,
                counts.paused,
                counts.created,
                counts.completed,
                self.state.registry.len(),
                self.state.preemptions
            );
            if self.verbose {
                for job in self.state.registry.iter().filter(|j| j.state() == JobState::Running) {
                    println!("  {:<16} cpus: {:<8} eta: {:.1}s",
                        job.name(), job.cores().to_string(), job.remaining().as_secs_f64());
                }
            }
        }

        Ok(TickReport {
            tick: self.tick_counter,
            cpu0_pct: cpu0,
            lcs: self.state.lcs,
            counts,
            completed_now,
            changed,
        })
    }

    // LOOP UNTIL EVERY JOB COMPLETES OR SHUTDOWN IS RAISED.
    // SHUTDOWN IS CHECKED ONCE PER TICK, SO LATENCY IS AT MOST ONE INTERVAL.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<RunOutcome> {
        if !self.initialized {
            self.initialize()?;
        }
        let mut stale = 0u64;
        while !self.state.registry.all_completed() {
            if shutdown.load(Ordering::Relaxed) {
                log_warn!(
                    "SHUTDOWN REQUESTED WITH {}/{} JOBS COMPLETE",
                    self.state.registry.completed(),
                    self.state.registry.len()
                );
                return Ok(RunOutcome::Interrupted);
            }
            let report = self.tick()?;
            if report.cpu0_pct.is_none() {
                stale += 1;
            }
            if report.completed_now > 0 {
                log_debug!("TICK {}: {} JOBS COMPLETED", report.tick, report.completed_now);
            }
        }
        log_info!(
            "ALL {} JOBS COMPLETE AFTER {} TICKS ({} PREEMPTIONS, {} SERVICE PLACEMENT CHANGES, {} STALE SAMPLES)",
            self.state.registry.len(),
            self.tick_counter,
            self.state.preemptions,
            self.state.placement_changes,
            stale
        );
        Ok(RunOutcome::Completed)
    }

    // FINAL PLACEMENT PER JOB, CATALOG ORDER
    pub fn job_snapshot(&self) -> Vec<JobSnapshot> {
        self.state.registry.iter().map(|j| JobSnapshot {
            name: j.name().to_string(),
            threads: j.threads(),
            state: j.state(),
            cores: j.final_cores().clone(),
            remaining: j.remaining(),
            pauses: j.pauses(),
        }).collect()
    }

    pub fn write_artifacts(&mut self, dir: &Path, compress: bool) -> Result<()> {
        let placement = self.job_snapshot();
        report::write_artifacts(&mut *self.runtime, &self.state.registry, dir, compress)?;
        report::write_placement(&placement, dir)
    }

    // REMOVE EVERY CREATED CONTAINER. ERRORS ARE LOGGED; TEARDOWN NEVER FAILS.
    pub fn teardown(&mut self) {
        for job in self.state.registry.iter() {
            let handle = match &job.handle {
                Some(h) => h,
                None => continue,
            };
            match self.runtime.remove(handle) {
                Ok(()) => log_debug!("REMOVED JOB {}", job.name()),
                Err(e) => log_warn!("REMOVE JOB {}: {:#}", job.name(), e),
            }
        }
    }
}
