// COSCHED JOB LIFECYCLE
// CREATED -> RUNNING -> (PAUSED -> RUNNING)* -> COMPLETED
//
// REMAINING-TIME ESTIMATE IS CHARGED BY WALL CLOCK ON EVERY PAUSE.
// COMPLETION IS ONLY EVER OBSERVED, NEVER COMMANDED.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use crate::cores::CoreList;

// STATIC DESCRIPTOR FROM THE CATALOG
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub threads: usize,
    pub baseline: Duration,   // PRIOR-MEASURED RUNTIME ON `threads` CORES
    pub package: String,      // WORKLOAD IDENTIFIER HANDED TO THE COMMAND TEMPLATE
}

impl JobSpec {
    pub fn new(name: &str, threads: usize, baseline: Duration) -> Self {
        Self {
            name: name.to_string(),
            threads,
            baseline,
            package: name.to_string(),
        }
    }

    pub fn with_package(mut self, package: &str) -> Self {
        self.package = package.to_string();
        self
    }

    pub fn is_single_core(&self) -> bool {
        self.threads == 1
    }
}

// OPAQUE RUNTIME HANDLE (CONTAINER NAME FOR DOCKER)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JobState {
    Created,
    Running,
    Paused,
    Completed,
}

impl JobState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn is_admittable(self) -> bool {
        matches!(self, Self::Created | Self::Paused)
    }
}

// WHAT A PAUSE DID TO THE ESTIMATE
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PauseCharge {
    Charged(Duration),   // ELAPSED TIME SUBTRACTED
    Underflow,           // RAN LONGER THAN ESTIMATED, CLAMPED TO THE FLOOR
}

#[derive(Clone, Debug)]
pub struct Job {
    pub spec: JobSpec,
    pub handle: Option<JobHandle>,
    state: JobState,
    cores: CoreList,
    final_cores: CoreList,
    remaining: Duration,
    last_resume: Option<Instant>,
    pauses: u32,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        let remaining = spec.baseline;
        Self {
            spec,
            handle: None,
            state: JobState::Created,
            cores: CoreList::new(),
            final_cores: CoreList::new(),
            remaining,
            last_resume: None,
            pauses: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn threads(&self) -> usize {
        self.spec.threads
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    // CORES GRANTED WHILE RUNNING OR PAUSED. EMPTY OTHERWISE.
    pub fn cores(&self) -> &CoreList {
        &self.cores
    }

    // LAST CORES THE JOB RAN ON, KEPT AFTER COMPLETION FOR REPORTING
    pub fn final_cores(&self) -> &CoreList {
        &self.final_cores
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn last_resume(&self) -> Option<Instant> {
        self.last_resume
    }

    pub fn pauses(&self) -> u32 {
        self.pauses
    }

    pub fn mark_started(&mut self, cores: CoreList, now: Instant) -> Result<()> {
        if self.state != JobState::Created {
            bail!("START JOB {}: STATE IS {}, EXPECTED CREATED", self.spec.name, self.state.label());
        }
        self.enter_running(cores, now)
    }

    pub fn mark_unpaused(&mut self, cores: CoreList, now: Instant) -> Result<()> {
        if self.state != JobState::Paused {
            bail!("UNPAUSE JOB {}: STATE IS {}, EXPECTED PAUSED", self.spec.name, self.state.label());
        }
        self.enter_running(cores, now)
    }

    fn enter_running(&mut self, cores: CoreList, now: Instant) -> Result<()> {
        if cores.is_empty() {
            bail!("JOB {}: CANNOT RUN ON AN EMPTY CORE LIST", self.spec.name);
        }
        self.final_cores = cores.clone();
        self.cores = cores;
        self.last_resume = Some(now);
        self.state = JobState::Running;
        Ok(())
    }

    // RE-PIN A RUNNING JOB (PROMOTION OR RECLAIM). NO ESTIMATE CHANGE.
    pub fn set_cores(&mut self, cores: CoreList) -> Result<()> {
        if self.state != JobState::Running {
            bail!("REPIN JOB {}: STATE IS {}, EXPECTED RUNNING", self.spec.name, self.state.label());
        }
        if cores.is_empty() {
            bail!("JOB {}: CANNOT RUN ON AN EMPTY CORE LIST", self.spec.name);
        }
        self.final_cores = cores.clone();
        self.cores = cores;
        Ok(())
    }

    // CHARGE THE TIME SINCE LAST RESUME AGAINST THE ESTIMATE.
    // ELAPSED > REMAINING MEANS THE ESTIMATE WAS TOO LOW: CLAMP TO `floor`.
    pub fn mark_paused(&mut self, now: Instant, floor: Duration) -> Result<PauseCharge> {
        if self.state != JobState::Running {
            bail!("PAUSE JOB {}: STATE IS {}, EXPECTED RUNNING", self.spec.name, self.state.label());
        }
        let since = self.last_resume.unwrap_or(now);
        let elapsed = now.saturating_duration_since(since);
        let charge = if elapsed > self.remaining {
            self.remaining = floor;
            PauseCharge::Underflow
        } else {
            self.remaining -= elapsed;
            PauseCharge::Charged(elapsed)
        };
        self.state = JobState::Paused;
        self.pauses += 1;
        Ok(charge)
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        if self.state != JobState::Running {
            bail!("COMPLETE JOB {}: STATE IS {}, EXPECTED RUNNING", self.spec.name, self.state.label());
        }
        self.cores = CoreList::new();
        self.state = JobState::Completed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(baseline_s: u64) -> Job {
        Job::new(JobSpec::new("dedup", 1, Duration::from_secs(baseline_s)))
    }

    const FLOOR: Duration = Duration::from_secs(15);

    #[test]
    fn start_sets_resume_time_and_cores() {
        let t0 = Instant::now();
        let mut j = job(60);
        j.mark_started(CoreList::from_cores([3]), t0).unwrap();
        assert_eq!(j.state(), JobState::Running);
        assert_eq!(j.last_resume(), Some(t0));
        assert_eq!(j.cores().as_slice(), &[3]);
    }

    #[test]
    fn pause_charges_exact_elapsed() {
        let t0 = Instant::now();
        let mut j = job(60);
        j.mark_started(CoreList::from_cores([3]), t0).unwrap();
        let charge = j.mark_paused(t0 + Duration::from_millis(12_345), FLOOR).unwrap();
        assert_eq!(charge, PauseCharge::Charged(Duration::from_millis(12_345)));
        assert_eq!(j.remaining(), Duration::from_secs(60) - Duration::from_millis(12_345));
        assert_eq!(j.state(), JobState::Paused);
        // PAUSED JOBS KEEP THEIR LAST GRANT
        assert_eq!(j.cores().as_slice(), &[3]);
    }

    #[test]
    fn pause_after_overrun_clamps_to_floor() {
        let t0 = Instant::now();
        let mut j = job(10);
        j.mark_started(CoreList::from_cores([2]), t0).unwrap();
        let charge = j.mark_paused(t0 + Duration::from_secs(11), FLOOR).unwrap();
        assert_eq!(charge, PauseCharge::Underflow);
        assert_eq!(j.remaining(), FLOOR);
    }

    #[test]
    fn pause_at_exact_estimate_reaches_zero() {
        let t0 = Instant::now();
        let mut j = job(10);
        j.mark_started(CoreList::from_cores([2]), t0).unwrap();
        j.mark_paused(t0 + Duration::from_secs(10), FLOOR).unwrap();
        assert_eq!(j.remaining(), Duration::ZERO);
    }

    #[test]
    fn estimates_accumulate_across_cycles() {
        let t0 = Instant::now();
        let mut j = job(100);
        j.mark_started(CoreList::from_cores([3]), t0).unwrap();
        j.mark_paused(t0 + Duration::from_secs(30), FLOOR).unwrap();
        // TIME SPENT PAUSED IS NOT CHARGED
        j.mark_unpaused(CoreList::from_cores([2]), t0 + Duration::from_secs(50)).unwrap();
        j.mark_paused(t0 + Duration::from_secs(70), FLOOR).unwrap();
        assert_eq!(j.remaining(), Duration::from_secs(50));
        assert_eq!(j.pauses(), 2);
    }

    #[test]
    fn completed_is_terminal() {
        let t0 = Instant::now();
        let mut j = job(10);
        j.mark_started(CoreList::from_cores([3]), t0).unwrap();
        j.mark_completed().unwrap();
        assert!(j.cores().is_empty());
        assert_eq!(j.final_cores().as_slice(), &[3]);
        assert!(j.mark_completed().is_err());
        assert!(j.mark_unpaused(CoreList::from_cores([3]), t0).is_err());
        assert!(j.mark_paused(t0, FLOOR).is_err());
        assert_eq!(j.state(), JobState::Completed);
    }

    #[test]
    fn invalid_transitions_rejected() {
        let t0 = Instant::now();
        let mut j = job(10);
        assert!(j.mark_paused(t0, FLOOR).is_err());
        assert!(j.mark_unpaused(CoreList::from_cores([3]), t0).is_err());
        assert!(j.mark_completed().is_err());
        assert!(j.mark_started(CoreList::new(), t0).is_err());
        assert_eq!(j.state(), JobState::Created);
    }
}
