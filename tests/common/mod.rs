// SHARED FAKES FOR THE INTEGRATION TESTS
// A RECORDING JOB RUNTIME, A RECORDING SERVICE PINNER, AND A SCRIPTED
// UTILIZATION SAMPLER. NO DOCKER, NO /proc, NO SLEEPING.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Result};

use cosched::cores::CoreList;
use cosched::engine;
use cosched::job::{JobHandle, JobSpec, JobState};
use cosched::monitor::UtilizationSampler;
use cosched::policy::PolicyKind;
use cosched::runtime::{JobRuntime, PauseOutcome, RunStatus, ServiceAffinity};
use cosched::scheduler::{SchedState, Scheduler, TickReport};
use cosched::tuning::SchedConfig;

#[derive(Default)]
pub struct World {
    pub calls: Vec<String>,                 // "start dedup", "pause ferret", ...
    pub cpuset: HashMap<String, CoreList>,  // LAST AFFINITY PER JOB
    pub service: Vec<CoreList>,             // EVERY SERVICE PINNING, IN ORDER
    pub exited: HashSet<String>,
    pub exit_after: HashMap<String, u32>,   // EXIT ONCE POLLED THIS MANY TIMES
    pub polls: HashMap<String, u32>,
    pub fail: HashSet<String>,              // "op:job" PAIRS THAT ERROR
}

pub type Shared = Rc<RefCell<World>>;

impl World {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }
}

pub struct FakeRuntime(pub Shared);

impl FakeRuntime {
    fn record(&self, op: &str, name: &str) -> Result<()> {
        let mut w = self.0.borrow_mut();
        if w.fail.contains(&format!("{}:{}", op, name)) {
            bail!("injected {} failure for {}", op, name);
        }
        w.calls.push(format!("{} {}", op, name));
        Ok(())
    }
}

impl JobRuntime for FakeRuntime {
    fn image_ref(&self, spec: &JobSpec) -> String {
        format!("test/{}", spec.name)
    }

    fn pull_image(&mut self, image: &str) -> Result<()> {
        self.record("pull", image)
    }

    fn create(&mut self, spec: &JobSpec) -> Result<JobHandle> {
        self.record("create", &spec.name)?;
        Ok(JobHandle(spec.name.clone()))
    }

    fn start(&mut self, handle: &JobHandle) -> Result<()> {
        self.record("start", &handle.0)
    }

    fn pause(&mut self, handle: &JobHandle) -> Result<PauseOutcome> {
        self.record("pause", &handle.0)?;
        if self.0.borrow().exited.contains(&handle.0) {
            return Ok(PauseOutcome::Gone);
        }
        Ok(PauseOutcome::Paused)
    }

    fn unpause(&mut self, handle: &JobHandle) -> Result<()> {
        self.record("unpause", &handle.0)
    }

    fn set_core_affinity(&mut self, handle: &JobHandle, cores: &CoreList) -> Result<()> {
        self.record("affinity", &handle.0)?;
        self.0.borrow_mut().cpuset.insert(handle.0.clone(), cores.clone());
        Ok(())
    }

    fn inspect_status(&mut self, handle: &JobHandle) -> Result<RunStatus> {
        let mut w = self.0.borrow_mut();
        let polls = {
            let p = w.polls.entry(handle.0.clone()).or_insert(0);
            *p += 1;
            *p
        };
        let limit = w.exit_after.get(&handle.0).copied();
        if limit.map(|n| polls >= n).unwrap_or(false) {
            w.exited.insert(handle.0.clone());
        }
        if w.exited.contains(&handle.0) {
            Ok(RunStatus::Exited)
        } else {
            Ok(RunStatus::Running)
        }
    }

    fn remove(&mut self, handle: &JobHandle) -> Result<()> {
        self.record("remove", &handle.0)
    }

    fn fetch_logs(&mut self, handle: &JobHandle) -> Result<Vec<u8>> {
        self.record("logs", &handle.0)?;
        Ok(format!("{} done\n", handle.0).into_bytes())
    }

    fn fetch_inspect_metadata(&mut self, handle: &JobHandle) -> Result<Vec<u8>> {
        self.record("inspect", &handle.0)?;
        Ok(format!("[{{\"Name\":\"/{}\"}}]", handle.0).into_bytes())
    }
}

pub struct FakeService(pub Shared);

impl ServiceAffinity for FakeService {
    fn set_affinity(&mut self, cores: &CoreList) -> Result<()> {
        self.0.borrow_mut().service.push(cores.clone());
        Ok(())
    }
}

// CORE-0 TRACE; OTHER CORES READ 0%. None IS A FAILED SAMPLE.
// PAST THE END OF THE SCRIPT THE TRACE EITHER CYCLES OR HOLDS ITS LAST VALUE.
pub struct ScriptedSampler {
    cores: usize,
    trace: Vec<Option<f64>>,
    pos: usize,
    cycle: bool,
}

impl ScriptedSampler {
    pub fn new(cores: usize, trace: Vec<Option<f64>>, cycle: bool) -> Self {
        Self { cores, trace, pos: 0, cycle }
    }
}

impl UtilizationSampler for ScriptedSampler {
    fn sample(&mut self, _interval: Duration) -> Result<Vec<f64>> {
        if self.trace.is_empty() {
            return Ok(vec![0.0; self.cores]);
        }
        let idx = if self.cycle {
            self.pos % self.trace.len()
        } else {
            self.pos.min(self.trace.len() - 1)
        };
        self.pos += 1;
        match self.trace[idx] {
            Some(pct) => {
                let mut v = vec![0.0; self.cores];
                v[0] = pct;
                Ok(v)
            }
            None => bail!("scripted sample failure"),
        }
    }
}

pub fn config(heavy: &[&str], secondary: Option<&str>) -> SchedConfig {
    SchedConfig {
        cores: 4,
        interval: Duration::ZERO,
        window: 2,
        heavy: heavy.iter().map(|s| s.to_string()).collect(),
        secondary: secondary.map(|s| s.to_string()),
        ..SchedConfig::default()
    }
}

pub fn single(name: &str, secs: u64) -> JobSpec {
    JobSpec::new(name, 1, Duration::from_secs(secs))
}

pub fn wide(name: &str, threads: usize, secs: u64) -> JobSpec {
    JobSpec::new(name, threads, Duration::from_secs(secs))
}

// SchedState WITH EVERY JOB ALREADY CREATED, FOR DRIVING ENGINE AND
// CONTROLLER CALLS WITHOUT A Scheduler
pub fn state_with(specs: Vec<JobSpec>, cfg: &SchedConfig) -> SchedState {
    let mut state = SchedState::new(specs, cfg).unwrap();
    let names: Vec<String> = state.registry.iter().map(|j| j.name().to_string()).collect();
    for name in names {
        state.registry.job_mut(&name).unwrap().handle = Some(JobHandle(name.clone()));
    }
    state
}

pub fn try_scheduler(specs: Vec<JobSpec>, config: SchedConfig) -> Result<Scheduler> {
    let world: Shared = Rc::new(RefCell::new(World::default()));
    let cores = config.cores;
    Scheduler::new(
        specs,
        config,
        PolicyKind::Dynamic.build(),
        Box::new(FakeRuntime(world.clone())),
        Box::new(FakeService(world)),
        Box::new(ScriptedSampler::new(cores, Vec::new(), false)),
        false,
    )
}

pub fn trace(pcts: &[f64]) -> Vec<Option<f64>> {
    pcts.iter().map(|&p| Some(p)).collect()
}

pub struct Harness {
    pub sched: Scheduler,
    pub world: Shared,
}

impl Harness {
    pub fn new(
        specs: Vec<JobSpec>,
        config: SchedConfig,
        kind: PolicyKind,
        trace: Vec<Option<f64>>,
        cycle: bool,
    ) -> Self {
        let world: Shared = Rc::new(RefCell::new(World::default()));
        let cores = config.cores;
        let sched = Scheduler::new(
            specs,
            config,
            kind.build(),
            Box::new(FakeRuntime(world.clone())),
            Box::new(FakeService(world.clone())),
            Box::new(ScriptedSampler::new(cores, trace, cycle)),
            false,
        )
        .unwrap();
        Self { sched, world }
    }

    pub fn started(mut self) -> Self {
        self.sched.initialize().unwrap();
        self
    }

    pub fn tick(&mut self) -> TickReport {
        self.sched.tick().unwrap()
    }

    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn state_of(&self, name: &str) -> JobState {
        self.sched.state().registry.job(name).unwrap().state()
    }

    pub fn cores_of(&self, name: &str) -> Vec<usize> {
        self.sched.state().registry.job(name).unwrap().cores().as_slice().to_vec()
    }

    pub fn finish(&self, name: &str) {
        self.world.borrow_mut().exited.insert(name.to_string());
    }

    pub fn last_service(&self) -> CoreList {
        self.world.borrow().service.last().cloned().unwrap_or_default()
    }
}

// NO CORE HOLDS TWO OCCUPANTS UNLESS EVERY ONE OF THEM IS A SINGLE-CORE JOB
pub fn assert_occupancy_ok(state: &SchedState) {
    for (core, occ) in engine::occupancy(state).iter().enumerate() {
        if occ.len() < 2 {
            continue;
        }
        for o in occ {
            match o {
                engine::Occupant::Service => {
                    panic!("CORE {} SHARED BETWEEN THE SERVICE AND {:?}", core, occ)
                }
                engine::Occupant::Job(name) => {
                    let threads = state.registry.job(name).unwrap().threads();
                    assert_eq!(threads, 1, "MULTI-CORE JOB {} COLOCATED ON CORE {}: {:?}", name, core, occ);
                }
            }
        }
    }
}
