// COSCHED JOB REGISTRY
// CATALOG-ORDERED JOB TABLE WITH NAME LOOKUP AND LIFECYCLE COUNTS

use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

use crate::job::{Job, JobSpec, JobState};

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Counts {
    pub created: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
}

pub struct JobRegistry {
    jobs: Vec<Job>,
    index: HashMap<String, usize>,
}

impl JobRegistry {
    pub fn new(specs: Vec<JobSpec>) -> Result<Self> {
        let mut jobs = Vec::with_capacity(specs.len());
        let mut index = HashMap::with_capacity(specs.len());
        for spec in specs {
            if spec.threads == 0 {
                bail!("JOB {} REQUESTS ZERO THREADS", spec.name);
            }
            if index.insert(spec.name.clone(), jobs.len()).is_some() {
                bail!("DUPLICATE JOB NAME {}", spec.name);
            }
            jobs.push(Job::new(spec));
        }
        Ok(Self { jobs, index })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.index.get(name).map(|&i| &self.jobs[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Job> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.jobs[i]),
            None => None,
        }
    }

    pub fn job(&self, name: &str) -> Result<&Job> {
        self.get(name).ok_or_else(|| anyhow!("UNKNOWN JOB {}", name))
    }

    pub fn job_mut(&mut self, name: &str) -> Result<&mut Job> {
        self.get_mut(name).ok_or_else(|| anyhow!("UNKNOWN JOB {}", name))
    }

    // CATALOG ORDER
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn names_in(&self, state: JobState) -> Vec<String> {
        self.jobs.iter()
            .filter(|j| j.state() == state)
            .map(|j| j.name().to_string())
            .collect()
    }

    pub fn running(&self) -> Vec<String> {
        self.names_in(JobState::Running)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.get(name).map(|j| j.state() == JobState::Running).unwrap_or(false)
    }

    pub fn is_admittable(&self, name: &str) -> bool {
        self.get(name).map(|j| j.state().is_admittable()).unwrap_or(false)
    }

    // CREATED OR PAUSED, SHORTEST REMAINING ESTIMATE FIRST.
    // TIES BREAK ON CATALOG ORDER SO TICKS ARE DETERMINISTIC.
    pub fn admittable_srpt(&self) -> Vec<String> {
        let mut v: Vec<(usize, &Job)> = self.jobs.iter()
            .enumerate()
            .filter(|(_, j)| j.state().is_admittable())
            .collect();
        v.sort_by(|(ia, a), (ib, b)| a.remaining().cmp(&b.remaining()).then(ia.cmp(ib)));
        v.into_iter().map(|(_, j)| j.name().to_string()).collect()
    }

    pub fn has_admittable(&self) -> bool {
        self.jobs.iter().any(|j| j.state().is_admittable())
    }

    pub fn counts(&self) -> Counts {
        let mut c = Counts::default();
        for j in &self.jobs {
            match j.state() {
                JobState::Created => c.created += 1,
                JobState::Running => c.running += 1,
                JobState::Paused => c.paused += 1,
                JobState::Completed => c.completed += 1,
            }
        }
        c
    }

    pub fn completed(&self) -> usize {
        self.jobs.iter().filter(|j| j.state() == JobState::Completed).count()
    }

    pub fn all_completed(&self) -> bool {
        self.completed() == self.jobs.len()
    }
}
