// COSCHED RESOURCE MONITOR
// PER-CORE UTILIZATION SAMPLING AND THE SLIDING DEBOUNCE WINDOW
//
// THE SAMPLER BLOCKS FOR ITS INTERVAL. THAT BLOCK IS THE ONLY SUSPENSION
// POINT IN THE SCHEDULING LOOP: ONE FRESH SAMPLE PER TICK.

use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::cores::Core;

pub trait UtilizationSampler {
    // BLOCK FOR `interval`, RETURN BUSY PERCENT PER CORE (INDEX = CORE)
    fn sample(&mut self, interval: Duration) -> Result<Vec<f64>>;
}

// --- /proc/stat SAMPLER ---

struct CpuTimes {
    idle: u64,
    total: u64,
}

fn parse_proc_stat(raw: &str) -> Vec<CpuTimes> {
    let mut cpus = Vec::new();
    for line in raw.lines() {
        if !line.starts_with("cpu") || line.starts_with("cpu ") {
            continue;
        }
        let fields: Vec<u64> = line.split_whitespace()
            .skip(1)
            .filter_map(|s| s.parse().ok())
            .collect();
        if fields.len() < 4 {
            continue;
        }
        // idle + iowait
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        let total: u64 = fields.iter().sum();
        cpus.push(CpuTimes { idle, total });
    }
    cpus
}

fn busy_pct(a: &[CpuTimes], b: &[CpuTimes]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(a, b)| {
        let total_delta = b.total.saturating_sub(a.total);
        if total_delta == 0 {
            return 0.0;
        }
        let idle_delta = b.idle.saturating_sub(a.idle);
        100.0 - idle_delta as f64 / total_delta as f64 * 100.0
    }).collect()
}

pub struct ProcStatSampler {
    path: String,
}

impl ProcStatSampler {
    pub fn new() -> Self {
        Self { path: "/proc/stat".to_string() }
    }

    fn read(&self) -> Result<Vec<CpuTimes>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("READ {}", self.path))?;
        let cpus = parse_proc_stat(&raw);
        if cpus.is_empty() {
            bail!("NO PER-CPU LINES IN {}", self.path);
        }
        Ok(cpus)
    }
}

impl Default for ProcStatSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UtilizationSampler for ProcStatSampler {
    fn sample(&mut self, interval: Duration) -> Result<Vec<f64>> {
        let t1 = self.read()?;
        std::thread::sleep(interval);
        let t2 = self.read()?;
        if t1.len() != t2.len() {
            bail!("CPU COUNT CHANGED DURING SAMPLE ({} -> {})", t1.len(), t2.len());
        }
        Ok(busy_pct(&t1, &t2))
    }
}

// --- SLIDING WINDOW ---

// FIXED-LENGTH RING PER CORE. PRE-ALLOCATED; PUSH OVERWRITES THE OLDEST.
pub struct UtilWindow {
    samples: Vec<Vec<f64>>,   // [core][slot]
    width: usize,
    head: usize,
    len: usize,
}

impl UtilWindow {
    pub fn new(cores: usize, width: usize) -> Self {
        Self {
            samples: vec![vec![0.0; width]; cores],
            width,
            head: 0,
            len: 0,
        }
    }

    pub fn cores(&self) -> usize {
        self.samples.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.width
    }

    // SHIFT IN ONE READING PER CORE. EXTRA CORES IN THE READING ARE IGNORED.
    pub fn push(&mut self, reading: &[f64]) -> Result<()> {
        if reading.len() < self.samples.len() {
            bail!(
                "SHORT UTILIZATION READING: {} CORES, EXPECTED {}",
                reading.len(),
                self.samples.len()
            );
        }
        for (core, ring) in self.samples.iter_mut().enumerate() {
            ring[self.head] = reading[core];
        }
        self.head = (self.head + 1) % self.width;
        if self.len < self.width {
            self.len += 1;
        }
        Ok(())
    }

    // OLDEST FIRST
    pub fn window(&self, core: Core) -> Vec<f64> {
        let ring = match self.samples.get(core) {
            Some(r) => r,
            None => return Vec::new(),
        };
        let start = if self.len < self.width { 0 } else { self.head };
        (0..self.len).map(|i| ring[(start + i) % self.width]).collect()
    }

    pub fn latest(&self, core: Core) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.width - 1) % self.width;
        self.samples.get(core).map(|ring| ring[idx])
    }

    // BOTH TESTS REQUIRE A FULL WINDOW: A PARTIAL WINDOW IS NOT A DEBOUNCE
    // THRESHOLDS ARE INCLUSIVE. AN UNKNOWN CORE SATISFIES NOTHING.
    pub fn all_above(&self, core: Core, thresh: f64) -> bool {
        self.all_full(core, |s| s >= thresh)
    }

    pub fn all_below(&self, core: Core, thresh: f64) -> bool {
        self.all_full(core, |s| s <= thresh)
    }

    fn all_full(&self, core: Core, pred: impl Fn(f64) -> bool) -> bool {
        self.is_full() && core < self.samples.len() && self.window(core).into_iter().all(pred)
    }
}
