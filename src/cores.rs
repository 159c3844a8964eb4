// COSCHED CORE LISTS
// CORE INDICES, ORDERED CORE SETS, AND LINUX CPU-RANGE PARSING

use std::fmt;

use anyhow::{bail, Context, Result};

pub type Core = usize;

// THE LATENCY-CRITICAL SERVICE ALWAYS OWNS CORE 0.
// CORE 1 IS THE ELASTIC CORE: SHARED WITH THE SERVICE OR GIVEN TO JOBS.
pub const SERVICE_HOME_CORE: Core = 0;
pub const ELASTIC_CORE: Core = 1;

// ORDERED, DEDUPLICATED SET OF CORES. ALWAYS ASCENDING SO TWO LISTS
// COVERING THE SAME CORES COMPARE EQUAL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CoreList(Vec<Core>);

impl CoreList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_cores<I: IntoIterator<Item = Core>>(cores: I) -> Self {
        let mut v: Vec<Core> = cores.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        Self(v)
    }

    pub fn range(lo: Core, hi: Core) -> Self {
        Self((lo..hi).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, core: Core) -> bool {
        self.0.binary_search(&core).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Core> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Core] {
        &self.0
    }

    pub fn union(&self, other: &CoreList) -> CoreList {
        CoreList::from_cores(self.iter().chain(other.iter()))
    }

    pub fn without(&self, other: &CoreList) -> CoreList {
        CoreList(self.iter().filter(|c| !other.contains(*c)).collect())
    }
}

// "2,3" -- THE FORMAT DOCKER --cpuset-cpus AND taskset -c ACCEPT
impl fmt::Display for CoreList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for core in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", core)?;
            first = false;
        }
        Ok(())
    }
}

// PARSE A KERNEL CPU LIST ("0-3,6,8-9") INTO A CoreList
pub fn parse_cpu_list(raw: &str) -> Result<CoreList> {
    let mut cores = Vec::new();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(CoreList::new());
    }
    for range in raw.split(',') {
        let parts: Vec<&str> = range.trim().split('-').collect();
        match parts.len() {
            1 => {
                let c: Core = parts[0]
                    .parse()
                    .with_context(|| format!("BAD CPU INDEX '{}'", parts[0]))?;
                cores.push(c);
            }
            2 => {
                let lo: Core = parts[0]
                    .parse()
                    .with_context(|| format!("BAD CPU RANGE START '{}'", parts[0]))?;
                let hi: Core = parts[1]
                    .parse()
                    .with_context(|| format!("BAD CPU RANGE END '{}'", parts[1]))?;
                if hi < lo {
                    bail!("INVERTED CPU RANGE '{}'", range);
                }
                cores.extend(lo..=hi);
            }
            _ => bail!("MALFORMED CPU RANGE '{}'", range),
        }
    }
    Ok(CoreList::from_cores(cores))
}

pub fn online_cores() -> Result<CoreList> {
    let raw = std::fs::read_to_string("/sys/devices/system/cpu/online")
        .context("READ /sys/devices/system/cpu/online")?;
    parse_cpu_list(&raw)
}
