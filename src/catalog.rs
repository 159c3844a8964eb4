// COSCHED JOB CATALOG
// BUILT-IN WORKLOAD SETS PER POLICY AND THE TEXT CATALOG FORMAT:
//
//   # comment
//   <name> <threads> <baseline-secs> [package]
//
// BASELINES ARE MEASURED RUNTIMES ON `threads` CORES. THEY SEED THE SRPT
// ESTIMATE AND ARE CONFIGURATION, NOT ENGINE CONSTANTS.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::job::JobSpec;
use crate::policy::PolicyKind;

pub const DEFAULT_HEAVY: [&str; 2] = ["freqmine", "ferret"];
pub const DEFAULT_SECONDARY: &str = "splash2x-fft";

const FFT_PACKAGE: &str = "splash2x.fft";

fn spec(name: &str, threads: usize, secs: u64) -> JobSpec {
    let s = JobSpec::new(name, threads, Duration::from_secs(secs));
    if name == DEFAULT_SECONDARY {
        s.with_package(FFT_PACKAGE)
    } else {
        s
    }
}

pub fn default_catalog(kind: PolicyKind) -> Vec<JobSpec> {
    match kind {
        PolicyKind::Dynamic => vec![
            spec("ferret", 3, 320),
            spec("freqmine", 3, 200),
            spec("blackscholes", 2, 90),
            spec("splash2x-fft", 2, 110),
            spec("dedup", 1, 55),
            spec("canneal", 1, 165),
        ],
        // EVERY PRIMARY RUNS WIDE; THE SECONDARY STAYS AT TWO
        PolicyKind::Large => vec![
            spec("ferret", 3, 320),
            spec("freqmine", 3, 200),
            spec("blackscholes", 3, 90),
            spec("dedup", 3, 35),
            spec("canneal", 3, 240),
            spec("splash2x-fft", 2, 110),
        ],
        // FIFO ORDER MATTERS HERE
        PolicyKind::Fixed => vec![
            spec("blackscholes", 2, 90),
            spec("ferret", 2, 320),
            spec("freqmine", 2, 200),
            spec("dedup", 1, 55),
            spec("canneal", 1, 165),
            spec("splash2x-fft", 2, 110),
        ],
    }
}

pub fn default_heavy() -> Vec<String> {
    DEFAULT_HEAVY.iter().map(|s| s.to_string()).collect()
}

fn line_pattern() -> Result<Regex> {
    Regex::new(r"^(?P<name>[A-Za-z0-9][A-Za-z0-9._-]*)\s+(?P<threads>\d+)\s+(?P<secs>\d+)(?:\s+(?P<package>\S+))?$")
        .context("COMPILE CATALOG LINE PATTERN")
}

pub fn parse_catalog(text: &str) -> Result<Vec<JobSpec>> {
    let re = line_pattern()?;
    let mut specs = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = match raw.find('#') {
            Some(i) => &raw[..i],
            None => raw,
        }.trim();
        if line.is_empty() {
            continue;
        }
        let caps = match re.captures(line) {
            Some(c) => c,
            None => bail!("CATALOG LINE {}: EXPECTED '<name> <threads> <baseline-secs> [package]', GOT '{}'",
                          lineno + 1, line),
        };
        let threads: usize = caps["threads"].parse()
            .with_context(|| format!("CATALOG LINE {}: THREADS", lineno + 1))?;
        let secs: u64 = caps["secs"].parse()
            .with_context(|| format!("CATALOG LINE {}: BASELINE", lineno + 1))?;
        if threads == 0 {
            bail!("CATALOG LINE {}: JOB {} REQUESTS ZERO THREADS", lineno + 1, &caps["name"]);
        }
        let mut s = JobSpec::new(&caps["name"], threads, Duration::from_secs(secs));
        if let Some(pkg) = caps.name("package") {
            s = s.with_package(pkg.as_str());
        }
        specs.push(s);
    }
    Ok(specs)
}

pub fn load_catalog(path: &Path) -> Result<Vec<JobSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("READ CATALOG {}", path.display()))?;
    parse_catalog(&text).with_context(|| format!("PARSE CATALOG {}", path.display()))
}
