use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;

use cosched::log_warn;
use cosched::monitor::{ProcStatSampler, UtilizationSampler};

static RUNNING: AtomicBool = AtomicBool::new(true);

// ONE LINE PER SAMPLE: BUSY PERCENT PER CORE, CORE 0 FIRST
pub fn run_probe(interval: Duration) -> Result<()> {
    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::Relaxed);
    })?;

    let mut sampler = ProcStatSampler::new();
    while RUNNING.load(Ordering::Relaxed) {
        match sampler.sample(interval) {
            Ok(pct) => {
                let cols: Vec<String> = pct.iter().map(|p| format!("{:>5.1}", p)).collect();
                println!("{}", cols.join(" "));
            }
            Err(e) => {
                log_warn!("SAMPLE FAILED: {:#}", e);
                std::thread::sleep(interval);
            }
        }
    }
    Ok(())
}
