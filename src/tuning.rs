// COSCHED TUNING TYPES
// PURE-RUST MODULE: NO DOCKER, NO /proc
// SHARED BETWEEN THE BINARY (main.rs, cli/) AND THE LIB CRATE (tests)

use std::time::Duration;

use crate::cores::SERVICE_HOME_CORE;
use crate::monitor::UtilWindow;

// SERVICE PLACEMENT THRESHOLDS (SCHMITT TRIGGER)
// CORE-0 UTILIZATION, PERCENT. THE DEAD ZONE BETWEEN LOW AND HIGH
// KEEPS THE SERVICE FROM FLAPPING BETWEEN ONE AND TWO CORES.

pub const DEFAULT_LOW_PCT: f64  = 40.0;   // SHRINK: EVERY SAMPLE <= 40%
pub const DEFAULT_HIGH_PCT: f64 = 70.0;   // GROW: EVERY SAMPLE >= 70%

// SAMPLING

pub const DEFAULT_WINDOW: usize        = 2;     // SAMPLES PER CORE IN THE DEBOUNCE WINDOW
pub const DEFAULT_INTERVAL_MS: u64     = 500;   // BLOCKING SAMPLE INTERVAL
pub const DEFAULT_CORES: usize         = 4;

// REMAINING-TIME FLOOR WHEN A JOB OUTLIVES ITS ESTIMATE
pub const DEFAULT_ETA_FLOOR_SECS: u64  = 15;

// LARGE-JOB MODE: A PRIMARY NEEDS AT LEAST THIS MANY FREE CORES
pub const LARGE_MIN_CORES: usize = 2;

// SERVICE PLACEMENT

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LcsPlacement {
    Isolated = 0,   // SERVICE ON CORE 0 ONLY
    Shared = 1,     // SERVICE ON CORES 0-1
}

impl LcsPlacement {
    pub fn label(self) -> &'static str {
        match self {
            Self::Isolated => "ISOLATED",
            Self::Shared => "SHARED",
        }
    }

    // NUMBER OF CORES THE SERVICE HOLDS, COUNTING FROM CORE 0
    pub fn reserved(self) -> usize {
        match self {
            Self::Isolated => 1,
            Self::Shared => 2,
        }
    }
}

// SCHEDULER CONFIGURATION
// HEAVY LIST AND SECONDARY ARE DEPLOYMENT TUNING, NOT ENGINE CONSTANTS.

#[derive(Clone, Debug)]
pub struct SchedConfig {
    pub cores: usize,
    pub interval: Duration,
    pub window: usize,
    pub low_pct: f64,
    pub high_pct: f64,
    pub eta_floor: Duration,
    pub heavy: Vec<String>,          // PREFERENCE ORDER FOR ELASTIC-CORE PROMOTION
    pub secondary: Option<String>,   // LARGE-JOB MODE FILLER JOB
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            cores: DEFAULT_CORES,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            window: DEFAULT_WINDOW,
            low_pct: DEFAULT_LOW_PCT,
            high_pct: DEFAULT_HIGH_PCT,
            eta_floor: Duration::from_secs(DEFAULT_ETA_FLOOR_SECS),
            heavy: Vec::new(),
            secondary: None,
        }
    }
}

impl SchedConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cores < 3 {
            anyhow::bail!("NEED AT LEAST 3 CORES (SERVICE HOME, ELASTIC, ONE BATCH), GOT {}", self.cores);
        }
        if self.window == 0 {
            anyhow::bail!("WINDOW MUST HOLD AT LEAST ONE SAMPLE");
        }
        if self.low_pct >= self.high_pct {
            anyhow::bail!(
                "LOW THRESHOLD ({}) MUST BE BELOW HIGH THRESHOLD ({})",
                self.low_pct, self.high_pct
            );
        }
        Ok(())
    }

    // THE SAMPLER ONLY REPORTS ONLINE CORES; A WIDER WINDOW NEVER FILLS
    pub fn check_online(&self, online: usize) -> anyhow::Result<()> {
        if self.cores > online {
            anyhow::bail!("{} CORES REQUESTED, ONLY {} ONLINE", self.cores, online);
        }
        Ok(())
    }
}

// PLACEMENT DETECTION (SCHMITT TRIGGER)
// DIRECTION-AWARE: THE CURRENT PLACEMENT PICKS WHICH THRESHOLD APPLIES.
// BOTH TESTS RUN OVER THE SERVICE HOME CORE'S FULL DEBOUNCE WINDOW.
// SHRINKING IS POINTLESS WITHOUT A JOB TO HAND THE ELASTIC CORE TO.

pub fn detect_placement(
    current: LcsPlacement,
    window: &UtilWindow,
    low_pct: f64,
    high_pct: f64,
    has_admittable: bool,
) -> LcsPlacement {
    match current {
        LcsPlacement::Isolated => {
            if window.all_above(SERVICE_HOME_CORE, high_pct) {
                LcsPlacement::Shared
            } else {
                LcsPlacement::Isolated
            }
        }
        LcsPlacement::Shared => {
            if has_admittable && window.all_below(SERVICE_HOME_CORE, low_pct) {
                LcsPlacement::Isolated
            } else {
                LcsPlacement::Shared
            }
        }
    }
}

// TELEMETRY GATING: PRINT EVERY TICK IN VERBOSE MODE, OTHERWISE EVERY 4TH
// TICK PLUS ANY TICK THAT CHANGED SOMETHING.

pub fn should_print_telemetry(tick_counter: u64, changed: bool, verbose: bool) -> bool {
    verbose || changed || tick_counter % 4 == 0
}
