// COSCHED EVENT LOG
// RECORDS ONE SNAPSHOT PER SCHEDULING TICK
// PRE-ALLOCATED RING BUFFER. NO HEAP ALLOCATION DURING THE LOOP.
// WRAPS AROUND AT CAPACITY -- OLDEST ENTRIES OVERWRITTEN.

use crate::log::monotonic_ns;
use crate::registry::Counts;
use crate::tuning::LcsPlacement;

const MAX_SNAPSHOTS: usize = 8192;

#[derive(Clone, Copy)]
pub struct Snapshot {
    pub ts_ns:       u64,
    pub cpu0_pct:    f64,    // NaN WHEN THE TICK'S SAMPLE FAILED
    pub lcs:         LcsPlacement,
    pub running:     usize,
    pub paused:      usize,
    pub waiting:     usize,  // CREATED, NEVER STARTED
    pub completed:   usize,
    pub preemptions: u64,    // CUMULATIVE
}

impl Snapshot {
    const EMPTY: Snapshot = Snapshot {
        ts_ns: 0,
        cpu0_pct: 0.0,
        lcs: LcsPlacement::Shared,
        running: 0,
        paused: 0,
        waiting: 0,
        completed: 0,
        preemptions: 0,
    };
}

pub struct EventLog {
    snapshots: Vec<Snapshot>,
    head:      usize,
    len:       usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            snapshots: vec![Snapshot::EMPTY; MAX_SNAPSHOTS],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // RECORD ONE TICK. OVERWRITES OLDEST ENTRY WHEN FULL.
    pub fn snapshot(&mut self, cpu0_pct: Option<f64>, lcs: LcsPlacement,
                    counts: Counts, preemptions: u64) {
        self.snapshots[self.head] = Snapshot {
            ts_ns: monotonic_ns(),
            cpu0_pct: cpu0_pct.unwrap_or(f64::NAN),
            lcs,
            running: counts.running,
            paused: counts.paused,
            waiting: counts.created,
            completed: counts.completed,
            preemptions,
        };
        self.head = (self.head + 1) % MAX_SNAPSHOTS;
        if self.len < MAX_SNAPSHOTS {
            self.len += 1;
        }
    }

    // ITERATE SNAPSHOTS IN CHRONOLOGICAL ORDER
    pub fn iter_chronological(&self) -> impl Iterator<Item = &Snapshot> {
        let start = if self.len < MAX_SNAPSHOTS { 0 } else { self.head };
        (0..self.len).map(move |i| {
            &self.snapshots[(start + i) % MAX_SNAPSHOTS]
        })
    }

    // DUMP THE TIME SERIES AFTER EXECUTION
    pub fn dump(&self) {
        let mut iter = self.iter_chronological();
        let first = match iter.next() {
            Some(s) => s,
            None => return,
        };
        let base_ts = first.ts_ns;

        println!("\n{:<10} {:<8} {:<9} {:<6} {:<6} {:<6} {:<6} {:<6}",
            "TIME_S", "CPU0%", "SERVICE", "RUN", "PAUSE", "WAIT", "DONE", "PREEMPT");
        println!("{}", "-".repeat(66));

        for s in std::iter::once(first).chain(iter) {
            let elapsed_s = s.ts_ns.saturating_sub(base_ts) as f64 / 1_000_000_000.0;
            println!("{:<10.1} {:<8.1} {:<9} {:<6} {:<6} {:<6} {:<6} {:<6}",
                elapsed_s, s.cpu0_pct, s.lcs.label(), s.running, s.paused,
                s.waiting, s.completed, s.preemptions);
        }

        if self.len == MAX_SNAPSHOTS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} SNAPSHOTS)", MAX_SNAPSHOTS);
        }
        println!("TOTAL SNAPSHOTS: {}", self.len);
    }

    // TICKS SPENT WITH THE SERVICE ON TWO CORES
    pub fn shared_ticks(&self) -> usize {
        self.iter_chronological()
            .filter(|s| s.lcs == LcsPlacement::Shared)
            .count()
    }

    // SERVICE PLACEMENT CHANGES BETWEEN CONSECUTIVE SNAPSHOTS
    pub fn placement_changes(&self) -> usize {
        let lcs: Vec<LcsPlacement> = self.iter_chronological().map(|s| s.lcs).collect();
        lcs.windows(2).filter(|w| w[0] != w[1]).count()
    }

    // SUMMARY STATISTICS
    pub fn summary(&self) {
        if self.len < 2 {
            return;
        }

        let snapshots: Vec<&Snapshot> = self.iter_chronological().collect();
        let (first, last) = (snapshots[0], snapshots[snapshots.len() - 1]);

        let valid: Vec<f64> = snapshots.iter()
            .map(|s| s.cpu0_pct)
            .filter(|p| !p.is_nan())
            .collect();
        let peak = valid.iter().cloned().fold(0.0f64, f64::max);
        let avg = if valid.is_empty() { 0.0 } else { valid.iter().sum::<f64>() / valid.len() as f64 };

        let shared = self.shared_ticks();
        let peak_running = snapshots.iter().map(|s| s.running).max().unwrap_or(0);

        let elapsed_ns = last.ts_ns.saturating_sub(first.ts_ns);
        let elapsed_s = elapsed_ns as f64 / 1_000_000_000.0;

        println!("\n{}", "=".repeat(50));
        println!("COSCHED SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  JOBS COMPLETED:    {}", last.completed);
        println!("  PREEMPTIONS:       {}", last.preemptions);
        println!("  PEAK RUNNING:      {}", peak_running);
        println!("  CPU0 AVG / PEAK:   {:.1}% / {:.1}%", avg, peak);
        println!("  SERVICE SHARED:    {:.1}% OF TICKS", shared as f64 / self.len as f64 * 100.0);
        println!("  SERVICE MOVES:     {}", self.placement_changes());
        if valid.len() < self.len {
            println!("  FAILED SAMPLES:    {}", self.len - valid.len());
        }
        println!("  ELAPSED:           {:.1}s", elapsed_s);
        println!("  SAMPLES:           {}", self.len);
    }
}
