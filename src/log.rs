// COSCHED LOG MACROS
// ONE LINE PER EVENT ON STDERR: [ELAPSED] LEVEL MESSAGE
// STDOUT IS RESERVED FOR PER-TICK TELEMETRY AND REPORTS.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);
static EPOCH_NS: AtomicU64 = AtomicU64::new(0);

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn emit(level: &str, args: fmt::Arguments<'_>) {
    let now = monotonic_ns();
    // FIRST CALLER PINS THE EPOCH
    let epoch = match EPOCH_NS.compare_exchange(0, now, Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => now,
        Err(prev) => prev,
    };
    let elapsed_s = now.saturating_sub(epoch) as f64 / 1_000_000_000.0;
    eprintln!("[{:>9.3}] {:<5} {}", elapsed_s, level, args);
}

pub fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log::emit("INFO", format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log::emit("WARN", format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log::emit("ERROR", format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::log::verbose() {
            $crate::log::emit("DEBUG", format_args!($($arg)*))
        }
    };
}
