// COSCHED v0.4.2 -- CPU-AFFINITY CO-SCHEDULER
// KEEPS A LATENCY-CRITICAL SERVICE ON ITS CORES WHILE BATCH CONTAINERS
// FILL THE REST OF THE MACHINE
//
// PLACEMENT IS PURE AFFINITY: DOCKER CPUSETS FOR JOBS, sched_setaffinity
// FOR THE SERVICE. NOTHING HERE TOUCHES THE KERNEL SCHEDULER ITSELF.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cosched::catalog;
use cosched::cores;
use cosched::monitor::ProcStatSampler;
use cosched::policy::PolicyKind;
use cosched::runtime::{DockerRuntime, ProcessAffinity, DEFAULT_COMMAND_TEMPLATE, DEFAULT_IMAGE_TEMPLATE};
use cosched::scheduler::{RunOutcome, Scheduler};
use cosched::tuning::{self, SchedConfig};
use cosched::{log_error, log_info, log_warn};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "cosched")]
#[command(about = "COSCHED -- CPU-AFFINITY CO-SCHEDULER FOR A LATENCY-CRITICAL SERVICE AND BATCH JOBS")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    // RUN THE CATALOG TO COMPLETION, WRITING ARTIFACTS UNDER RESULT_DIR
    Run(RunArgs),

    // CHECK HOST DEPENDENCIES (DOCKER, /proc, SERVICE, KERNEL CPUSETS)
    Check {
        #[arg(long, default_value = "memcached")]
        service: String,
    },

    // PRINT PER-CORE UTILIZATION EVERY INTERVAL UNTIL CTRL+C
    Probe {
        #[arg(long, default_value_t = tuning::DEFAULT_INTERVAL_MS)]
        interval_ms: u64,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    result_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = PolicyKind::Dynamic)]
    policy: PolicyKind,

    // CATALOG FILE; BUILT-IN SET FOR THE POLICY IF OMITTED
    #[arg(long)]
    catalog: Option<PathBuf>,

    // comm OF THE LATENCY-CRITICAL SERVICE
    #[arg(long, default_value = "memcached")]
    service: String,

    // CORES UNDER MANAGEMENT (DEFAULT: ALL ONLINE)
    #[arg(long)]
    cores: Option<usize>,

    #[arg(long, default_value_t = tuning::DEFAULT_INTERVAL_MS)]
    interval_ms: u64,

    #[arg(long, default_value_t = tuning::DEFAULT_WINDOW)]
    window: usize,

    #[arg(long, default_value_t = tuning::DEFAULT_LOW_PCT)]
    low_pct: f64,

    #[arg(long, default_value_t = tuning::DEFAULT_HIGH_PCT)]
    high_pct: f64,

    #[arg(long, default_value_t = tuning::DEFAULT_ETA_FLOOR_SECS)]
    eta_floor_secs: u64,

    // PREFERENCE-ORDERED HEAVY JOBS FOR ELASTIC-CORE PROMOTION
    #[arg(long, value_delimiter = ',')]
    heavy: Option<Vec<String>>,

    // LARGE-MODE FILLER JOB
    #[arg(long)]
    secondary: Option<String>,

    #[arg(long, default_value = DEFAULT_IMAGE_TEMPLATE)]
    image_template: String,

    #[arg(long, default_value = DEFAULT_COMMAND_TEMPLATE)]
    command_template: String,

    // STOP SCHEDULING AFTER THIS MANY SECONDS
    #[arg(long)]
    timeout_secs: Option<u64>,

    // GZIP JOB LOGS AND INSPECT OUTPUT
    #[arg(long)]
    compress_logs: bool,

    // LEAVE CONTAINERS IN PLACE AFTER THE RUN
    #[arg(long)]
    keep_containers: bool,

    // DUMP FULL EVENT LOG ON EXIT
    #[arg(long)]
    dump_log: bool,

    // PRINT VERBOSE OUTPUT
    #[arg(long)]
    verbose: bool,
}

fn build_config(args: &RunArgs) -> Result<SchedConfig> {
    let online = cores::online_cores()?.len();
    let cores = args.cores.unwrap_or(online);
    let heavy = args.heavy.clone().unwrap_or_else(catalog::default_heavy);
    let secondary = match (&args.secondary, args.policy) {
        (Some(s), _) => Some(s.clone()),
        (None, PolicyKind::Large) => Some(catalog::DEFAULT_SECONDARY.to_string()),
        (None, _) => None,
    };
    let config = SchedConfig {
        cores,
        interval: Duration::from_millis(args.interval_ms),
        window: args.window,
        low_pct: args.low_pct,
        high_pct: args.high_pct,
        eta_floor: Duration::from_secs(args.eta_floor_secs),
        heavy,
        secondary,
    };
    config.validate()?;
    config.check_online(online)?;
    Ok(config)
}

fn run(args: RunArgs) -> Result<()> {
    cosched::log::set_verbose(args.verbose);

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    if let Some(secs) = args.timeout_secs {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            log_warn!("TIMEOUT AFTER {}s", secs);
            SHUTDOWN.store(true, Ordering::Relaxed);
        });
    }

    let config = build_config(&args)?;
    let specs = match &args.catalog {
        Some(path) => catalog::load_catalog(path)?,
        None => catalog::default_catalog(args.policy),
    };

    println!("COSCHED v0.4.2");
    println!("POLICY:          {:?}", args.policy);
    println!("CORES:           {}", config.cores);
    println!("SERVICE:         {}", args.service);
    println!("THRESHOLDS:      LOW={}% HIGH={}% WINDOW={} x {}ms",
             config.low_pct, config.high_pct, config.window, args.interval_ms);
    println!("JOBS:            {}", specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", "));
    println!("RESULTS:         {}", args.result_dir.display());
    println!();

    let runtime = DockerRuntime::new(&args.image_template, &args.command_template)?;
    let mut sched = Scheduler::new(
        specs,
        config,
        args.policy.build(),
        Box::new(runtime),
        Box::new(ProcessAffinity::new(&args.service)),
        Box::new(ProcStatSampler::new()),
        args.verbose,
    )?;

    let outcome = match sched.initialize().and_then(|_| {
        println!("COSCHED IS ACTIVE (CTRL+C TO EXIT)");
        sched.run(&SHUTDOWN)
    }) {
        Ok(o) => o,
        Err(e) => {
            log_error!("RUN ABORTED: {:#}", e);
            // CONTAINERS MUST NOT OUTLIVE A FAILED RUN
            if !args.keep_containers {
                sched.teardown();
            }
            return Err(e);
        }
    };

    println!("COSCHED IS SHUTTING DOWN ({:?})", outcome);

    if let Err(e) = sched.write_artifacts(&args.result_dir, args.compress_logs) {
        log_warn!("ARTIFACTS: {:#}", e);
    }

    println!();
    for p in sched.job_snapshot() {
        println!("{:<16} {:<10} cpus: {}", p.name, p.state.label(), p.cores);
    }

    if args.dump_log {
        sched.log.dump();
    }
    sched.log.summary();

    if args.keep_containers {
        log_info!("KEEPING CONTAINERS");
    } else {
        sched.teardown();
    }

    if outcome == RunOutcome::Interrupted {
        println!("COSCHED INTERRUPTED.");
    } else {
        println!("COSCHED OUT.");
    }
    Ok(())
}

fn main() -> Result<()> {
    let opts = Cli::parse();

    match opts.command {
        Command::Run(args) => run(args),
        Command::Check { service } => cli::check::run_check(&service),
        Command::Probe { interval_ms } => cli::probe::run_probe(Duration::from_millis(interval_ms)),
    }
}
