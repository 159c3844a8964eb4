// COSCHED COLLABORATORS
// THE SCHEDULING CORE ONLY SEES THESE TRAITS. DOCKER AND /proc LIVE BEHIND THEM.
//
//   JobRuntime:      CONTAINER LIFECYCLE + CPUSET FOR BATCH JOBS (DOCKER CLI)
//   ServiceAffinity: CORE MASK FOR THE LATENCY-CRITICAL SERVICE (sched_setaffinity)

use std::fs;
use std::process::{Command, Output};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::cores::CoreList;
use crate::job::{JobHandle, JobSpec};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PauseOutcome {
    Paused,
    Gone,   // ALREADY EXITED OR REMOVED. THE NEXT COMPLETION POLL RETIRES IT.
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunStatus {
    Running,
    Exited,
}

pub trait JobRuntime {
    fn image_ref(&self, spec: &JobSpec) -> String;
    fn pull_image(&mut self, image: &str) -> Result<()>;
    fn create(&mut self, spec: &JobSpec) -> Result<JobHandle>;
    fn start(&mut self, handle: &JobHandle) -> Result<()>;
    fn pause(&mut self, handle: &JobHandle) -> Result<PauseOutcome>;
    fn unpause(&mut self, handle: &JobHandle) -> Result<()>;
    fn set_core_affinity(&mut self, handle: &JobHandle, cores: &CoreList) -> Result<()>;
    fn inspect_status(&mut self, handle: &JobHandle) -> Result<RunStatus>;
    fn remove(&mut self, handle: &JobHandle) -> Result<()>;
    fn fetch_logs(&mut self, handle: &JobHandle) -> Result<Vec<u8>>;
    fn fetch_inspect_metadata(&mut self, handle: &JobHandle) -> Result<Vec<u8>>;
}

pub trait ServiceAffinity {
    fn set_affinity(&mut self, cores: &CoreList) -> Result<()>;
}

// --- TEMPLATES ---

pub const DEFAULT_IMAGE_TEMPLATE: &str = "anakli/parsec:{name}-native-reduced";
pub const DEFAULT_COMMAND_TEMPLATE: &str =
    "./bin/parsecmgmt -a run -p {package} -i native -n {threads}";

pub fn render_template(template: &str, spec: &JobSpec) -> String {
    template
        .replace("{name}", &spec.name)
        .replace("{package}", &spec.package)
        .replace("{threads}", &spec.threads.to_string())
}

// --- DOCKER CLI RUNTIME ---

pub struct DockerRuntime {
    docker: String,
    image_template: String,
    command_template: String,
    gone: Regex,
}

impl DockerRuntime {
    pub fn new(image_template: &str, command_template: &str) -> Result<Self> {
        Ok(Self {
            docker: "docker".to_string(),
            image_template: image_template.to_string(),
            command_template: command_template.to_string(),
            gone: gone_pattern()?,
        })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.docker)
            .args(args)
            .output()
            .with_context(|| format!("SPAWN {} {}", self.docker, args.join(" ")))
    }

    // NON-ZERO EXIT BECOMES AN ERROR CARRYING DOCKER'S STDERR
    fn run_ok(&self, args: &[&str]) -> Result<Vec<u8>> {
        let out = self.run(args)?;
        if !out.status.success() {
            bail!(
                "{} {} FAILED: {}",
                self.docker,
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(out.stdout)
    }
}

// DAEMON REPLIES FOR A CONTAINER THAT FINISHED OR VANISHED
fn gone_pattern() -> Result<Regex> {
    Regex::new(r"(?i)(no such container|is not running|is already stopped)")
        .context("COMPILE DOCKER ERROR PATTERN")
}

pub fn is_gone_error(pattern: &Regex, stderr: &str) -> bool {
    pattern.is_match(stderr)
}

impl JobRuntime for DockerRuntime {
    fn image_ref(&self, spec: &JobSpec) -> String {
        render_template(&self.image_template, spec)
    }

    fn pull_image(&mut self, image: &str) -> Result<()> {
        let out = self.run_ok(&["pull", "--quiet", image])?;
        log_debug!("PULLED {}", String::from_utf8_lossy(&out).trim());
        Ok(())
    }

    fn create(&mut self, spec: &JobSpec) -> Result<JobHandle> {
        let image = self.image_ref(spec);
        let command = render_template(&self.command_template, spec);
        let mut args = vec!["create", "--name", spec.name.as_str(), image.as_str()];
        args.extend(command.split_whitespace());
        self.run_ok(&args)?;
        Ok(JobHandle(spec.name.clone()))
    }

    fn start(&mut self, handle: &JobHandle) -> Result<()> {
        self.run_ok(&["start", &handle.0]).map(|_| ())
    }

    fn pause(&mut self, handle: &JobHandle) -> Result<PauseOutcome> {
        let out = self.run(&["pause", &handle.0])?;
        if out.status.success() {
            return Ok(PauseOutcome::Paused);
        }
        let stderr = String::from_utf8_lossy(&out.stderr);
        if is_gone_error(&self.gone, &stderr) {
            return Ok(PauseOutcome::Gone);
        }
        bail!("{} pause {} FAILED: {}", self.docker, handle.0, stderr.trim())
    }

    fn unpause(&mut self, handle: &JobHandle) -> Result<()> {
        self.run_ok(&["unpause", &handle.0]).map(|_| ())
    }

    fn set_core_affinity(&mut self, handle: &JobHandle, cores: &CoreList) -> Result<()> {
        let cpuset = cores.to_string();
        self.run_ok(&["update", "--cpuset-cpus", &cpuset, &handle.0]).map(|_| ())
    }

    fn inspect_status(&mut self, handle: &JobHandle) -> Result<RunStatus> {
        let out = self.run_ok(&["inspect", "--format", "{{.State.Status}}", &handle.0])?;
        match String::from_utf8_lossy(&out).trim() {
            "exited" | "dead" => Ok(RunStatus::Exited),
            _ => Ok(RunStatus::Running),
        }
    }

    fn remove(&mut self, handle: &JobHandle) -> Result<()> {
        self.run_ok(&["rm", "--force", &handle.0]).map(|_| ())
    }

    fn fetch_logs(&mut self, handle: &JobHandle) -> Result<Vec<u8>> {
        // STDOUT STREAM ONLY
        let out = self.run(&["logs", &handle.0])?;
        if !out.status.success() {
            bail!("{} logs {} FAILED: {}", self.docker, handle.0,
                  String::from_utf8_lossy(&out.stderr).trim());
        }
        Ok(out.stdout)
    }

    fn fetch_inspect_metadata(&mut self, handle: &JobHandle) -> Result<Vec<u8>> {
        self.run_ok(&["inspect", &handle.0])
    }
}

// --- SERVICE PINNING VIA sched_setaffinity ---

// LOCATES THE SERVICE BY comm (LIKE pidof) AND PINS EVERY THREAD (LIKE taskset -a)
pub struct ProcessAffinity {
    comm: String,
}

impl ProcessAffinity {
    pub fn new(comm: &str) -> Self {
        Self { comm: comm.to_string() }
    }

    pub fn comm(&self) -> &str {
        &self.comm
    }
}

pub fn find_pids(comm: &str) -> Result<Vec<i32>> {
    let mut pids = Vec::new();
    for entry in fs::read_dir("/proc").context("READ /proc")?.flatten() {
        let pid: i32 = match entry.file_name().to_string_lossy().parse() {
            Ok(p) => p,
            Err(_) => continue,
        };
        // PROCESS MAY EXIT BETWEEN readdir AND read
        let name = match fs::read_to_string(entry.path().join("comm")) {
            Ok(n) => n,
            Err(_) => continue,
        };
        if name.trim() == comm {
            pids.push(pid);
        }
    }
    pids.sort_unstable();
    Ok(pids)
}

fn thread_ids(pid: i32) -> Vec<i32> {
    let dir = format!("/proc/{}/task", pid);
    match fs::read_dir(&dir) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|e| e.file_name().to_string_lossy().parse().ok())
            .collect(),
        Err(_) => vec![pid],
    }
}

pub fn pin_thread(tid: i32, cores: &CoreList) -> std::io::Result<()> {
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for core in cores.iter() {
            libc::CPU_SET(core, &mut set);
        }
        libc::sched_setaffinity(tid, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl ServiceAffinity for ProcessAffinity {
    fn set_affinity(&mut self, cores: &CoreList) -> Result<()> {
        if cores.is_empty() {
            bail!("REFUSING TO PIN {} TO AN EMPTY CORE LIST", self.comm);
        }
        let pids = find_pids(&self.comm)?;
        if pids.is_empty() {
            bail!("SERVICE {} NOT RUNNING (NO MATCHING /proc/*/comm)", self.comm);
        }
        let mut pinned = 0usize;
        for pid in &pids {
            for tid in thread_ids(*pid) {
                match pin_thread(tid, cores) {
                    Ok(()) => pinned += 1,
                    // THREAD EXITED UNDER US
                    Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {}
                    Err(e) => {
                        return Err(e).with_context(|| {
                            format!("PIN {} TID {} TO CPUS {}", self.comm, tid, cores)
                        })
                    }
                }
            }
        }
        log_info!("{} ({} THREADS) RUNNING ON CPUS {}", self.comm, pinned, cores);
        Ok(())
    }
}
