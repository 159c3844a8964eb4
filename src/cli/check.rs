use std::io::Read;
use std::process::Command;

use anyhow::{bail, Result};

use cosched::cores;
use cosched::runtime::find_pids;

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// `docker info` FAILS WHEN THE CLI IS PRESENT BUT THE DAEMON IS NOT REACHABLE
fn check_docker_daemon() -> bool {
    Command::new("docker")
        .args(["info", "--format", "{{.ServerVersion}}"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }
    let found = config.contains("CONFIG_CPUSETS=y");
    if found {
        println!("  CONFIG_CPUSETS        OK");
    } else {
        println!("  CONFIG_CPUSETS        NOT FOUND -- docker --cpuset-cpus will fail");
    }
    found
}

pub fn run_check(service: &str) -> Result<()> {
    println!("COSCHED DEPENDENCY CHECK");
    println!();

    let mut ok = true;
    for tool in ["docker"] {
        if check_tool(tool) {
            println!("  {:<22}OK", tool);
        } else {
            println!("  {:<22}MISSING", tool);
            ok = false;
        }
    }
    if check_docker_daemon() {
        println!("  {:<22}OK", "docker daemon");
    } else {
        println!("  {:<22}UNREACHABLE", "docker daemon");
        ok = false;
    }
    println!();

    println!("HOST:");
    if std::fs::read_to_string("/proc/stat").map(|s| s.contains("cpu0")).unwrap_or(false) {
        println!("  {:<22}OK", "/proc/stat");
    } else {
        println!("  {:<22}NO PER-CPU LINES", "/proc/stat");
        ok = false;
    }
    match cores::online_cores() {
        Ok(list) if list.len() >= 3 => println!("  {:<22}{} ({})", "online cpus", list.len(), list),
        Ok(list) => {
            println!("  {:<22}{} -- NEED AT LEAST 3", "online cpus", list.len());
            ok = false;
        }
        Err(e) => {
            println!("  {:<22}UNKNOWN ({:#})", "online cpus", e);
            ok = false;
        }
    }
    match find_pids(service) {
        Ok(pids) if !pids.is_empty() => println!("  {:<22}RUNNING (pid {:?})", service, pids),
        Ok(_) => {
            println!("  {:<22}NOT RUNNING", service);
            ok = false;
        }
        Err(e) => {
            println!("  {:<22}UNKNOWN ({:#})", service, e);
            ok = false;
        }
    }
    println!();

    println!("KERNEL CONFIG:");
    if !check_kernel_config() {
        ok = false;
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
        Ok(())
    } else {
        println!("SOME CHECKS FAILED");
        if !check_tool("docker") {
            println!("  Install docker: https://docs.docker.com/engine/install/");
        }
        bail!("DEPENDENCY CHECK FAILED")
    }
}
