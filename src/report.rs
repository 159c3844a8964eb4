// COSCHED RUN ARTIFACTS
// PER-JOB LOGS AND RUNTIME METADATA UNDER THE RESULT DIRECTORY:
//
//   <dir>/logs/<job>.out[.gz]    JOB STDOUT
//   <dir>/info/<job>.json[.gz]   RUNTIME INSPECT OUTPUT
//   <dir>/placement.txt          FINAL CORES PER JOB
//
// A JOB WHOSE ARTIFACTS CANNOT BE FETCHED IS LOGGED AND SKIPPED.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::job::JobHandle;
use crate::registry::JobRegistry;
use crate::runtime::JobRuntime;
use crate::scheduler::JobSnapshot;

fn write_blob(path: &Path, data: &[u8], compress: bool) -> Result<PathBuf> {
    let path = if compress {
        let mut p = path.as_os_str().to_owned();
        p.push(".gz");
        PathBuf::from(p)
    } else {
        path.to_path_buf()
    };
    let file = fs::File::create(&path)
        .with_context(|| format!("CREATE {}", path.display()))?;
    if compress {
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(data).with_context(|| format!("WRITE {}", path.display()))?;
        enc.finish().with_context(|| format!("FINISH {}", path.display()))?;
    } else {
        let mut file = file;
        file.write_all(data).with_context(|| format!("WRITE {}", path.display()))?;
    }
    Ok(path)
}

fn fetch_one(
    runtime: &mut dyn JobRuntime,
    name: &str,
    handle: &JobHandle,
    logs: &Path,
    info: &Path,
    compress: bool,
) -> Result<()> {
    let out = runtime.fetch_logs(handle).with_context(|| format!("FETCH LOGS JOB {}", name))?;
    write_blob(&logs.join(format!("{}.out", name)), &out, compress)?;
    let meta = runtime.fetch_inspect_metadata(handle)
        .with_context(|| format!("INSPECT JOB {}", name))?;
    write_blob(&info.join(format!("{}.json", name)), &meta, compress)?;
    Ok(())
}

// RETURNS THE NUMBER OF JOBS WHOSE ARTIFACTS WERE WRITTEN
pub fn write_artifacts(
    runtime: &mut dyn JobRuntime,
    registry: &JobRegistry,
    dir: &Path,
    compress: bool,
) -> Result<usize> {
    let logs = dir.join("logs");
    let info = dir.join("info");
    fs::create_dir_all(&logs).with_context(|| format!("CREATE {}", logs.display()))?;
    fs::create_dir_all(&info).with_context(|| format!("CREATE {}", info.display()))?;

    let mut written = 0usize;
    for job in registry.iter() {
        let handle = match &job.handle {
            Some(h) => h,
            None => continue,
        };
        match fetch_one(runtime, job.name(), handle, &logs, &info, compress) {
            Ok(()) => written += 1,
            Err(e) => log_warn!("ARTIFACTS FOR JOB {} SKIPPED: {:#}", job.name(), e),
        }
    }
    log_info!("WROTE ARTIFACTS FOR {}/{} JOBS TO {}", written, registry.len(), dir.display());
    Ok(written)
}

pub fn format_placement(placement: &[JobSnapshot]) -> String {
    let mut out = format!("{:<16} {:<8} {:<10} {:<8} {:<7} {}\n",
        "JOB", "THREADS", "STATE", "CPUS", "PAUSES", "ETA_LEFT_S");
    for p in placement {
        let cpus = if p.cores.is_empty() { "-".to_string() } else { p.cores.to_string() };
        out.push_str(&format!("{:<16} {:<8} {:<10} {:<8} {:<7} {:.1}\n",
            p.name, p.threads, p.state.label(), cpus, p.pauses, p.remaining.as_secs_f64()));
    }
    out
}

pub fn write_placement(placement: &[JobSnapshot], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("CREATE {}", dir.display()))?;
    let path = dir.join("placement.txt");
    fs::write(&path, format_placement(placement))
        .with_context(|| format!("WRITE {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    use crate::cores::CoreList;
    use crate::job::JobState;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cosched-report-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn compressed_blob_round_trips_through_gzip() {
        let dir = scratch("gz");
        let path = write_blob(&dir.join("dedup.out"), b"real 55.0\n", true).unwrap();
        assert!(path.to_string_lossy().ends_with("dedup.out.gz"));
        let mut text = String::new();
        flate2::read::GzDecoder::new(fs::File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "real 55.0\n");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn placement_table_lists_final_cores() {
        let rows = vec![
            JobSnapshot {
                name: "ferret".into(),
                threads: 3,
                state: JobState::Completed,
                cores: CoreList::from_cores([1, 2, 3]),
                remaining: Duration::from_secs(12),
                pauses: 1,
            },
            JobSnapshot {
                name: "dedup".into(),
                threads: 1,
                state: JobState::Created,
                cores: CoreList::new(),
                remaining: Duration::from_secs(55),
                pauses: 0,
            },
        ];
        let text = format_placement(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("ferret"));
        assert!(lines[1].contains("1,2,3"));
        assert!(lines[2].contains(" - "));
    }
}
