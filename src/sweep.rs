use crate::error::{CleanupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub skipped_non_files: usize,
}

pub fn retention_threshold(now: SystemTime, retention_days: u32) -> SystemTime {
    let age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    now.checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Deletes regular files in `dir` last written strictly before `threshold`.
///
/// Anything that is not a regular file is left in place. The first IO failure
/// ends the sweep.
pub fn sweep_logs(dir: &Path, threshold: SystemTime) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    if !dir.exists() {
        debug!(action = "skip", component = "log_sweep", dir = ?dir, "Log directory does not exist");
        return Ok(report);
    }

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CleanupError::Sweep { path, source }
    };

    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();

        let file_type = entry.file_type().map_err(io_err(&path))?;
        if !file_type.is_file() {
            warn!(action = "skip", component = "log_sweep", path = ?path, "Not a regular file, leaving it in place");
            report.skipped_non_files += 1;
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(io_err(&path))?;
        if modified < threshold {
            fs::remove_file(&path).map_err(io_err(&path))?;
            info!(action = "delete", component = "log_sweep", path = ?path, "Deleted expired log file");
            report.deleted.push(path);
        }
    }

    Ok(report)
}
