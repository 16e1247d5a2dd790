//! This file contains the logic for going through the result folders a test
//! campaign leaves behind and picking out the runs worth reproducing: the
//! baseband crashed and the UE never managed to connect. Each run lives in its
//! own folder named `<payload>_<YYYYMMDD>_<HHMMSS>` holding the run log and a
//! `docker_logs/events.1.txt` from the base station.
//!
//! SPDX-License-Identifier: MIT
//! Copyright (c) 2025 h0mbre

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::err::MalformErr;
use crate::{prompt, prompt_warn};

/// Anything in a run log that means the target went down
const CRASH_KEYWORDS: [&str; 3] = ["fatal error", "beginning of crash", "fatal signal"];

/// Base station event that means the UE attached
const CONNECTION_SUCCESS: &str = "1/2 UE connected to eNB/gNB";

/// Where the base station events live inside a run folder
const EVENTS_FILE: &str = "docker_logs/events.1.txt";

/// Folder prefix for result folders by default
pub const DEFAULT_PREFIX: &str = "mac_sch";

/// A crashed run without a UE connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub folder_name: String,
    pub folder_path: PathBuf,
    pub log_file: String,
}

impl Finding {
    /// Folder name without its run timestamp, `None` if it carries no stamp
    pub fn payload_name(&self) -> Option<&str> {
        payload_name(&self.folder_name)
    }
}

/// Totals for a whole scan
#[derive(Clone, Debug, Default)]
pub struct TriageReport {
    pub processed: usize,        // Matching folders visited
    pub missing_logs: usize,     // Folders without a .log
    pub crashed: usize,          // Folders whose log shows a crash
    pub findings: Vec<Finding>,  // Crashed and never connected
}

impl TriageReport {
    /// Unique payload names across all findings, sorted. Folders without a
    /// run stamp can't be traced back to a payload and are left out.
    pub fn payload_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for finding in &self.findings {
            let Some(name) = finding.payload_name() else {
                prompt_warn!("Unable to parse folder name '{}'", finding.folder_name);
                continue;
            };

            names.insert(name.to_string());
        }

        names.into_iter().collect()
    }

    /// Write the report to disk, stamped with the local time
    pub fn write(&self, root: &Path, path: &Path) -> Result<(), MalformErr> {
        let mut file = File::create(path).map_err(|e| {
            MalformErr::from(&format!("Unable to create report '{}': {}", path.display(), e))
        })?;

        let mut out = String::new();
        out.push_str(&format!(
            "# Scanned at: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("# Root: {}\n", root.display()));
        out.push_str(&format!("# Findings: {}\n", self.findings.len()));
        out.push_str(&format!("{}\n\n", "#".repeat(60)));

        for finding in &self.findings {
            out.push_str(&format!("Folder: {}\n", finding.folder_name));
            out.push_str(&format!("Path: {}\n", finding.folder_path.display()));
            out.push_str(&format!("Log: {}\n", finding.log_file));
            out.push_str(&format!("{}\n", "-".repeat(40)));
        }

        out.push_str("\n# Payloads\n");
        for name in self.payload_names() {
            out.push_str(&name);
            out.push('\n');
        }

        file.write_all(out.as_bytes()).map_err(|e| {
            MalformErr::from(&format!("Unable to write report '{}': {}", path.display(), e))
        })
    }
}

/// Strip the trailing `_YYYYMMDD_HHMMSS` run stamp, `None` unless the name
/// ends in a valid one
pub fn payload_name(folder_name: &str) -> Option<&str> {
    // "_" + 8 digits + "_" + 6 digits
    const STAMP_LEN: usize = 16;

    let split = folder_name.len().checked_sub(STAMP_LEN)?;
    if split == 0 || !folder_name.is_char_boundary(split) {
        return None;
    }

    let (name, stamp) = folder_name.split_at(split);
    let stamp = stamp.strip_prefix('_')?;

    if !stamp.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
        return None;
    }

    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S")
        .ok()
        .map(|_| name)
}

// First `.log` in a run folder, sorted so the pick is stable
fn find_log_file(folder: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(folder).ok()?;
    let mut logs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|x| x == "log").unwrap_or(false))
        .collect();

    logs.sort();
    logs.into_iter().next()
}

// Logs can carry arbitrary bytes, we only care about the ASCII keywords
fn read_lossy(path: &Path) -> Option<String> {
    let data = std::fs::read(path).ok()?;
    Some(String::from_utf8_lossy(&data).into_owned())
}

/// Does this log show the target crashing
pub fn log_shows_crash(log: &Path) -> bool {
    let Some(contents) = read_lossy(log) else {
        prompt_warn!("Unable to read log '{}'", log.display());
        return false;
    };

    let contents = contents.to_lowercase();
    CRASH_KEYWORDS.iter().any(|k| contents.contains(k))
}

/// Did the UE connect during this run
pub fn run_connected(folder: &Path) -> bool {
    read_lossy(&folder.join(EVENTS_FILE))
        .map(|c| c.contains(CONNECTION_SUCCESS))
        .unwrap_or(false)
}

// Depth-first walk collecting every directory whose name has `prefix`
fn collect_runs(dir: &Path, prefix: &str, runs: &mut Vec<PathBuf>) -> Result<(), MalformErr> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        MalformErr::from(&format!("Unable to read directory '{}': {}", dir.display(), e))
    })?;

    // Symlinked directories are not followed, a link loop would never end
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();

    for path in dirs {
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false);

        if matches {
            runs.push(path.clone());
        }

        collect_runs(&path, prefix, runs)?;
    }

    Ok(())
}

/// Scan `root` for run folders starting with `prefix` and classify them
pub fn scan(root: &Path, prefix: &str) -> Result<TriageReport, MalformErr> {
    if !root.is_dir() {
        return Err(MalformErr::from(&format!(
            "Results directory '{}' does not exist",
            root.display()
        )));
    }

    let mut runs = Vec::new();
    collect_runs(root, prefix, &mut runs)?;

    let mut report = TriageReport::default();
    for folder in runs {
        report.processed += 1;

        let Some(log) = find_log_file(&folder) else {
            prompt_warn!("No .log file in '{}'", folder.display());
            report.missing_logs += 1;
            continue;
        };

        if !log_shows_crash(&log) {
            continue;
        }

        report.crashed += 1;
        if run_connected(&folder) {
            continue;
        }

        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let log_file = log
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        prompt!("Crash without connection: {}", folder_name);
        report.findings.push(Finding {
            folder_name,
            folder_path: folder,
            log_file,
        });
    }

    Ok(report)
}
