//! This file contains the housekeeping for a campaign's results directory.
//! Long campaigns leave behind gigabytes of packet captures, empty log files,
//! and run folders where the base station never even sent the RRC Setup the
//! modules key on. Each sweep here finds those and, once confirmed, removes
//! them. Without confirmation nothing on disk is touched.
//!
//! SPDX-License-Identifier: MIT
//! Copyright (c) 2025 h0mbre

use std::path::{Path, PathBuf};

use crate::err::MalformErr;
use crate::{prompt, prompt_warn};

/// Base station event logged once the RRC Setup actually went out
const RRC_SETUP_SENT: &str = "[M] TX --> RRC Setup";

/// Base station event log, anywhere inside a run folder
const EVENTS_NAME: &str = "events.1.txt";

/// How many paths each sweep prints before summarising
const SHOW_MAX: usize = 5;

/// Which sweeps to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanOps {
    pub pcapng: bool,        // Every *.pcapng under the root
    pub empty_txt: bool,     // *.txt files that are empty or all whitespace
    pub untransmitted: bool, // Top-level run folders with no RRC Setup sent
}

impl Default for CleanOps {
    fn default() -> Self {
        CleanOps {
            pcapng: true,
            empty_txt: true,
            untransmitted: true,
        }
    }
}

/// Outcome of one sweep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanStep {
    pub found: Vec<PathBuf>, // Candidates, sorted
    pub removed: usize,
    pub failed: usize,
}

/// Outcome of a whole clean, sweeps that didn't run stay empty
#[derive(Clone, Debug, Default)]
pub struct CleanReport {
    pub pcapng: CleanStep,
    pub empty_txt: CleanStep,
    pub untransmitted: CleanStep,
}

// Every regular file below `dir`, symlinks are neither followed nor listed
fn walk_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), MalformErr> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        MalformErr::from(&format!("Unable to read directory '{}': {}", dir.display(), e))
    })?;

    let mut entries: Vec<_> = entries.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            walk_files(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }

    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().map(|x| x == ext).unwrap_or(false)
}

/// Every packet capture below `root`
pub fn find_pcapng(root: &Path) -> Result<Vec<PathBuf>, MalformErr> {
    let mut files = Vec::new();
    walk_files(root, &mut files)?;
    files.retain(|p| has_extension(p, "pcapng"));
    Ok(files)
}

/// Every text file below `root` with nothing but whitespace in it
pub fn find_empty_txt(root: &Path) -> Result<Vec<PathBuf>, MalformErr> {
    let mut files = Vec::new();
    walk_files(root, &mut files)?;

    let mut empty = Vec::new();
    for path in files.into_iter().filter(|p| has_extension(p, "txt")) {
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                prompt_warn!("Unable to read '{}': {}", path.display(), e);
                continue;
            }
        };

        if String::from_utf8_lossy(&data).trim().is_empty() {
            empty.push(path);
        }
    }

    Ok(empty)
}

/// Top-level run folders whose event logs never show the RRC Setup going
/// out. Folders without any event log are left alone.
pub fn find_untransmitted_runs(root: &Path) -> Result<Vec<PathBuf>, MalformErr> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        MalformErr::from(&format!("Unable to read directory '{}': {}", root.display(), e))
    })?;

    let mut folders: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    folders.sort();

    let mut stale = Vec::new();
    for folder in folders {
        let mut files = Vec::new();
        walk_files(&folder, &mut files)?;

        let events: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| p.file_name().map(|n| n == EVENTS_NAME).unwrap_or(false))
            .collect();

        if events.is_empty() {
            prompt_warn!("No {} in '{}', skipping", EVENTS_NAME, folder.display());
            continue;
        }

        let sent = events.iter().any(|path| match std::fs::read(path) {
            Ok(data) => String::from_utf8_lossy(&data).contains(RRC_SETUP_SENT),
            Err(e) => {
                prompt_warn!("Unable to read '{}': {}", path.display(), e);
                false
            }
        });

        if !sent {
            stale.push(folder);
        }
    }

    Ok(stale)
}

// List what a sweep found and remove it if confirmed
fn sweep(what: &str, found: Vec<PathBuf>, folders: bool, confirmed: bool) -> CleanStep {
    prompt!("Found {} {}", found.len(), what);
    for path in found.iter().take(SHOW_MAX) {
        prompt!("  {}", path.display());
    }
    if found.len() > SHOW_MAX {
        prompt!("  ... and {} more", found.len() - SHOW_MAX);
    }

    let mut step = CleanStep {
        found,
        ..Default::default()
    };

    if !confirmed {
        return step;
    }

    for path in &step.found {
        let result = if folders {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };

        match result {
            Ok(()) => step.removed += 1,
            Err(e) => {
                prompt_warn!("Unable to remove '{}': {}", path.display(), e);
                step.failed += 1;
            }
        }
    }

    step
}

/// Run the selected sweeps over `root` in order: captures, empty text files,
/// then untransmitted runs. Without `confirmed` this only reports.
pub fn clean(root: &Path, ops: CleanOps, confirmed: bool) -> Result<CleanReport, MalformErr> {
    if !root.is_dir() {
        return Err(MalformErr::from(&format!(
            "Results directory '{}' does not exist",
            root.display()
        )));
    }

    let mut report = CleanReport::default();

    if ops.pcapng {
        report.pcapng = sweep("packet captures", find_pcapng(root)?, false, confirmed);
    }

    if ops.empty_txt {
        report.empty_txt = sweep("empty text files", find_empty_txt(root)?, false, confirmed);
    }

    // An empty events log removed above no longer condemns its folder
    if ops.untransmitted {
        report.untransmitted = sweep(
            "runs without an RRC Setup sent",
            find_untransmitted_runs(root)?,
            true,
            confirmed,
        );
    }

    Ok(report)
}
