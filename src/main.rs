/// This file contains the `main` program logic which right now lists modules,
/// runs a module over a packet captured to disk, triages campaign results, or
/// cleans them up
use std::path::Path;

use chrono::Local;

use malform::clean::clean;
use malform::config::{parse_args, ApplyConfig, CleanConfig, Config, TriageConfig};
use malform::err::MalformErr;
use malform::harness::SimHarness;
use malform::mutators::{available_modules, create_module, find_module, ModuleStatus};
use malform::triage::scan;
use malform::{fatal, prompt, prompt_warn};

fn list() {
    for def in available_modules() {
        prompt!(
            "{}: filter '{}', {} entries, needs 0x{:X} byte packets",
            def.name,
            def.element_path,
            def.table.len(),
            def.table.required_len()
        );
    }
}

fn apply(config: &ApplyConfig) -> Result<(), MalformErr> {
    let def = find_module(&config.module)?;
    let mut module = create_module(def.name, config.policy)?;
    prompt!("Loaded module '{}' ({:?} policy)", module.name(), config.policy);

    // The decode reports our own element unless told otherwise
    let present = if config.present.is_empty() {
        vec![def.element_path.to_string()]
    } else {
        config.present.clone()
    };

    let mut pkt = std::fs::read(&config.input).map_err(|e| {
        MalformErr::from(&format!("Unable to read packet '{}': {}", config.input, e))
    })?;
    prompt!("Packet '{}' is 0x{:X} bytes", config.input, pkt.len());

    // Everything the decode might report has to be nameable
    let mut known = present.clone();
    known.push(def.element_path.to_string());
    let mut harness = SimHarness::new(&known[..]);

    if module.setup(&mut harness.ctx()) != ModuleStatus::Unchanged {
        return Err(MalformErr::from("Module setup failed"));
    }

    let status = harness.transmit(&mut *module, &mut pkt, &present[..]);
    let stats = module.stats();
    prompt!(
        "Status {} (matched {}, mutated {}, incomplete {}, suppressed {})",
        status.as_raw(),
        stats.matched,
        stats.mutated,
        stats.incomplete,
        stats.suppressed
    );

    if status != ModuleStatus::Mutated {
        prompt_warn!("Packet left unchanged, nothing written");
        return Ok(());
    }

    let output = config.output.clone().unwrap_or_else(|| {
        format!(
            "{}.malformed.{}",
            config.input,
            Local::now().format("%Y%m%d_%H%M%S")
        )
    });

    std::fs::write(&output, &pkt).map_err(|e| {
        MalformErr::from(&format!("Unable to write packet '{}': {}", output, e))
    })?;
    prompt!("Malformed packet written to '{}'", output);

    Ok(())
}

fn triage(config: &TriageConfig) -> Result<(), MalformErr> {
    let root = Path::new(&config.results_dir);
    prompt!("Scanning '{}' for '{}*' run folders...", root.display(), config.prefix);

    let report = scan(root, &config.prefix)?;
    prompt!(
        "Processed {} folders, {} without logs, {} crashed, {} never connected",
        report.processed,
        report.missing_logs,
        report.crashed,
        report.findings.len()
    );

    for name in report.payload_names() {
        prompt!("Payload: {}", name);
    }

    if let Some(path) = &config.report {
        report.write(root, Path::new(path))?;
        prompt!("Report written to '{}'", path);
    }

    Ok(())
}

fn tidy(config: &CleanConfig) -> Result<(), MalformErr> {
    let root = Path::new(&config.results_dir);
    prompt!("Cleaning '{}'...", root.display());

    let report = clean(root, config.ops, config.confirmed)?;
    if !config.confirmed {
        prompt_warn!("Dry run, nothing deleted. Pass --yes to remove the above");
        return Ok(());
    }

    let steps = [&report.pcapng, &report.empty_txt, &report.untransmitted];
    let removed: usize = steps.iter().map(|s| s.removed).sum();
    let failed: usize = steps.iter().map(|s| s.failed).sum();
    prompt!("Removed {} entries, {} failed", removed, failed);

    Ok(())
}

fn main() {
    let config = parse_args().unwrap_or_else(|error| {
        fatal!(error);
    });

    let result = match &config {
        Config::List => {
            list();
            Ok(())
        }
        Config::Apply(apply_config) => apply(apply_config),
        Config::Triage(triage_config) => triage(triage_config),
        Config::Clean(clean_config) => tidy(clean_config),
    };

    if let Err(error) = result {
        fatal!(error);
    }
}
