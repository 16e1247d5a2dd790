/// This file contains all of the logic necessary to formulate a coherent
/// Config data structure out of the command line. We use the `clap` crate and
/// parse args here
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::clean::CleanOps;
use crate::err::MalformErr;
use crate::mutators::IncompletePolicy;
use crate::triage::DEFAULT_PREFIX;

/// Run one module over a raw packet file
#[derive(Clone, Debug)]
pub struct ApplyConfig {
    pub module: String,
    pub input: String,
    pub output: Option<String>,
    pub present: Vec<String>,
    pub policy: IncompletePolicy,
}

/// Sift a campaign's result folders
#[derive(Clone, Debug)]
pub struct TriageConfig {
    pub results_dir: String,
    pub prefix: String,
    pub report: Option<String>,
}

/// Tidy a campaign's result folders
#[derive(Clone, Debug)]
pub struct CleanConfig {
    pub results_dir: String,
    pub ops: CleanOps,
    pub confirmed: bool,
}

/// What the user asked the binary to do
#[derive(Clone, Debug)]
pub enum Config {
    List,
    Apply(ApplyConfig),
    Triage(TriageConfig),
    Clean(CleanConfig),
}

fn command() -> Command {
    Command::new("malform")
    .version("0.0.1")
    .about("Table-driven packet malformation modules for protocol fuzzing harnesses")
    .subcommand_required(true)
    .arg_required_else_help(true)
    .subcommand(Command::new("list")
        .about("Lists the modules that can be loaded"))
    .subcommand(Command::new("apply")
        .about("Runs a module over one raw outbound packet")
        .arg(Arg::new("module")
            .long("module")
            .value_name("NAME")
            .help("Name of the module to load")
            .required(true))
        .arg(Arg::new("input")
            .long("input")
            .value_name("FILE")
            .help("Raw packet bytes as the harness would transmit them")
            .required(true))
        .arg(Arg::new("output")
            .long("output")
            .value_name("FILE")
            .help("Where to write the packet (defaults to <input>.malformed.<timestamp>)"))
        .arg(Arg::new("present")
            .long("present")
            .value_name("ELEMENT")
            .help("Element paths the simulated decode reports (defaults to the module's own)")
            .num_args(1..)
            .action(ArgAction::Append))
        .arg(Arg::new("policy")
            .long("policy")
            .value_name("POLICY")
            .help("What to do with packets too short for the table: 'suppress' (default) or 'partial'")))
    .subcommand(Command::new("triage")
        .about("Finds runs that crashed the target without a UE connection")
        .arg(Arg::new("results-dir")
            .long("results-dir")
            .value_name("DIR")
            .help("Root of the campaign result folders")
            .required(true))
        .arg(Arg::new("prefix")
            .long("prefix")
            .value_name("PREFIX")
            .help("Only consider run folders starting with this ('mac_sch' default)"))
        .arg(Arg::new("report")
            .long("report")
            .value_name("FILE")
            .help("Write the findings and payload names to this file")))
    .subcommand(Command::new("clean")
        .about("Removes captures, empty text files, and runs that never sent an RRC Setup")
        .arg(Arg::new("results-dir")
            .long("results-dir")
            .value_name("DIR")
            .help("Root of the campaign result folders")
            .required(true))
        .arg(Arg::new("pcapng")
            .long("pcapng")
            .help("Only delete *.pcapng captures (combinable)")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("empty-txt")
            .long("empty-txt")
            .help("Only delete empty or whitespace-only *.txt files (combinable)")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("untransmitted")
            .long("untransmitted")
            .help("Only remove run folders whose events.1.txt never shows the RRC Setup sent (combinable)")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("yes")
            .long("yes")
            .short('y')
            .help("Actually delete, otherwise only list what would go")
            .action(ArgAction::SetTrue)))
}

fn apply_config(matches: &ArgMatches) -> Result<ApplyConfig, MalformErr> {
    // Unwraps safe on required args
    let module = matches.get_one::<String>("module").unwrap().to_string();
    let input = matches.get_one::<String>("input").unwrap().to_string();
    let output = matches.get_one::<String>("output").cloned();
    let present = matches
        .get_many::<String>("present")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    let policy = match matches.get_one::<String>("policy") {
        None => IncompletePolicy::default(),
        Some(name) => IncompletePolicy::from_name(name)?,
    };

    Ok(ApplyConfig {
        module,
        input,
        output,
        present,
        policy,
    })
}

fn triage_config(matches: &ArgMatches) -> TriageConfig {
    TriageConfig {
        results_dir: matches.get_one::<String>("results-dir").unwrap().to_string(),
        prefix: matches
            .get_one::<String>("prefix")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
        report: matches.get_one::<String>("report").cloned(),
    }
}

fn clean_config(matches: &ArgMatches) -> CleanConfig {
    let picked = CleanOps {
        pcapng: matches.get_flag("pcapng"),
        empty_txt: matches.get_flag("empty-txt"),
        untransmitted: matches.get_flag("untransmitted"),
    };

    // No sweep named means all of them
    let ops = if picked.pcapng || picked.empty_txt || picked.untransmitted {
        picked
    } else {
        CleanOps::default()
    };

    CleanConfig {
        results_dir: matches.get_one::<String>("results-dir").unwrap().to_string(),
        ops,
        confirmed: matches.get_flag("yes"),
    }
}

fn from_matches(matches: &ArgMatches) -> Result<Config, MalformErr> {
    match matches.subcommand() {
        Some(("list", _)) => Ok(Config::List),
        Some(("apply", sub)) => Ok(Config::Apply(apply_config(sub)?)),
        Some(("triage", sub)) => Ok(Config::Triage(triage_config(sub))),
        Some(("clean", sub)) => Ok(Config::Clean(clean_config(sub))),
        _ => Err(MalformErr::from("No subcommand given")),
    }
}

/// Build a Config from an explicit argument list
pub fn parse_from<I, T>(args: I) -> Result<Config, MalformErr>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = command()
        .try_get_matches_from(args)
        .map_err(|e| MalformErr::from(&e.to_string()))?;

    from_matches(&matches)
}

/// Parse the process arguments, help and version requests exit right here
pub fn parse_args() -> Result<Config, MalformErr> {
    from_matches(&command().get_matches())
}
