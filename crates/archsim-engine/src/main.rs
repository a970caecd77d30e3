//! `archsim` command line: grade, check and inspect submissions

use anyhow::{bail, Context, Result};
use archsim_engine::{logging, Engine, EngineConfig};
use archsim_model::Submission;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn cli() -> Command {
    let submission = Arg::new("submission")
        .long("submission")
        .short('s')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Submission file (JSON, or YAML with a .yaml/.yml extension)");
    let config = Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("Engine configuration (TOML)");
    let json = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print machine-readable JSON");

    Command::new("archsim")
        .version(archsim_engine::VERSION)
        .about("Architecture traffic simulation and grading engine")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("grade")
                .about("Grade every test case of a submission")
                .arg(submission.clone())
                .arg(config.clone())
                .arg(json.clone()),
        )
        .subcommand(
            Command::new("check")
                .about("Validate the architecture and its required topology")
                .arg(submission.clone())
                .arg(config.clone()),
        )
        .subcommand(
            Command::new("profiles")
                .about("Print the resolved capacity profile of every component")
                .arg(submission)
                .arg(config)
                .arg(json),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    logging::init_tracing(matches.get_flag("log-json"));

    match dispatch(&matches).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}

async fn dispatch(matches: &ArgMatches) -> Result<ExitCode> {
    match matches.subcommand() {
        Some(("grade", args)) => grade(args).await,
        Some(("check", args)) => check(args),
        Some(("profiles", args)) => profiles(args),
        Some((other, _)) => bail!("unknown subcommand `{other}`"),
        None => bail!("a subcommand is required"),
    }
}

async fn grade(args: &ArgMatches) -> Result<ExitCode> {
    let engine = engine(args)?;
    let submission = submission(args)?;
    let report = engine.grade(&submission).await;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check(args: &ArgMatches) -> Result<ExitCode> {
    let engine = engine(args)?;
    let submission = submission(args)?;
    match engine.check(&submission) {
        Ok(graph) => {
            println!(
                "architecture OK: {} components, {} connections, entry `{}`",
                graph.len(),
                graph.connections().len(),
                graph.entry()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            println!("architecture invalid:");
            for reason in error.reasons() {
                println!("  x {reason}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn profiles(args: &ArgMatches) -> Result<ExitCode> {
    let engine = engine(args)?;
    let submission = submission(args)?;
    let graph = submission
        .graph
        .validate()
        .context("architecture graph is invalid")?;
    let profiles = engine
        .resolver()
        .resolve_graph(&graph)
        .context("failed to resolve capacity profiles")?;

    if args.get_flag("json") {
        let map: serde_json::Map<String, serde_json::Value> = profiles
            .iter()
            .map(|(id, profile)| Ok((id.to_string(), serde_json::to_value(profile.as_ref())?)))
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<20} {:<14} {:>12} {:>12} {:>10} {:>7}",
        "component", "kind", "reads/s", "writes/s", "base ms", "shared"
    );
    for (id, profile) in &profiles {
        println!(
            "{:<20} {:<14} {:>12.0} {:>12.0} {:>10.1} {:>7}",
            id.as_str(),
            profile.kind.as_str(),
            profile.max_throughput_reads,
            profile.max_throughput_writes,
            profile.base_latency_ms,
            if profile.shared_pool { "yes" } else { "no" }
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn engine(args: &ArgMatches) -> Result<Engine> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Engine::new(config).context("invalid engine configuration")
}

fn submission(args: &ArgMatches) -> Result<Submission> {
    let path = args
        .get_one::<PathBuf>("submission")
        .context("--submission is required")?;
    read_submission(path)
}

fn read_submission(path: &Path) -> Result<Submission> {
    let input = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
    let submission = if is_yaml {
        serde_yaml::from_str(&input).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&input).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(submission)
}
