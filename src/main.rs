mod debug_report;

use anyhow::Context as _;
use pcs_engine::{DEFAULT_RULES, Engine, FactsDocument, ProcedureFacts, ReferenceData, RuleSet, TableIndex};
use std::fs::File;
use std::io::{self, BufReader, IsTerminal, Read};
use std::path::{Path, PathBuf};

const LOG_ENV: &str = "PCS_LOG";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let index = match load_tables(&config.tables) {
        Ok(index) => index,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    };

    let engine = match load_engine(&index, config.rules.as_deref()) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    };

    let (source, facts) = match read_facts(config.facts.as_deref()) {
        Ok(read) => read,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let res = engine.resolve_verbose(facts);
    if config.json {
        match serde_json::to_string_pretty(&res) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: failed to serialize resolution: {err}");
                std::process::exit(1);
            }
        }
    } else {
        debug_report::print_run(&source, &res, config.color);
    }
}

struct CliConfig {
    tables: PathBuf,
    rules: Option<PathBuf>,
    facts: Option<PathBuf>,
    json: bool,
    color: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut tables: Option<PathBuf> = None;
    let mut rules: Option<PathBuf> = None;
    let mut facts: Option<PathBuf> = None;
    let mut json = false;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("pcs-engine {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--json" => json = true,
            "--tables" | "-t" => {
                let value = args.next().ok_or_else(|| "error: --tables expects a path".to_string())?;
                tables = Some(PathBuf::from(value));
            }
            "--rules" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --rules expects a path".to_string())?;
                rules = Some(PathBuf::from(value));
            }
            "--" => {
                if let Some(value) = args.next() {
                    set_facts(value, &mut facts)?;
                }
                if let Some(extra) = args.next() {
                    return Err(format!("error: unexpected argument '{extra}'"));
                }
                break;
            }
            _ if arg.starts_with("--tables=") => {
                tables = Some(PathBuf::from(arg.trim_start_matches("--tables=")));
            }
            _ if arg.starts_with("--rules=") => {
                rules = Some(PathBuf::from(arg.trim_start_matches("--rules=")));
            }
            _ if arg.starts_with('-') && arg != "-" => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            // `-` reads stdin explicitly.
            "-" => {}
            _ => set_facts(arg, &mut facts)?,
        }
    }

    let Some(tables) = tables else {
        return Err(format!("error: --tables is required\n\n{}", help_text()));
    };

    Ok(CliConfig { tables, rules, facts, json, color })
}

fn set_facts(value: String, facts: &mut Option<PathBuf>) -> Result<(), String> {
    if facts.is_some() {
        return Err("error: facts file provided multiple times".to_string());
    }
    *facts = Some(PathBuf::from(value));
    Ok(())
}

fn load_tables(path: &Path) -> anyhow::Result<TableIndex> {
    let file = File::open(path).with_context(|| format!("failed to open reference data {}", path.display()))?;
    let data = ReferenceData::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to load reference data {}", path.display()))?;
    TableIndex::build(&data).with_context(|| format!("failed to index reference data {}", path.display()))
}

fn load_engine<'a>(index: &'a TableIndex, rules: Option<&Path>) -> anyhow::Result<Engine<'a>> {
    let Some(path) = rules else {
        return Engine::new(index, &DEFAULT_RULES).context("built-in guideline rules do not fit these tables");
    };
    let file = File::open(path).with_context(|| format!("failed to open rule set {}", path.display()))?;
    let set = RuleSet::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to load rule set {}", path.display()))?;
    Engine::new(index, &set).with_context(|| format!("rule set {} does not fit these tables", path.display()))
}

/// Read the facts document from `path`, or stdin. Returns a label for the
/// report and the facts.
fn read_facts(path: Option<&Path>) -> anyhow::Result<(String, ProcedureFacts)> {
    let (source, doc): (String, FactsDocument) = match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open facts {}", path.display()))?;
            let doc = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse facts {}", path.display()))?;
            (path.display().to_string(), doc)
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).context("failed to read stdin")?;
            if buffer.trim().is_empty() {
                anyhow::bail!("no facts provided\n\n{}", help_text());
            }
            (String::from("<stdin>"), serde_json::from_str(&buffer).context("failed to parse facts from stdin")?)
        }
    };

    let facts = doc.into_facts().with_context(|| format!("invalid facts in {source}"))?;
    Ok((source, facts))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "pcs-engine {version}

Resolve ICD-10-PCS Medical and Surgical codes from procedure facts.

Usage:
  pcs-engine --tables <reference.json> [OPTIONS] [--] [<facts.json>]

Reads the facts document from <facts.json>, or stdin when omitted or '-':
  {{ \"candidates\": [{{\"axis\": \"body_part\", \"value\": \"Gallbladder\", \"origin\": \"ai\"}}],
    \"flags\": [\"converted_to_open\"],
    \"selections\": [{{\"axis\": \"approach\", \"value\": \"Open\"}}] }}

Options:
  -t, --tables <path>        Reference data (tables, keys, aggregation, index). Required.
  -r, --rules <path>         Guideline rule set. Default: built-in rules.
  --json                     Print the resolution as JSON.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}                    Log filter (tracing EnvFilter syntax). Default: warn.

Exit codes:
  0  Resolved (valid, incomplete or invalid outcome).
  1  Reference data or rule set could not be loaded.
  2  Invalid arguments or facts.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}
