//! `crucible-cli` entry point (§9): a single-binary local-execution mode —
//! table structure + query + input file + input/output format — or, given
//! `--host`, a thin client against a running `crucible-server`'s query
//! listener. Exit code equals the last failed query's error code.

mod build_info;
mod clients;
mod columns;
mod config;
mod errors;
mod format;
mod query;
mod structure;

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;

use clients::RemoteClient;
use config::CliDefaults;
use errors::CliError;
use format::TextFormat;

#[derive(Parser, Debug)]
#[command(name = "crucible-cli", version = build_info::CRUCIBLE_CLI_VERSION, about = "Crucible local-execution and query client")]
struct Args {
    /// Host:port of a running crucible-server query listener. Omit to run
    /// the query against `--file` locally instead.
    #[arg(long)]
    host: Option<String>,

    /// Table structure: "name Type, name Type, ...".
    #[arg(short = 'S', long)]
    structure: Option<String>,

    /// The query to run.
    #[arg(short, long)]
    query: String,

    /// Input data file. Defaults to stdin.
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long)]
    input_format: Option<String>,

    #[arg(long)]
    output_format: Option<String>,

    /// Path to a CLI defaults file, overridable by individual flags.
    #[arg(long, env = "CRUCIBLE_CONFIG")]
    config_file: Option<PathBuf>,

    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn verbosity_to_level(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt().with_max_level(verbosity_to_level(args.verbose)).init();

    match run(args) {
        Ok(()) => {}
        Err(error) => {
            eprintln!("crucible-cli: {error}");
            std::process::exit(if error.code == 0 { 1 } else { error.code });
        }
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let defaults = CliDefaults::load(args.config_file.as_deref())?;

    let structure_text = args
        .structure
        .or(defaults.structure)
        .ok_or_else(|| CliError::new(crucible_errors::Code::SyntaxError.as_i32(), "no table structure given (--structure or the config file)"))?;
    let schema = structure::parse_structure(&structure_text)?;

    let input_format = TextFormat::parse(&args.input_format.or(defaults.input_format).unwrap_or_else(|| "TSV".to_owned()))?;
    let output_format = TextFormat::parse(&args.output_format.or(defaults.output_format).unwrap_or_else(|| "TSV".to_owned()))?;

    if let Some(addr) = &args.host {
        let mut client = RemoteClient::connect(addr)?;
        let blocks = client.run_query(&args.query, &schema)?;
        for block in &blocks {
            println!("{}", format::write_rows(block, output_format)?);
        }
        return Ok(());
    }

    let parsed_query = query::parse(&args.query)?;

    let mut input_text = String::new();
    match &args.file {
        Some(path) => {
            input_text = std::fs::read_to_string(path).map_err(|error| {
                CliError::from(crucible_errors::Error::IoError {
                    code: crucible_errors::Code::CannotReadAllData,
                    message: format!("reading {}: {error}", path.display()),
                })
            })?;
        }
        None => {
            std::io::stdin().read_to_string(&mut input_text).map_err(|error| {
                CliError::from(crucible_errors::Error::IoError {
                    code: crucible_errors::Code::CannotReadAllData,
                    message: format!("reading stdin: {error}"),
                })
            })?;
        }
    }

    let block = format::read_rows(&input_text, &schema, input_format)?;
    let result = query::apply(&parsed_query, &schema, block)?;
    println!("{}", format::write_rows(&result, output_format)?);
    Ok(())
}
