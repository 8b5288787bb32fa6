//! Command-line front end for `xpathkit`.
//!
//! `xpathkit eval` evaluates an expression (optionally against an XML file) and
//! prints the resulting items; `xpathkit parse` shows how an expression parses.

pub mod commands;
pub mod util;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use util::CliResult;

#[derive(Parser, Debug)]
#[command(name = "xpathkit", version, about = "Evaluate XPath-style expressions")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate an expression and print the resulting items.
    Eval(commands::eval::EvalArgs),
    /// Parse an expression and print its syntax tree.
    Parse(commands::parse::ParseArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = execute(&cli)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

pub fn execute(cli: &Cli) -> CliResult<String> {
    match &cli.command {
        Command::Eval(args) => commands::eval::run(args),
        Command::Parse(args) => commands::parse::run(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init().ok();
}
