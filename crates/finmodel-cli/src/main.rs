mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::three_statement::{ProjectArgs, ValidateArgs};

/// Integrated three-statement financial projections
#[derive(Parser)]
#[command(
    name = "finmodel",
    version,
    about = "Integrated three-statement financial projections",
    long_about = "Project a linked income statement, balance sheet and cash flow statement \
                  from historical actuals and operating assumptions, with decimal precision. \
                  Every balance sheet is reconciled and cross-checked against the cash flow \
                  statement before results are returned."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full projection and print every schedule
    Project(ProjectArgs),
    /// Check a request's assumptions without projecting
    Validate(ValidateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Project(args) => commands::three_statement::run_project(args),
        Commands::Validate(args) => commands::three_statement::run_validate(args),
        Commands::Version => {
            println!("finmodel {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
