mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::cashflow::{FilterOutliersArgs, TwapArgs};
use commands::ledger::{
    AddLoanArgs, ComputeRateArgs, IngestArgs, ListPendingArgs, ResolveArgs, ShowChangeArgs,
};
use commands::rate::{InputHashArgs, SolveRateArgs};

/// Deterministic DSCR underwriting
#[derive(Parser)]
#[command(
    name = "dscr",
    version,
    about = "Deterministic DSCR underwriting",
    long_about = "Cleans borrower cash flows, solves the loan rate that meets a target \
                  debt-service coverage ratio, and routes rate changes through an \
                  approval ledger. All arithmetic uses 128-bit decimals."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter per-month outliers (MAD or IQR)
    FilterOutliers(FilterOutliersArgs),
    /// Recency-weighted average of monthly NOI
    Twap(TwapArgs),
    /// Solve the rate that meets a target DSCR for given samples
    SolveRate(SolveRateArgs),
    /// Content hash of an evaluation's samples and principal
    InputHash(InputHashArgs),
    /// Register a loan in the ledger
    AddLoan(AddLoanArgs),
    /// Append a batch of borrower cash flows to the ledger
    Ingest(IngestArgs),
    /// Compute a loan's rate and apply it or queue it for approval
    ComputeRate(ComputeRateArgs),
    /// Approve a pending rate change
    Approve(ResolveArgs),
    /// Reject a pending rate change
    Reject(ResolveArgs),
    /// List unresolved rate changes
    ListPending(ListPendingArgs),
    /// Show one rate change
    ShowChange(ShowChangeArgs),
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

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::FilterOutliers(args) => commands::cashflow::run_filter_outliers(args),
        Commands::Twap(args) => commands::cashflow::run_twap(args),
        Commands::SolveRate(args) => commands::rate::run_solve_rate(args),
        Commands::InputHash(args) => commands::rate::run_input_hash(args),
        Commands::AddLoan(args) => commands::ledger::run_add_loan(args),
        Commands::Ingest(args) => commands::ledger::run_ingest(args),
        Commands::ComputeRate(args) => commands::ledger::run_compute_rate(args),
        Commands::Approve(args) => commands::ledger::run_approve(args),
        Commands::Reject(args) => commands::ledger::run_reject(args),
        Commands::ListPending(args) => commands::ledger::run_list_pending(args),
        Commands::ShowChange(args) => commands::ledger::run_show_change(args),
        Commands::Version => {
            println!("dscr {}", env!("CARGO_PKG_VERSION"));
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
