//! `fixlab` — FIX gateway test harness CLI.
//!
//! Exit codes: 0 on success/pass, 2 when a comparison run fails, 3 on
//! configuration or environment errors.

mod commands;
mod output;
mod sim_transport;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fixlab", version, about = "FIX log comparison and gateway verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan log files and summarize the FIX messages they hold.
    Scan(commands::scan::ScanArgs),
    /// Discover correlation strategies and cache them.
    Prepare(commands::prepare::PrepareArgs),
    /// Compare expected vs. recorded actual exit logs.
    RunOffline(commands::run_offline::RunOfflineArgs),
    /// Inject entry messages into a live gateway and verify its output.
    RunOnline(commands::run_online::RunOnlineArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Scan(args) => commands::scan::run(args),
        Command::Prepare(args) => commands::prepare::run(args),
        Command::RunOffline(args) => commands::run_offline::run(args),
        Command::RunOnline(args) => commands::run_online::run(args).await,
    };
    std::process::exit(code);
}
