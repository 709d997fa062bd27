//! CLI entry point for the remote command execution daemon (§4.D, §6).

mod app;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rcmd-daemon")]
#[command(about = "Remote command execution daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides RCMD_LOG_LEVEL.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Run in the foreground instead of daemonizing
        #[arg(short, long)]
        foreground: bool,
        /// Override the worker pool size (defaults to RCMD_CAPACITY or 8)
        #[arg(long)]
        capacity: Option<u32>,
    },
    /// Stop a running daemon
    Stop,
    /// Report whether a daemon is running
    Status,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(0);
        }
    };

    let result = match cli.command {
        Some(Commands::Start { foreground, capacity }) => app::run_start(foreground, capacity, cli.log_level),
        Some(Commands::Stop) => app::run_stop(),
        Some(Commands::Status) => app::run_status(),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("rcmd-daemon: {err}");
        std::process::exit(1);
    }
}
