//! CLI entry point for the remote command execution client (§4.E, §6).

mod error;
mod session;
mod signals;

use clap::Parser;

#[derive(Parser)]
#[command(name = "rcmd-client")]
#[command(about = "Remote command execution client")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). Overrides RCMD_LOG_LEVEL.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(0);
        }
    };

    rcmd_observability::init_with_config(rcmd_observability::LogConfig {
        service_name: "client".into(),
        default_level: cli.log_level.unwrap_or_else(|| std::env::var("RCMD_LOG_LEVEL").unwrap_or_else(|_| "info".into())),
        also_stderr: false,
        ..Default::default()
    });

    if let Err(err) = session::run() {
        eprintln!("rcmd-client: {err}");
        std::process::exit(1);
    }
}
