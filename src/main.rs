use clap::Parser as _;
use colored::Colorize;
use eyre::Result;

use run_z::app;
use run_z::config::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match app::run(cli).await {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            std::process::exit(err.exit_code());
        }
    }
}
