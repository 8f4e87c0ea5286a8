mod cli;
mod commands;

use clap::Parser;

fn main() {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if let Err(e) = cli.command.run() {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
