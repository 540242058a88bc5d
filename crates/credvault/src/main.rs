//! credvault CLI - encrypted, versioned and audited credentials
//!
//! This is the main entry point for the credvault command-line interface.

mod cli;
mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let global = cli.global();
    match cli.command {
        Commands::Keys(cmd) => commands::keys::run(cmd, &global).await,
        Commands::Put(args) => commands::credential::put(args, &global).await,
        Commands::Get(args) => commands::credential::get(args, &global).await,
        Commands::Delete(args) => commands::credential::delete(args, &global).await,
        Commands::Regenerate(args) => commands::credential::regenerate(args, &global).await,
        Commands::Find(args) => commands::find::run(args, &global).await,
        Commands::Acl(cmd) => commands::acl::run(cmd, &global).await,
        Commands::Rotate(args) => commands::rotate::run(args, &global).await,
        Commands::Audit(args) => commands::audit::run(args, &global).await,
    }
}

/// Initialize tracing with appropriate verbosity.
///
/// Logs go to stderr so that stdout carries only command output.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
