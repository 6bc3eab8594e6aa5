mod commands;

use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "git-vault", about = "Encrypted git remote", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv, ...)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up an encrypted remote in the current repository
    Add {
        remote_name: String,
        url: String,
        /// `none` or `nacl:<base64 of a 32-byte key>`
        encryption: String,
    },
    /// Clone from an encrypted remote
    Clone {
        url: String,
        /// `none` or `nacl:<base64 of a 32-byte key>`
        encryption: String,
        destination: Option<String>,
    },
    /// Serve one git request on stdin/stdout (invoked by git, not manually)
    Run { url: String, encryption: String },
}

fn main() {
    let cli = Cli::parse();

    // All diagnostics go to stderr; stdout is the protocol channel.
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Add {
            remote_name,
            url,
            encryption,
        } => commands::add(&remote_name, &url, &encryption),
        Commands::Clone {
            url,
            encryption,
            destination,
        } => commands::clone(&url, &encryption, destination.as_deref()),
        Commands::Run { url, encryption } => commands::run(&url, &encryption),
    };

    if let Err(e) = result {
        tracing::error!("request failed: {e:#}");
        process::exit(1);
    }
}
