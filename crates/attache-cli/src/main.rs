//! attache CLI: sign, publish and verify provenance sidecars.
//!
//! Every failure exits with a code that identifies its kind, so scripts can
//! tell "not signed" from "signed by someone else" without parsing text.

mod commands;
#[expect(
    unreachable_pub,
    reason = "binary crate — pub inside private module is fine"
)]
mod config;

use std::path::PathBuf;

use attache_probe::VerificationError;
use attache_seal::credentials::CredentialError;
use attache_seal::registry::RegistryError;
use attache_seal::signer::SigningError;
use attache_seal::{ErrorKind, SealError};
use clap::Parser;
use color_eyre::eyre::{Report, Result};

/// attache: signed provenance sidecars for registry artifacts.
///
/// A signature for `repo@sha256:<hex>` lives at `repo:<hex>.sig`, next to
/// the artifact it describes.
#[derive(Parser)]
#[command(name = "attache", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON (for machine consumption).
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (default: `~/.config/attache/attache.toml` if present).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Generate a local ECDSA P-256 signing key.
    Keygen(commands::keygen::KeygenArgs),
    /// Sign an artifact and publish the signature sidecar.
    Sign(commands::sign::SignArgs),
    /// Verify the signature sidecar of a digest-pinned artifact.
    Verify(commands::verify::VerifyArgs),
    /// Print where the signature of a digest-pinned artifact lives.
    Tag(commands::tag::TagArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let result = match config::Config::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Keygen(args) => commands::keygen::execute(args, &config),
            Commands::Sign(args) => commands::sign::execute(args, &config).await,
            Commands::Verify(args) => commands::verify::execute(args, &config).await,
            Commands::Tag(args) => commands::tag::execute(&args),
        },
        Err(e) => Err(e.into()),
    };

    if let Err(report) = result {
        let code = exit_code(&report);
        eprintln!("Error: {report:?}");
        std::process::exit(code);
    }
    Ok(())
}

/// The exit code of the first classified error in `report`'s chain, or 1.
fn exit_code(report: &Report) -> i32 {
    report
        .chain()
        .find_map(classify)
        .map_or(1, ErrorKind::exit_code)
}

fn classify(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    if let Some(e) = error.downcast_ref::<SealError>() {
        Some(e.kind())
    } else if let Some(e) = error.downcast_ref::<VerificationError>() {
        Some(e.kind())
    } else if let Some(e) = error.downcast_ref::<RegistryError>() {
        Some(e.kind())
    } else if let Some(e) = error.downcast_ref::<CredentialError>() {
        Some(e.kind())
    } else if error.downcast_ref::<SigningError>().is_some() {
        Some(ErrorKind::Signing)
    } else if error.downcast_ref::<config::ConfigError>().is_some() {
        Some(ErrorKind::InputValidation)
    } else {
        None
    }
}
