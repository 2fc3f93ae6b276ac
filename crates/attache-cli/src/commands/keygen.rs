//! The `attache keygen` subcommand.

use std::path::PathBuf;

use attache_seal::signer::LocalSigner;
use clap::Args;
use color_eyre::eyre::{Result, WrapErr};

use crate::config::Config;

/// Arguments for `attache keygen`.
#[derive(Args)]
pub struct KeygenArgs {
    /// Where to write the PEM signing key (default: config, then
    /// `~/.config/attache/keys/local.pem`). Never overwritten.
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Also write the PEM public key here. Printed to stdout otherwise.
    #[arg(long, value_name = "PATH")]
    pub public_key: Option<PathBuf>,
}

/// Execute the keygen command.
pub fn execute(args: KeygenArgs, config: &Config) -> Result<()> {
    let key_path = config.signing_key(args.key);
    let signer = LocalSigner::generate(&key_path)?;
    let public_pem = signer.public_key_pem();

    eprintln!("Signing key written to {}", key_path.display());
    match args.public_key {
        Some(path) => {
            std::fs::write(&path, &public_pem)
                .wrap_err_with(|| format!("failed to write public key to {}", path.display()))?;
            eprintln!("Public key written to {}", path.display());
        }
        None => print!("{public_pem}"),
    }
    Ok(())
}
