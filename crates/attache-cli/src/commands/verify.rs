//! The `attache verify` subcommand.
//!
//! Verifies the signature sidecar of a digest-pinned artifact and writes
//! the signed `body.json` into the output directory.

use std::path::PathBuf;

use attache_probe::{TrustAnchor, Verifier, VerifyConfig};
use attache_seal::{ImageReference, SealError};
use attache_seal::archive::BODY_ENTRY;
use attache_seal::credentials::{CredentialProvider, EnvCredentials};
use attache_seal::layout::LayoutRegistry;
use clap::Args;
use color_eyre::eyre::{Result, WrapErr};

use crate::config::Config;

/// Arguments for `attache verify`.
#[derive(Args)]
pub struct VerifyArgs {
    /// Digest-pinned artifact reference (`repo@sha256:<hex>`).
    pub subject: String,

    /// PEM public key to trust. Falls back to `public_key` in the config.
    #[arg(long, value_name = "PATH")]
    pub public_key: Option<PathBuf>,

    /// Directory backing the local registry.
    #[arg(long, value_name = "DIR")]
    pub registry_root: Option<PathBuf>,

    /// Where to write the verified `body.json`.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

/// Verification only ever reads a public key; the signing key is never
/// consulted.
fn trust_anchor(args_key: Option<PathBuf>, config: &Config) -> Result<TrustAnchor> {
    let path = config.public_key(args_key).ok_or_else(|| {
        SealError::MalformedInput(
            "no public key configured: pass --public-key or set public_key in attache.toml"
                .to_owned(),
        )
    })?;
    Ok(TrustAnchor::from_file(&path)?)
}

/// Execute the verify command.
pub async fn execute(args: VerifyArgs, config: &Config) -> Result<()> {
    let subject: ImageReference = args.subject.parse()?;
    let credentials = EnvCredentials.credentials_for(subject.registry())?;
    let anchor = trust_anchor(args.public_key, config)?;
    let registry = LayoutRegistry::new(config.registry_root(args.registry_root));

    let verifier = Verifier::new(
        registry,
        anchor,
        VerifyConfig {
            credentials,
            workspace_root: None,
        },
    );
    let cancel = super::cancel_on_ctrl_c();
    let verified = verifier
        .verify_until_cancelled(&args.subject, &cancel)
        .await?;

    std::fs::create_dir_all(&args.output_dir)
        .wrap_err_with(|| format!("failed to create {}", args.output_dir.display()))?;
    let body_path = args.output_dir.join(BODY_ENTRY);
    std::fs::write(&body_path, &verified.body)
        .wrap_err_with(|| format!("failed to write {}", body_path.display()))?;

    println!("Verified {} (signature at {})", verified.subject, verified.sidecar);
    println!("Payload written to {}", body_path.display());
    Ok(())
}
