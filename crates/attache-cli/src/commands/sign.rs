//! The `attache sign` subcommand.
//!
//! Builds the provenance manifest for an artifact, signs it with the local
//! key, and publishes the sidecar. The publisher re-resolves the artifact,
//! so a `--digest` that no longer matches the registry is refused.

use std::path::PathBuf;

use attache_seal::credentials::{CredentialProvider, EnvCredentials};
use attache_seal::layout::LayoutRegistry;
use attache_seal::signer::{self, LocalSigner};
use attache_seal::{ImageReference, PayloadBuilder, ProvenanceValue, Publisher, SealError};
use clap::Args;
use color_eyre::eyre::Result;

use crate::config::Config;

/// Arguments for `attache sign`.
#[derive(Args)]
pub struct SignArgs {
    /// Artifact reference (`repo:tag` or `repo@sha256:<hex>`).
    pub subject: String,

    /// Digest to claim. Resolved from the registry when omitted.
    #[arg(long, value_name = "DIGEST")]
    pub digest: Option<String>,

    /// Builder version recorded in the manifest.
    #[arg(long, value_name = "VERSION")]
    pub builder_version: Option<String>,

    /// Attach the JSON in FILE as provenance detail KEY (repeatable).
    #[arg(long, value_name = "KEY=FILE", value_parser = parse_provenance_arg)]
    pub provenance: Vec<(String, PathBuf)>,

    /// PEM signing key.
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Directory backing the local registry.
    #[arg(long, value_name = "DIR")]
    pub registry_root: Option<PathBuf>,
}

fn parse_provenance_arg(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((key, file)) if !key.is_empty() && !file.is_empty() => {
            Ok((key.to_owned(), PathBuf::from(file)))
        }
        _ => Err(format!("expected KEY=FILE, got `{s}`")),
    }
}

fn load_provenance(entries: Vec<(String, PathBuf)>) -> Result<Vec<(String, ProvenanceValue)>, SealError> {
    entries
        .into_iter()
        .map(|(key, path)| {
            let json = std::fs::read_to_string(&path).map_err(|e| {
                SealError::MalformedInput(format!(
                    "cannot read provenance `{key}` from {}: {e}",
                    path.display()
                ))
            })?;
            Ok((key, ProvenanceValue::from_json(&json)?))
        })
        .collect()
}

/// Execute the sign command.
pub async fn execute(args: SignArgs, config: &Config) -> Result<()> {
    let subject: ImageReference = args.subject.parse()?;
    let credentials = EnvCredentials.credentials_for(subject.registry())?;
    let publisher = Publisher::new(LayoutRegistry::new(config.registry_root(args.registry_root)));

    let digest = match args.digest {
        Some(digest) => digest,
        None => publisher.resolve(&subject, &credentials).await?.to_string(),
    };

    let builder = PayloadBuilder::new(&args.subject, &digest)?
        .builder_version(config.builder_version(args.builder_version))
        .details(load_provenance(args.provenance)?);

    let signer = LocalSigner::load(&config.signing_key(args.key))?;
    let payload = builder.build()?;
    let signed = signer::sign_payload(&signer, payload).await?;

    let cancel = super::cancel_on_ctrl_c();
    let sidecar = publisher
        .publish_until_cancelled(builder.subject(), &signed, &credentials, &cancel)
        .await?;

    tracing::info!(%subject, %sidecar, "signature published");
    println!("{sidecar}");
    Ok(())
}
