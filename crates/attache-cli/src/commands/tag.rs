//! The `attache tag` subcommand.

use attache_seal::{ImageReference, tag};
use clap::Args;
use color_eyre::eyre::Result;

/// Arguments for `attache tag`.
#[derive(Args)]
pub struct TagArgs {
    /// Digest-pinned artifact reference (`repo@sha256:<hex>`).
    pub subject: String,
}

/// Execute the tag command.
pub fn execute(args: &TagArgs) -> Result<()> {
    let subject: ImageReference = args.subject.parse()?;
    println!("{}", tag::sidecar_for(&subject)?);
    Ok(())
}
