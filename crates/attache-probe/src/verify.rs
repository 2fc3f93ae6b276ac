//! The verification state machine.
//!
//! ```text
//! ReferenceParsed -> ArtifactPulled -> ArtifactUnpacked -> SignatureChecked
//! ```
//!
//! Any stage can fail; the error carries the stage it was raised in (see
//! [`VerificationError::stage`]). The pulled artifact lives in a scoped
//! [`tempfile::TempDir`] that is removed on every exit path, including a
//! dropped or cancelled future.

use std::path::PathBuf;

use attache_seal::ImageReference;
use attache_seal::credentials::Credentials;
use attache_seal::registry::Registry;
use attache_seal::tag;
use tokio_util::sync::CancellationToken;

use crate::check::SignatureCheck;
use crate::error::{Stage, VerificationError};
use crate::unpack;

/// Configuration for a verification run.
#[derive(Debug, Default)]
pub struct VerifyConfig {
    /// Credentials presented when pulling the sidecar.
    pub credentials: Credentials,
    /// Directory the temporary workspace is created in. Defaults to the
    /// system temp dir.
    pub workspace_root: Option<PathBuf>,
}

/// A sidecar whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    /// The digest-pinned subject that was verified.
    pub subject: ImageReference,
    /// Where the signature was found.
    pub sidecar: ImageReference,
    /// `body.json`, byte for byte as signed.
    pub body: Vec<u8>,
    /// The detached signature.
    pub signature: Vec<u8>,
}

/// Pulls and checks signature sidecars.
#[derive(Debug)]
pub struct Verifier<R, C> {
    registry: R,
    check: C,
    config: VerifyConfig,
}

impl<R: Registry, C: SignatureCheck> Verifier<R, C> {
    /// Create a verifier over `registry` trusting `check`.
    pub const fn new(registry: R, check: C, config: VerifyConfig) -> Self {
        Self {
            registry,
            check,
            config,
        }
    }

    /// Verify the sidecar of `subject`, which must pin a digest.
    ///
    /// The digest in `subject` is taken as given; it is not re-resolved.
    pub async fn verify(&self, subject: &str) -> Result<VerifiedPayload, VerificationError> {
        let result = self.run(subject).await;
        match &result {
            Ok(verified) => {
                tracing::info!(subject = %verified.subject, sidecar = %verified.sidecar, "signature verified");
            }
            Err(e) => {
                tracing::warn!(%subject, stage = %e.stage(), error = %e, "verification failed");
            }
        }
        result
    }

    /// [`verify`](Self::verify), abandoned as soon as `cancel` fires.
    pub async fn verify_until_cancelled(
        &self,
        subject: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifiedPayload, VerificationError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(%subject, "verification cancelled");
                Err(VerificationError::Cancelled)
            }
            result = self.verify(subject) => result,
        }
    }

    async fn run(&self, subject: &str) -> Result<VerifiedPayload, VerificationError> {
        let subject: ImageReference = subject
            .parse()
            .map_err(VerificationError::InvalidReference)?;
        let sidecar = tag::sidecar_for(&subject).map_err(VerificationError::InvalidReference)?;
        tracing::debug!(stage = %Stage::ReferenceParsed, %subject, %sidecar);

        let workspace = match &self.config.workspace_root {
            Some(root) => tempfile::Builder::new().prefix("attache-").tempdir_in(root)?,
            None => tempfile::Builder::new().prefix("attache-").tempdir()?,
        };

        let tarball = self
            .registry
            .pull(&sidecar, &self.config.credentials, workspace.path())
            .await?;
        tracing::debug!(stage = %Stage::ArtifactPulled, tarball = %tarball.display());

        // The blocking task owns the workspace until extraction ends, so a
        // cancelled run still removes it once the task finishes.
        let (_workspace, bundle) = tokio::task::spawn_blocking(move || {
            let bundle = unpack::extract_bundle(&tarball, workspace.path());
            (workspace, bundle)
        })
        .await
        .map_err(|e| VerificationError::Extraction(format!("extraction task failed: {e}")))?;
        let bundle = bundle?;
        tracing::debug!(stage = %Stage::ArtifactUnpacked);

        self.check.check(&bundle.body, &bundle.signature)?;
        tracing::debug!(stage = %Stage::SignatureChecked, body_size = bundle.body.len());

        Ok(VerifiedPayload {
            subject,
            sidecar,
            body: bundle.body,
            signature: bundle.signature,
        })
    }
}
