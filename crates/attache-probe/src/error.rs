//! Error types for the verify path.

use std::fmt;

use attache_seal::ErrorKind;
use attache_seal::registry::RegistryError;

/// Where in the verification pipeline a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Parsing the subject and deriving the sidecar reference.
    ReferenceParsed,
    /// Pulling the sidecar into the workspace.
    ArtifactPulled,
    /// Extracting the layer and its two entries.
    ArtifactUnpacked,
    /// Checking the signature.
    SignatureChecked,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReferenceParsed => "reference",
            Self::ArtifactPulled => "pull",
            Self::ArtifactUnpacked => "unpack",
            Self::SignatureChecked => "signature",
        })
    }
}

/// Errors from the verify path.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The subject reference is malformed or pins no digest.
    #[error("invalid subject reference: {0}")]
    InvalidReference(#[source] attache_seal::SealError),

    /// No sidecar exists for the subject.
    #[error("no signature found at `{0}`")]
    NotFound(String),

    /// The registry could not be reached or refused access.
    #[error(transparent)]
    Registry(RegistryError),

    /// The local scratch workspace could not be created or written. Says
    /// nothing about the sidecar.
    #[error("local workspace I/O error: {0}")]
    Workspace(#[from] std::io::Error),

    /// The sidecar is not a well-formed signature artifact.
    #[error("cannot extract signature artifact: {0}")]
    Extraction(String),

    /// The trust anchor could not be loaded.
    #[error("invalid trust anchor: {0}")]
    TrustAnchor(String),

    /// The signature does not match `body.json`.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// The run was cancelled.
    #[error("verification cancelled")]
    Cancelled,
}

impl VerificationError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference(_) | Self::TrustAnchor(_) => ErrorKind::InputValidation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Registry(e) => e.kind(),
            Self::Workspace(_) => ErrorKind::Io,
            Self::Extraction(_) => ErrorKind::ExtractionError,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The pipeline stage this error is raised in.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::InvalidReference(_) => Stage::ReferenceParsed,
            Self::NotFound(_) | Self::Registry(_) | Self::Cancelled => Stage::ArtifactPulled,
            Self::Workspace(_) | Self::Extraction(_) => Stage::ArtifactUnpacked,
            Self::TrustAnchor(_) | Self::VerificationFailed(_) => Stage::SignatureChecked,
        }
    }
}

impl From<RegistryError> for VerificationError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(reference) => Self::NotFound(reference),
            other => Self::Registry(other),
        }
    }
}
