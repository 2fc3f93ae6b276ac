//! Error types for the sign path.

use crate::credentials::CredentialError;
use crate::registry::RegistryError;
use crate::signer::SigningError;

/// Coarse classification shared by every error in the workspace.
///
/// Callers branch on the kind, never on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed reference, digest, or provenance input.
    InputValidation,
    /// Registry rejected or could not obtain credentials.
    CredentialFailure,
    /// Transport to the registry failed.
    NetworkFailure,
    /// The requested artifact or tag does not exist.
    NotFound,
    /// The signing backend was unavailable or declined.
    Signing,
    /// Assembling the signature artifact failed.
    PackagingError,
    /// The resolved subject digest disagreed with what was claimed.
    DigestMismatch,
    /// The pulled sidecar could not be unpacked.
    ExtractionError,
    /// The signature does not match the payload.
    VerificationFailed,
    /// The operation was cancelled before it finished.
    Cancelled,
    /// Local filesystem failure unrelated to the artifact itself.
    Io,
}

impl ErrorKind {
    /// Process exit code used by the CLI for this kind.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InputValidation => 2,
            Self::CredentialFailure => 3,
            Self::NetworkFailure => 4,
            Self::NotFound => 5,
            Self::Signing => 6,
            Self::PackagingError => 7,
            Self::DigestMismatch => 8,
            Self::ExtractionError => 9,
            Self::VerificationFailed => 10,
            Self::Cancelled => 130,
            Self::Io => 1,
        }
    }
}

/// Errors from the sign path.
#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// A reference, digest, or provenance value is not well formed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The signer could not produce a signature.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The signature artifact could not be assembled.
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Credentials could not be resolved.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// The live subject digest disagrees with a claimed digest.
    #[error("digest mismatch for `{subject}`: expected {expected}, resolved {resolved}")]
    DigestMismatch {
        /// The subject reference being signed.
        subject: String,
        /// The digest the caller or payload claimed.
        expected: String,
        /// The digest the registry reported.
        resolved: String,
    },

    /// Failed to serialize or parse the manifest.
    #[error("manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl SealError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput(_) | Self::Serialize(_) => ErrorKind::InputValidation,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Packaging(_) => ErrorKind::PackagingError,
            Self::Registry(e) => e.kind(),
            Self::Credentials(_) => ErrorKind::CredentialFailure,
            Self::DigestMismatch { .. } => ErrorKind::DigestMismatch,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
