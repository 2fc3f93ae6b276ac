//! Signature checks against a trust anchor.
//!
//! The verifier never looks inside a signature; it hands `body.json` and
//! the signature bytes to a [`SignatureCheck`]. [`TrustAnchor`] is the
//! bundled check, ECDSA P-256 via `aws-lc-rs`.

use std::path::Path;

use attache_seal::signer::{P256_SPKI_HEADER, pem_to_der};
use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1, UnparsedPublicKey};

use crate::error::VerificationError;

/// Decides whether `signature` is valid over `body`.
pub trait SignatureCheck: Send + Sync {
    /// `Ok(())` only if `signature` was produced over exactly `body`.
    fn check(&self, body: &[u8], signature: &[u8]) -> Result<(), VerificationError>;
}

/// An ECDSA P-256 public key that signatures must verify against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    raw_point: Vec<u8>,
}

impl TrustAnchor {
    /// Parse a PEM-encoded P-256 `SubjectPublicKeyInfo`.
    pub fn from_pem(pem: &str) -> Result<Self, VerificationError> {
        let spki_der = pem_to_der(pem)
            .ok_or_else(|| VerificationError::TrustAnchor("invalid PEM public key".to_owned()))?;

        // Only the fixed P-256 SPKI prefix is accepted; the rest is the EC point.
        let Some(raw_point) = spki_der.strip_prefix(P256_SPKI_HEADER.as_slice()) else {
            return Err(VerificationError::TrustAnchor(
                "public key is not an uncompressed P-256 SPKI".to_owned(),
            ));
        };
        if raw_point.is_empty() {
            return Err(VerificationError::TrustAnchor(
                "public key DER too short for SPKI".to_owned(),
            ));
        }

        Ok(Self {
            raw_point: raw_point.to_vec(),
        })
    }

    /// Read and parse a PEM public key file.
    pub fn from_file(path: &Path) -> Result<Self, VerificationError> {
        let pem = std::fs::read_to_string(path).map_err(|e| {
            VerificationError::TrustAnchor(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_pem(&pem)
    }
}

impl SignatureCheck for TrustAnchor {
    fn check(&self, body: &[u8], signature: &[u8]) -> Result<(), VerificationError> {
        if signature.is_empty() {
            return Err(VerificationError::VerificationFailed(
                "empty signature".to_owned(),
            ));
        }

        UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, &self.raw_point)
            .verify(body, signature)
            .map_err(|e| {
                VerificationError::VerificationFailed(format!("ECDSA verification failed: {e}"))
            })
    }
}
