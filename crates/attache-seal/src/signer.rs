//! Detached signatures over canonical payloads.
//!
//! The [`Signer`] trait is the only thing the sign path knows about
//! cryptography: bytes in, opaque signature bytes out. [`LocalSigner`] is
//! the bundled backend, ECDSA P-256 over `aws-lc-rs` with ASN.1 DER
//! signatures.

use std::path::Path;

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};
use base64::Engine;

use crate::digest::Digest;
use crate::manifest::CanonicalPayload;

/// Why a signer could not produce a signature.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// Key material (or its passphrase) is inaccessible.
    #[error("signing key unavailable: {0}")]
    Unavailable(String),

    /// The backend refused to sign.
    #[error("signing rejected: {0}")]
    Rejected(String),
}

/// A backend that produces detached signatures.
///
/// Implementations must not keep the payload past the call, and must not
/// retry; the caller owns retry policy.
///
/// `async fn` in traits is stable in Rust 2024, so there is no
/// `async-trait` crate here.
#[expect(async_fn_in_trait, reason = "internal trait, all impls are Send")]
pub trait Signer: Send + Sync {
    /// Sign `payload` and return the raw signature.
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError>;

    /// A human-readable description of this signing backend.
    fn description(&self) -> &'static str;
}

/// A canonical payload together with its detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// The signed bytes; becomes `body.json` in the sidecar.
    pub payload: CanonicalPayload,
    /// Opaque signature bytes; becomes `signature` in the sidecar.
    pub signature: Vec<u8>,
}

/// Sign `payload` with `signer`.
pub async fn sign_payload<S: Signer + ?Sized>(
    signer: &S,
    payload: CanonicalPayload,
) -> Result<SignedPayload, SigningError> {
    let signature = signer.sign(payload.as_bytes()).await?;
    tracing::info!(
        backend = signer.description(),
        payload_digest = %Digest::sha256(payload.as_bytes()),
        "signed provenance payload"
    );
    Ok(SignedPayload { payload, signature })
}

/// Local ECDSA P-256 signer backed by `aws-lc-rs`.
///
/// The key lives on disk as PEM-wrapped PKCS#8 DER, mode `0o600`.
pub struct LocalSigner {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl LocalSigner {
    /// Load an existing key from `key_path`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Unavailable`] if the file is missing,
    /// unreadable, or not a P-256 PKCS#8 key.
    pub fn load(key_path: &Path) -> Result<Self, SigningError> {
        let pem = std::fs::read_to_string(key_path).map_err(|e| {
            SigningError::Unavailable(format!(
                "failed to read key file {}: {e}",
                key_path.display()
            ))
        })?;

        let der = pem_to_der(&pem)
            .ok_or_else(|| SigningError::Unavailable("invalid PEM format".to_owned()))?;

        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &der)
            .map_err(|e| SigningError::Unavailable(format!("failed to parse PKCS#8 key: {e}")))?;

        tracing::info!(path = %key_path.display(), "loaded signing key");
        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// Generate a new key and write it to `key_path`, creating parent
    /// directories. An existing file is never overwritten.
    pub fn generate(key_path: &Path) -> Result<Self, SigningError> {
        if key_path.exists() {
            return Err(SigningError::Rejected(format!(
                "refusing to overwrite existing key {}",
                key_path.display()
            )));
        }

        let rng = SystemRandom::new();
        let pkcs8_doc = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| SigningError::Unavailable(format!("failed to generate key: {e}")))?;

        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SigningError::Unavailable(format!(
                    "failed to create key directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let pem = der_to_pem(pkcs8_doc.as_ref(), "PRIVATE KEY");
        std::fs::write(key_path, pem.as_bytes())
            .map_err(|e| SigningError::Unavailable(format!("failed to write key file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(key_path, perms).map_err(|e| {
                SigningError::Unavailable(format!("failed to set key file permissions: {e}"))
            })?;
        }

        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8_doc.as_ref())
            .map_err(|e| SigningError::Unavailable(format!("failed to load generated key: {e}")))?;

        tracing::info!(path = %key_path.display(), "generated new signing key");
        Ok(Self { key_pair, rng })
    }

    /// The public key as PEM-encoded SPKI, suitable as a trust anchor.
    pub fn public_key_pem(&self) -> String {
        let spki_der = encode_p256_spki(self.key_pair.public_key().as_ref());
        der_to_pem(&spki_der, "PUBLIC KEY")
    }
}

impl Signer for LocalSigner {
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        let sig = self
            .key_pair
            .sign(&self.rng, payload)
            .map_err(|e| SigningError::Rejected(format!("ECDSA sign failed: {e}")))?;
        Ok(sig.as_ref().to_vec())
    }

    fn description(&self) -> &'static str {
        "local ECDSA P-256 (aws-lc)"
    }
}

/// Default key path: `<config dir>/keys/local.pem`.
pub fn default_key_path() -> std::path::PathBuf {
    directories::ProjectDirs::from("dev", "attache", "attache").map_or_else(
        || {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
            std::path::PathBuf::from(home).join(".config/attache/keys/local.pem")
        },
        |dirs| dirs.config_dir().join("keys/local.pem"),
    )
}

// ── key encoding ─────────────────────────────────────────────────────

/// Raw DER bytes per base64 line; 48 bytes encode to exactly 64 characters.
const PEM_LINE_BYTES: usize = 48;

/// `-----BEGIN <label>-----` armor around `der`, base64 at 64 columns.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let engine = &base64::engine::general_purpose::STANDARD;
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in der.chunks(PEM_LINE_BYTES) {
        engine.encode_string(line, &mut pem);
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

/// The DER body of the first armored block in `pem`, whatever its label.
///
/// `None` when there is no block, the block is empty, or the body is not
/// valid base64.
pub fn pem_to_der(pem: &str) -> Option<Vec<u8>> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with("-----BEGIN "))
        .skip(1)
        .take_while(|line| !line.starts_with("-----END "))
        .collect();
    if body.is_empty() {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(body).ok()
}

/// Prefix `point` (an uncompressed P-256 point, `0x04 || X || Y`) with
/// [`P256_SPKI_HEADER`], giving `SubjectPublicKeyInfo` DER.
pub fn encode_p256_spki(point: &[u8]) -> Vec<u8> {
    [P256_SPKI_HEADER.as_slice(), point].concat()
}

/// DER prefix shared by every `SubjectPublicKeyInfo` for an uncompressed
/// P-256 point: algorithm `id-ecPublicKey` on curve `prime256v1`, then the
/// header of the 66-byte bit string holding the point.
#[rustfmt::skip]
pub const P256_SPKI_HEADER: [u8; 26] = [
    // outer SEQUENCE, 0x59 = 89 content bytes
    0x30, 0x59,
    // AlgorithmIdentifier SEQUENCE, 19 content bytes
    0x30, 0x13,
    // id-ecPublicKey
    0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01,
    // prime256v1
    0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07,
    // BIT STRING, 66 bytes, no unused bits
    0x03, 0x42, 0x00,
];
