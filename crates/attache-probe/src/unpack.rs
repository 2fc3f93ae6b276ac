//! Extracting `signature` and `body.json` from a pulled sidecar.
//!
//! A pulled sidecar is a `docker save`-style tarball. Exactly one of its
//! entries is a gzipped layer (`*.tar.gz`); that layer is itself a tar
//! archive holding the two signature entries.

use std::io::Read;
use std::path::Path;

use attache_seal::archive::{BODY_ENTRY, SIGNATURE_ENTRY};
use attache_seal::image::LAYER_SUFFIX;
use flate2::read::GzDecoder;

use crate::error::VerificationError;

/// Largest compressed layer accepted from a pulled sidecar.
pub const MAX_LAYER_SIZE: u64 = 16 * 1024 * 1024;

/// Largest decompressed signature archive.
pub const MAX_ARCHIVE_SIZE: u64 = 64 * 1024 * 1024;

/// Largest single `signature` or `body.json` entry.
pub const MAX_ENTRY_SIZE: u64 = 16 * 1024 * 1024;

/// The two entries of a signature archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBundle {
    /// Detached signature bytes.
    pub signature: Vec<u8>,
    /// Canonical payload bytes, exactly as signed.
    pub body: Vec<u8>,
}

impl SignatureBundle {
    /// Write `signature` and `body.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::write(dir.join(SIGNATURE_ENTRY), &self.signature)?;
        std::fs::write(dir.join(BODY_ENTRY), &self.body)
    }
}

/// Read the single compressed layer out of the tarball at `tarball`.
pub fn locate_layer(tarball: &Path) -> Result<Vec<u8>, VerificationError> {
    let file = std::fs::File::open(tarball)?;
    let mut archive = tar::Archive::new(file);
    let entries = archive
        .entries()
        .map_err(|e| extraction("unreadable image tarball", e))?;

    let mut layer: Option<Vec<u8>> = None;
    for entry in entries {
        let mut entry = entry.map_err(|e| extraction("malformed image tarball", e))?;
        let path = entry
            .path()
            .map_err(|e| extraction("malformed entry path", e))?
            .to_string_lossy()
            .into_owned();
        if !path.ends_with(LAYER_SUFFIX) {
            continue;
        }
        if layer.is_some() {
            return Err(VerificationError::Extraction(format!(
                "expected exactly one `*{LAYER_SUFFIX}` layer, found another at `{path}`"
            )));
        }
        layer = Some(read_capped(&mut entry, MAX_LAYER_SIZE, "layer")?);
    }

    layer.ok_or_else(|| {
        VerificationError::Extraction(format!("no `*{LAYER_SUFFIX}` layer in image tarball"))
    })
}

/// Decompress `layer` and pull out its `signature` and `body.json` entries.
///
/// Unknown entries are ignored. A missing or repeated entry is an error, as
/// is anything past the size caps.
pub fn unpack_signature_archive(layer: &[u8]) -> Result<SignatureBundle, VerificationError> {
    let mut archive = tar::Archive::new(GzDecoder::new(layer).take(MAX_ARCHIVE_SIZE));
    let entries = archive
        .entries()
        .map_err(|e| extraction("layer is not a gzipped tar archive", e))?;

    let mut signature = None;
    let mut body = None;
    for entry in entries {
        let mut entry = entry.map_err(|e| extraction("malformed signature archive", e))?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| extraction("malformed entry path", e))?
            .to_string_lossy()
            .into_owned();
        let slot = match path.trim_start_matches("./") {
            SIGNATURE_ENTRY => &mut signature,
            BODY_ENTRY => &mut body,
            other => {
                tracing::trace!(entry = other, "ignoring unexpected archive entry");
                continue;
            }
        };
        if slot.is_some() {
            return Err(VerificationError::Extraction(format!(
                "duplicate `{path}` entry in signature archive"
            )));
        }
        *slot = Some(read_capped(&mut entry, MAX_ENTRY_SIZE, &path)?);
    }

    let missing = |name: &str| {
        VerificationError::Extraction(format!("signature archive has no `{name}` entry"))
    };
    Ok(SignatureBundle {
        signature: signature.ok_or_else(|| missing(SIGNATURE_ENTRY))?,
        body: body.ok_or_else(|| missing(BODY_ENTRY))?,
    })
}

/// Locate, decompress and unpack the sidecar at `tarball`, writing both
/// entries into `workspace`.
pub fn extract_bundle(tarball: &Path, workspace: &Path) -> Result<SignatureBundle, VerificationError> {
    let layer = locate_layer(tarball)?;
    let bundle = unpack_signature_archive(&layer)?;
    bundle.write_to(workspace)?;
    tracing::debug!(
        signature_size = bundle.signature.len(),
        body_size = bundle.body.len(),
        workspace = %workspace.display(),
        "unpacked signature archive"
    );
    Ok(bundle)
}

/// Read all of `reader`, failing once more than `limit` bytes arrive.
fn read_capped(reader: impl Read, limit: u64, what: &str) -> Result<Vec<u8>, VerificationError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| extraction(&format!("truncated `{what}`"), e))?;
    if bytes.len() as u64 > limit {
        return Err(VerificationError::Extraction(format!(
            "`{what}` exceeds {limit} bytes"
        )));
    }
    Ok(bytes)
}

fn extraction(context: &str, e: std::io::Error) -> VerificationError {
    VerificationError::Extraction(format!("{context}: {e}"))
}
