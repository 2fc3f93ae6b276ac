//! Packaging a signed payload as a sidecar image.
//!
//! The sidecar is an empty image with exactly one layer. That layer is a
//! tar archive with two entries, always in this order:
//!
//! | entry       | content                     |
//! |-------------|-----------------------------|
//! | `signature` | the detached signature      |
//! | `body.json` | the canonical payload bytes |
//!
//! Both entries carry an explicit size, mode `0o755`, and zero
//! mtime/uid/gid, so verifiers that extract with plain `tar` see the same
//! bytes as ones that parse headers.

use crate::error::SealError;
use crate::image::{Image, Layer};
use crate::signer::SignedPayload;

/// Name of the signature entry.
pub const SIGNATURE_ENTRY: &str = "signature";
/// Name of the payload entry.
pub const BODY_ENTRY: &str = "body.json";
/// Permission bits of both entries.
pub const ENTRY_MODE: u32 = 0o755;

/// Build the two-entry signature archive in memory.
pub fn pack_signature_archive(signature: &[u8], body: &[u8]) -> Result<Vec<u8>, SealError> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [(SIGNATURE_ENTRY, signature), (BODY_ENTRY, body)] {
        let mut header = tar::Header::new_ustar();
        header
            .set_path(name)
            .map_err(|e| SealError::Packaging(format!("invalid entry name `{name}`: {e}")))?;
        header.set_size(data.len() as u64);
        header.set_mode(ENTRY_MODE);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder
            .append(&header, data)
            .map_err(|e| SealError::Packaging(format!("failed to write `{name}`: {e}")))?;
    }
    builder
        .into_inner()
        .map_err(|e| SealError::Packaging(format!("failed to finish archive: {e}")))
}

/// Wrap `signed` as the sole layer of a fresh, empty image.
pub fn package(signed: &SignedPayload) -> Result<Image, SealError> {
    let archive = pack_signature_archive(&signed.signature, signed.payload.as_bytes())?;
    let layer = Layer::from_tar(&archive)
        .map_err(|e| SealError::Packaging(format!("failed to compress layer: {e}")))?;
    tracing::debug!(
        layer_digest = %layer.digest(),
        archive_size = archive.len(),
        "packaged signature layer"
    );
    Ok(Image::empty().append_layer(layer))
}
