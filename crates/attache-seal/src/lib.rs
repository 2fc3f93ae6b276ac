//! Provenance manifests and their signature sidecars.
//!
//! `attache-seal` covers the sign path: it builds canonical provenance
//! payloads, signs them through a pluggable [`signer::Signer`], packs the
//! detached signature and payload into a single-layer image, and publishes
//! that image under a tag derived from the subject's digest.
//!
//! The address of a sidecar is a pure function of the subject digest:
//!
//! ```text
//! registry.example/app@sha256:<hex>  ->  registry.example/app:<hex>.sig
//! ```

pub mod archive;
pub mod credentials;
pub mod digest;
pub mod error;
pub mod image;
pub mod layout;
pub mod manifest;
pub mod publisher;
pub mod reference;
pub mod registry;
pub mod signer;
pub mod tag;

// Re-export primary types for convenience.
pub use digest::{Algorithm, Digest};
pub use error::{ErrorKind, SealError};
pub use manifest::{CanonicalPayload, PayloadBuilder, ProvenanceManifest, ProvenanceValue};
pub use publisher::Publisher;
pub use reference::ImageReference;
pub use signer::{SignedPayload, Signer};
