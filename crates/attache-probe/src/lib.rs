//! Verification of provenance sidecars.
//!
//! `attache-probe` walks the mirror image of the sign path. Given a
//! digest-pinned subject it derives the sidecar tag, pulls the sidecar into
//! a scoped temporary workspace, unpacks `signature` and `body.json`, and
//! checks the signature against a trust anchor.
//!
//! The pipeline is linear:
//! 1. **Reference** (parse the subject, derive `<repo>:<hex>.sig`)
//! 2. **Pull** (download the sidecar tarball)
//! 3. **Unpack** (exactly one layer, exactly the two expected entries)
//! 4. **Check** (delegate to a [`check::SignatureCheck`])

pub mod check;
pub mod error;
pub mod unpack;
pub mod verify;

// Re-export primary types for convenience.
pub use check::{SignatureCheck, TrustAnchor};
pub use error::{Stage, VerificationError};
pub use verify::{VerifiedPayload, Verifier, VerifyConfig};
