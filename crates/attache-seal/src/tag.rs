//! Deriving where a subject's signature lives.
//!
//! Signer and verifier never talk to each other; they only agree on this
//! naming rule. The tag is the raw hex digest plus `.sig`, with no
//! algorithm prefix.

use crate::error::SealError;
use crate::reference::{ImageReference, MAX_TAG_LEN};

/// Suffix appended to the subject digest to form the sidecar tag.
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// `registry/repository:<digest_hex>.sig`.
///
/// Fails when the tag would exceed the registry tag limit, which a sha512
/// digest does.
pub fn derive(
    registry: &str,
    repository: &str,
    digest_hex: &str,
) -> Result<ImageReference, SealError> {
    let tag = format!("{digest_hex}{SIGNATURE_SUFFIX}");
    if tag.len() > MAX_TAG_LEN {
        return Err(SealError::MalformedInput(format!(
            "signature tag for {registry}/{repository} would be {} characters, \
             limit is {MAX_TAG_LEN}",
            tag.len()
        )));
    }
    Ok(ImageReference::tagged(registry, repository, tag))
}

/// The sidecar reference for a digest-pinned subject reference.
pub fn sidecar_for(subject: &ImageReference) -> Result<ImageReference, SealError> {
    let digest = subject.digest().ok_or_else(|| {
        SealError::MalformedInput(format!("reference `{subject}` does not pin a digest"))
    })?;
    derive(subject.registry(), subject.repository(), digest.hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_from_digest_reference() {
        let subject: ImageReference = "registry.example/repo@sha256:deadbeef"
            .parse()
            .expect("reference");
        let sidecar = sidecar_for(&subject).expect("derive");
        assert_eq!(sidecar.to_string(), "registry.example/repo:deadbeef.sig");
    }

    #[test]
    fn tag_is_ignored_when_digest_present() {
        let subject: ImageReference = "registry.example/repo:v1@sha256:deadbeef"
            .parse()
            .expect("reference");
        let sidecar = sidecar_for(&subject).expect("derive");
        assert_eq!(sidecar.tag(), Some("deadbeef.sig"));
    }

    #[test]
    fn tag_only_reference_is_rejected() {
        let subject: ImageReference = "registry.example/repo:v1".parse().expect("reference");
        assert!(matches!(sidecar_for(&subject), Err(SealError::MalformedInput(_))));
    }

    #[test]
    fn derived_reference_parses_back() {
        let derived = derive("localhost:5000", "team/app", "cafe").expect("derive");
        let reparsed: ImageReference = derived.to_string().parse().expect("reparse");
        assert_eq!(reparsed, derived);
    }

    #[test]
    fn sha512_subject_has_no_valid_sidecar_tag() {
        let subject = ImageReference::tagged("registry.example", "repo", "v1".into())
            .with_digest(crate::Digest::sha512(b"image"));
        let err = sidecar_for(&subject).expect_err("132-character tag");
        assert_eq!(err.kind(), crate::ErrorKind::InputValidation);
    }

    #[test]
    fn sha256_sidecar_tag_fits() {
        let subject = ImageReference::tagged("registry.example", "repo", "v1".into())
            .with_digest(crate::Digest::sha256(b"image"));
        let sidecar = sidecar_for(&subject).expect("derive");
        let reparsed: ImageReference = sidecar.to_string().parse().expect("reparse");
        assert_eq!(reparsed, sidecar);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Same inputs, same reference.
            #[test]
            fn derive_is_pure(hex in "[0-9a-f]{64}") {
                prop_assert_eq!(
                    derive("registry.example", "repo", &hex).ok(),
                    derive("registry.example", "repo", &hex).ok()
                );
            }

            /// Distinct digests never share a sidecar.
            #[test]
            fn distinct_digests_never_collide(a in "[0-9a-f]{64}", b in "[0-9a-f]{64}") {
                prop_assume!(a != b);
                let a = derive("registry.example", "repo", &a).expect("derive");
                let b = derive("registry.example", "repo", &b).expect("derive");
                prop_assert_ne!(a.to_string(), b.to_string());
            }
        }
    }
}
