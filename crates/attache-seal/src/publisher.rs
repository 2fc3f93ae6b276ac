//! Publishing signed payloads as sidecar images.
//!
//! The publisher never derives a sidecar tag from a digest it was handed.
//! It asks the registry for the subject's current digest and refuses to
//! push if the reference or the signed payload claims anything else.

use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::credentials::Credentials;
use crate::digest::Digest;
use crate::error::SealError;
use crate::manifest::PayloadBuilder;
use crate::reference::ImageReference;
use crate::registry::Registry;
use crate::signer::{self, SignedPayload, Signer};
use crate::tag;

/// Pushes signature sidecars to a registry.
#[derive(Debug)]
pub struct Publisher<R> {
    registry: R,
}

impl<R: Registry> Publisher<R> {
    /// Publish through `registry`.
    pub const fn new(registry: R) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// The current digest of `subject`, as a full-length [`Digest`].
    ///
    /// # Errors
    ///
    /// - [`SealError::DigestMismatch`] if the registry answers with an empty,
    ///   malformed, or truncated digest.
    /// - [`SealError::Registry`] if the lookup itself fails.
    pub async fn resolve(
        &self,
        subject: &ImageReference,
        credentials: &Credentials,
    ) -> Result<Digest, SealError> {
        let raw = self.registry.resolve_digest(subject, credentials).await?;
        raw.parse::<Digest>()
            .and_then(|digest| digest.require_full_length().map(|()| digest))
            .map_err(|e| {
                tracing::warn!(
                    %subject,
                    resolved = %raw,
                    error = %e,
                    "registry returned an unusable digest"
                );
                SealError::DigestMismatch {
                    subject: subject.to_string(),
                    expected: "a full-length digest".to_owned(),
                    resolved: raw,
                }
            })
    }

    /// Push `signed` as the sidecar of `subject`, returning the sidecar
    /// reference that was written.
    ///
    /// # Errors
    ///
    /// - [`SealError::DigestMismatch`] if the freshly resolved digest is not
    ///   a full-length digest, or disagrees with the digest pinned in
    ///   `subject` or claimed inside the payload. Nothing is pushed.
    /// - [`SealError::Registry`] for authentication, transport, or lookup
    ///   failures, unretried.
    pub async fn publish(
        &self,
        subject: &ImageReference,
        signed: &SignedPayload,
        credentials: &Credentials,
    ) -> Result<ImageReference, SealError> {
        let resolved = self.resolve(subject, credentials).await?;

        let claimed = signed.payload.claimed_digest()?;
        for expected in subject.digest().into_iter().chain([&claimed]) {
            if *expected != resolved {
                tracing::warn!(
                    %subject,
                    %expected,
                    %resolved,
                    "refusing to publish: subject digest changed or was misreported"
                );
                return Err(SealError::DigestMismatch {
                    subject: subject.to_string(),
                    expected: expected.to_string(),
                    resolved: resolved.to_string(),
                });
            }
        }

        let sidecar = tag::derive(subject.registry(), subject.repository(), resolved.hex())?;
        let image = archive::package(signed)?;

        tracing::info!(%subject, %sidecar, "pushing signature");
        self.registry.push(&sidecar, &image, credentials).await?;
        Ok(sidecar)
    }

    /// [`publish`](Self::publish), abandoned as soon as `cancel` fires.
    pub async fn publish_until_cancelled(
        &self,
        subject: &ImageReference,
        signed: &SignedPayload,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<ImageReference, SealError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(%subject, "publish cancelled");
                Err(SealError::Cancelled)
            }
            result = self.publish(subject, signed, credentials) => result,
        }
    }

    /// Build, sign, and publish in one go.
    pub async fn attach<S: Signer>(
        &self,
        builder: &PayloadBuilder,
        signer: &S,
        credentials: &Credentials,
    ) -> Result<ImageReference, SealError> {
        let payload = builder.build()?;
        let signed = signer::sign_payload(signer, payload).await?;
        self.publish(builder.subject(), &signed, credentials).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::digest::Digest;
    use crate::error::ErrorKind;
    use crate::image::{Image, Layer};
    use crate::layout::LayoutRegistry;
    use crate::manifest::CanonicalPayload;
    use crate::registry::{MemoryRegistry, RegistryError};
    use crate::signer::SigningError;

    struct FixedSigner;

    impl Signer for FixedSigner {
        async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
            Ok(Digest::sha256(payload).hex().as_bytes().to_vec())
        }

        fn description(&self) -> &'static str {
            "fixed test signer"
        }
    }

    struct Seeded {
        publisher: Publisher<MemoryRegistry>,
        tagged: ImageReference,
        digest: Digest,
    }

    fn seeded() -> Seeded {
        let registry = MemoryRegistry::new();
        let tagged: ImageReference = "registry.example/app:v1".parse().expect("reference");
        let subject = Image::empty().append_layer(Layer::from_tar(b"app").expect("layer"));
        let digest = registry.insert(&tagged, subject).expect("insert");
        Seeded {
            publisher: Publisher::new(registry),
            tagged,
            digest,
        }
    }

    async fn signed_for(subject: &ImageReference, digest: &Digest) -> SignedPayload {
        let payload = PayloadBuilder::new(&subject.to_string(), &digest.to_string())
            .expect("valid input")
            .build()
            .expect("build");
        signer::sign_payload(&FixedSigner, payload).await.expect("sign")
    }

    #[tokio::test]
    async fn publishes_under_derived_tag() {
        let s = seeded();
        let signed = signed_for(&s.tagged, &s.digest).await;

        let sidecar = s
            .publisher
            .publish(&s.tagged, &signed, &Credentials::Anonymous)
            .await
            .expect("publish");

        assert_eq!(
            sidecar.to_string(),
            format!("registry.example/app:{}.sig", s.digest.hex())
        );
        assert_eq!(s.publisher.registry().push_count(), 1);
        let stored = s.publisher.registry().get(&sidecar).expect("sidecar stored");
        assert_eq!(stored, archive::package(&signed).expect("package"));
    }

    #[tokio::test]
    async fn stale_payload_digest_is_refused() {
        let s = seeded();
        let stale = Digest::sha256(b"an older build");
        let signed = signed_for(&s.tagged, &stale).await;

        let err = s
            .publisher
            .publish(&s.tagged, &signed, &Credentials::Anonymous)
            .await
            .expect_err("should refuse");

        assert_eq!(err.kind(), ErrorKind::DigestMismatch);
        assert_eq!(s.publisher.registry().push_count(), 0);
    }

    #[tokio::test]
    async fn pinned_reference_must_match_live_digest() {
        let s = seeded();
        // The payload is honest, but the caller pins a digest the tag no longer has.
        let signed = signed_for(&s.tagged, &s.digest).await;
        let pinned: ImageReference = format!("registry.example/app:v1@{}", Digest::sha256(b"other"))
            .parse()
            .expect("reference");

        s.publisher
            .registry()
            .insert(&pinned, Image::empty().append_layer(Layer::from_tar(b"app").expect("layer")))
            .expect("insert");

        let err = s
            .publisher
            .publish(&pinned, &signed, &Credentials::Anonymous)
            .await
            .expect_err("should refuse");
        assert_eq!(err.kind(), ErrorKind::DigestMismatch);
        assert_eq!(s.publisher.registry().push_count(), 0);
    }

    #[tokio::test]
    async fn resigning_overwrites_the_same_tag() {
        let s = seeded();
        let first = signed_for(&s.tagged, &s.digest).await;
        let second = SignedPayload {
            payload: first.payload.clone(),
            signature: b"a different signature".to_vec(),
        };

        let a = s
            .publisher
            .publish(&s.tagged, &first, &Credentials::Anonymous)
            .await
            .expect("first");
        let b = s
            .publisher
            .publish(&s.tagged, &second, &Credentials::Anonymous)
            .await
            .expect("second");

        assert_eq!(a, b);
        assert_eq!(s.publisher.registry().push_count(), 2);
        let stored = s.publisher.registry().get(&b).expect("stored");
        assert_eq!(stored, archive::package(&second).expect("package"));
    }

    #[tokio::test]
    async fn auth_failure_propagates() {
        let registry = MemoryRegistry::with_required_credentials(Credentials::Bearer {
            token: "ci".to_owned(),
        });
        let tagged: ImageReference = "registry.example/app:v1".parse().expect("reference");
        let digest = registry
            .insert(&tagged, Image::empty())
            .expect("insert");
        let publisher = Publisher::new(registry);
        let signed = signed_for(&tagged, &digest).await;

        let err = publisher
            .publish(&tagged, &signed, &Credentials::Anonymous)
            .await
            .expect_err("should fail auth");
        assert_eq!(err.kind(), ErrorKind::CredentialFailure);
    }

    #[tokio::test]
    async fn missing_subject_is_not_found() {
        let publisher = Publisher::new(MemoryRegistry::new());
        let tagged: ImageReference = "registry.example/app:v1".parse().expect("reference");
        let signed = signed_for(&tagged, &Digest::sha256(b"x")).await;

        let err = publisher
            .publish(&tagged, &signed, &Credentials::Anonymous)
            .await
            .expect_err("should be missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn attach_builds_signs_and_pushes() {
        let s = seeded();
        let builder = PayloadBuilder::new(&s.tagged.to_string(), &s.digest.to_string())
            .expect("valid input")
            .builder_version("0.1.0");

        let sidecar = s
            .publisher
            .attach(&builder, &FixedSigner, &Credentials::Anonymous)
            .await
            .expect("attach");
        assert_eq!(sidecar.tag(), Some(format!("{}.sig", s.digest.hex()).as_str()));
    }

    /// A directory registry whose `v1` tag file holds `content`.
    fn layout_with_tag(root: &Path, content: &str) -> (Publisher<LayoutRegistry>, ImageReference) {
        let registry = LayoutRegistry::new(root);
        let tagged: ImageReference = "registry.example/app:v1".parse().expect("reference");
        let tag_file = root.join("registry.example/app/tags/v1");
        std::fs::create_dir_all(tag_file.parent().expect("parent")).expect("mkdir");
        std::fs::write(&tag_file, content).expect("write tag");
        (Publisher::new(registry), tagged)
    }

    #[tokio::test]
    async fn empty_resolved_digest_is_a_mismatch() {
        let root = tempfile::tempdir().expect("tempdir");
        let (publisher, tagged) = layout_with_tag(root.path(), "\n");
        let signed = signed_for(&tagged, &Digest::sha256(b"app")).await;

        let err = publisher
            .publish(&tagged, &signed, &Credentials::Anonymous)
            .await
            .expect_err("nothing to compare against");
        assert_eq!(err.kind(), ErrorKind::DigestMismatch);
        assert!(!root.path().join("registry.example/app/blobs").exists());
    }

    #[tokio::test]
    async fn malformed_resolved_digests_are_mismatches() {
        let full = Digest::sha256(b"app");
        for content in ["sha256:", "garbage", "sha256:deadbeef", "md5:0123"] {
            let root = tempfile::tempdir().expect("tempdir");
            let (publisher, tagged) = layout_with_tag(root.path(), content);
            let signed = signed_for(&tagged, &full).await;

            let err = publisher
                .publish(&tagged, &signed, &Credentials::Anonymous)
                .await
                .expect_err(content);
            assert_eq!(err.kind(), ErrorKind::DigestMismatch, "{content}");
            assert!(!root.path().join("registry.example/app/blobs").exists(), "{content}");
        }
    }

    #[tokio::test]
    async fn sha512_subject_is_refused_before_push() {
        let registry = MemoryRegistry::new();
        let tagged: ImageReference = "registry.example/app:v1".parse().expect("reference");
        let resolved = Digest::sha512(b"app");

        /// Answers every lookup with a fixed digest.
        struct Fixed<'a>(&'a MemoryRegistry, String);

        impl Registry for Fixed<'_> {
            async fn resolve_digest(
                &self,
                _reference: &ImageReference,
                _credentials: &Credentials,
            ) -> Result<String, RegistryError> {
                Ok(self.1.clone())
            }

            async fn pull(
                &self,
                reference: &ImageReference,
                credentials: &Credentials,
                dest_dir: &Path,
            ) -> Result<PathBuf, RegistryError> {
                self.0.pull(reference, credentials, dest_dir).await
            }

            async fn push(
                &self,
                reference: &ImageReference,
                image: &Image,
                credentials: &Credentials,
            ) -> Result<(), RegistryError> {
                self.0.push(reference, image, credentials).await
            }
        }

        let publisher = Publisher::new(Fixed(&registry, resolved.to_string()));
        let signed = signed_for(&tagged, &resolved).await;
        let err = publisher
            .publish(&tagged, &signed, &Credentials::Anonymous)
            .await
            .expect_err("tag would be too long");
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        assert_eq!(registry.push_count(), 0);
    }

    /// A registry whose every call hangs forever.
    struct Stalled;

    impl Registry for Stalled {
        async fn resolve_digest(
            &self,
            _reference: &ImageReference,
            _credentials: &Credentials,
        ) -> Result<String, RegistryError> {
            std::future::pending().await
        }

        async fn pull(
            &self,
            _reference: &ImageReference,
            _credentials: &Credentials,
            _dest_dir: &Path,
        ) -> Result<PathBuf, RegistryError> {
            std::future::pending().await
        }

        async fn push(
            &self,
            _reference: &ImageReference,
            _image: &Image,
            _credentials: &Credentials,
        ) -> Result<(), RegistryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_publish() {
        let publisher = Publisher::new(Stalled);
        let tagged: ImageReference = "registry.example/app:v1".parse().expect("reference");
        let signed = SignedPayload {
            payload: CanonicalPayload::from_bytes(b"{}".to_vec()),
            signature: Vec::new(),
        };

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = publisher
            .publish_until_cancelled(&tagged, &signed, &Credentials::Anonymous, &cancel)
            .await
            .expect_err("cancelled");
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
