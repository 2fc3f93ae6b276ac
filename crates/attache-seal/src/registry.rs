//! The registry capability.
//!
//! This crate is not a registry client. Callers hand in something that can
//! resolve, pull and push; [`MemoryRegistry`] and
//! [`LayoutRegistry`](crate::layout::LayoutRegistry) are the two bundled
//! implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::credentials::Credentials;
use crate::digest::Digest;
use crate::error::ErrorKind;
use crate::image::Image;
use crate::reference::ImageReference;

/// File name a pull writes into its destination directory.
pub const PULLED_TARBALL: &str = "image.tar";

/// Errors reported by a [`Registry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry refused the credentials.
    #[error("registry authentication failed for `{reference}`: {reason}")]
    AuthFailure {
        /// Reference being accessed.
        reference: String,
        /// Registry-supplied reason.
        reason: String,
    },

    /// Transport or storage failure.
    #[error("registry request for `{reference}` failed: {reason}")]
    NetworkFailure {
        /// Reference being accessed.
        reference: String,
        /// What went wrong.
        reason: String,
    },

    /// Nothing is stored under the reference.
    #[error("`{0}` not found in registry")]
    NotFound(String),
}

impl RegistryError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthFailure { .. } => ErrorKind::CredentialFailure,
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub(crate) fn network(reference: &ImageReference, reason: impl std::fmt::Display) -> Self {
        Self::NetworkFailure {
            reference: reference.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Operations the sign and verify paths need from a registry.
///
/// None of these retry; a failure goes straight back to the caller.
#[expect(async_fn_in_trait, reason = "internal trait, all impls are Send")]
pub trait Registry: Send + Sync {
    /// The current digest of whatever `reference` points at, exactly as the
    /// registry reports it (`<algorithm>:<hex>`).
    ///
    /// The string is not validated here; an empty or malformed answer is a
    /// digest mismatch for the caller to report, not a transport failure.
    async fn resolve_digest(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
    ) -> Result<String, RegistryError>;

    /// Download `reference` as an image tarball into `dest_dir`, returning
    /// the tarball's path.
    async fn pull(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError>;

    /// Store `image` under `reference`, replacing whatever was there.
    async fn push(
        &self,
        reference: &ImageReference,
        image: &Image,
        credentials: &Credentials,
    ) -> Result<(), RegistryError>;
}

impl<R: Registry> Registry for &R {
    async fn resolve_digest(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
    ) -> Result<String, RegistryError> {
        (**self).resolve_digest(reference, credentials).await
    }

    async fn pull(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        (**self).pull(reference, credentials, dest_dir).await
    }

    async fn push(
        &self,
        reference: &ImageReference,
        image: &Image,
        credentials: &Credentials,
    ) -> Result<(), RegistryError> {
        (**self).push(reference, image, credentials).await
    }
}

/// An in-process registry, mainly for tests.
///
/// Tags and digests are both lookup keys. Optionally requires specific
/// credentials, and counts successful pushes.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    images: Mutex<HashMap<String, Image>>,
    required: Option<Credentials>,
    pushes: AtomicUsize,
}

impl MemoryRegistry {
    /// An empty registry that accepts any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry that rejects everything but `credentials`.
    pub fn with_required_credentials(credentials: Credentials) -> Self {
        Self {
            required: Some(credentials),
            ..Self::default()
        }
    }

    /// Store `image` under `reference` without going through `push`,
    /// returning its digest.
    pub fn insert(&self, reference: &ImageReference, image: Image) -> std::io::Result<Digest> {
        let digest = image.digest()?;
        let mut images = self.lock();
        images.insert(key(reference), image.clone());
        images.insert(key(&reference.with_digest(digest.clone())), image);
        Ok(digest)
    }

    /// The image stored under `reference`, if any.
    pub fn get(&self, reference: &ImageReference) -> Option<Image> {
        self.lock().get(&key(reference)).cloned()
    }

    /// Number of successful pushes so far.
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Image>> {
        self.images
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn authorize(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
    ) -> Result<(), RegistryError> {
        match &self.required {
            Some(required) if required != credentials => Err(RegistryError::AuthFailure {
                reference: reference.to_string(),
                reason: "credentials rejected".to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn lookup(&self, reference: &ImageReference) -> Result<Image, RegistryError> {
        self.get(reference)
            .ok_or_else(|| RegistryError::NotFound(reference.to_string()))
    }
}

impl Registry for MemoryRegistry {
    async fn resolve_digest(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
    ) -> Result<String, RegistryError> {
        self.authorize(reference, credentials)?;
        let digest = self
            .lookup(reference)?
            .digest()
            .map_err(|e| RegistryError::network(reference, e))?;
        Ok(digest.to_string())
    }

    async fn pull(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        self.authorize(reference, credentials)?;
        let image = self.lookup(reference)?;
        let path = dest_dir.join(PULLED_TARBALL);
        let file = std::fs::File::create(&path).map_err(|e| RegistryError::network(reference, e))?;
        image
            .write_tarball(file, reference)
            .map_err(|e| RegistryError::network(reference, e))?;
        Ok(path)
    }

    async fn push(
        &self,
        reference: &ImageReference,
        image: &Image,
        credentials: &Credentials,
    ) -> Result<(), RegistryError> {
        self.authorize(reference, credentials)?;
        self.insert(reference, image.clone())
            .map_err(|e| RegistryError::network(reference, e))?;
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn key(reference: &ImageReference) -> String {
    match (reference.digest(), reference.tag()) {
        (Some(digest), _) => format!("{}@{digest}", reference.context()),
        (None, Some(tag)) => format!("{}:{tag}", reference.context()),
        (None, None) => format!("{}:latest", reference.context()),
    }
}
