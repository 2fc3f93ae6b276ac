//! A registry kept in a local directory.
//!
//! ```text
//! <root>/<registry>/<repository>/
//!   blobs/<algorithm>/<hex>.tar    image tarballs, addressed by image digest
//!   tags/<tag>                     text file holding `<algorithm>:<hex>`
//! ```
//!
//! Every write goes to a temporary file in the target directory first and
//! is renamed into place, so readers never observe a half-written blob or
//! tag. Credentials are accepted and ignored.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::credentials::Credentials;
use crate::digest::Digest;
use crate::image::Image;
use crate::reference::ImageReference;
use crate::registry::{PULLED_TARBALL, Registry, RegistryError};

const DEFAULT_TAG: &str = "latest";

/// A [`Registry`] backed by a directory tree.
///
/// File I/O runs on the blocking pool, so dropping an in-flight request
/// future abandons it at its next await point.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    root: PathBuf,
}

impl LayoutRegistry {
    /// Use `root` as the store. It is created lazily on first push.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Everything for `reference` lives below this directory, which is
    /// always inside `root`.
    fn repository_dir(&self, reference: &ImageReference) -> Result<PathBuf, RegistryError> {
        // `:` never appears in a valid host otherwise, so `_` cannot collide.
        let relative =
            Path::new(&reference.registry().replace(':', "_")).join(reference.repository());
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(RegistryError::network(
                reference,
                format!("`{}` does not name a directory inside the store", relative.display()),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn blob_path(
        &self,
        reference: &ImageReference,
        digest: &Digest,
    ) -> Result<PathBuf, RegistryError> {
        Ok(self
            .repository_dir(reference)?
            .join("blobs")
            .join(digest.algorithm().as_str())
            .join(format!("{}.tar", digest.hex())))
    }

    fn tag_path(&self, reference: &ImageReference, tag: &str) -> Result<PathBuf, RegistryError> {
        Ok(self.repository_dir(reference)?.join("tags").join(tag))
    }

    /// The digest string stored for `reference`, unparsed.
    fn lookup(&self, reference: &ImageReference) -> Result<String, RegistryError> {
        if let Some(digest) = reference.digest() {
            return if self.blob_path(reference, digest)?.is_file() {
                Ok(digest.to_string())
            } else {
                Err(RegistryError::NotFound(reference.to_string()))
            };
        }

        let tag_path = self.tag_path(reference, reference.tag().unwrap_or(DEFAULT_TAG))?;
        match std::fs::read_to_string(&tag_path) {
            Ok(content) => Ok(content.trim().to_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::NotFound(reference.to_string()))
            }
            Err(e) => Err(RegistryError::network(reference, e)),
        }
    }

    fn pull_blocking(
        &self,
        reference: &ImageReference,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        let raw = self.lookup(reference)?;
        let digest = raw.parse::<Digest>().map_err(|e| {
            RegistryError::network(reference, format!("stored digest `{raw}` is corrupt: {e}"))
        })?;
        let dest = dest_dir.join(PULLED_TARBALL);
        std::fs::copy(self.blob_path(reference, &digest)?, &dest)
            .map_err(|e| RegistryError::network(reference, e))?;
        tracing::debug!(%reference, %digest, dest = %dest.display(), "pulled from layout registry");
        Ok(dest)
    }

    fn write_blob(
        &self,
        reference: &ImageReference,
        image: &Image,
    ) -> Result<Digest, RegistryError> {
        let digest = image
            .digest()
            .map_err(|e| RegistryError::network(reference, e))?;

        if let Some(pinned) = reference.digest() {
            if *pinned != digest {
                return Err(RegistryError::network(
                    reference,
                    format!("image digest {digest} does not match pinned digest"),
                ));
            }
        }

        write_atomically(&self.blob_path(reference, &digest)?, |file| {
            image.write_tarball(file, reference).map(|_| ())
        })
        .map_err(|e| RegistryError::network(reference, e))?;
        Ok(digest)
    }

    fn write_tag(&self, reference: &ImageReference, digest: &Digest) -> Result<(), RegistryError> {
        let tag = reference.tag().unwrap_or(DEFAULT_TAG);
        write_atomically(&self.tag_path(reference, tag)?, |file| writeln!(file, "{digest}"))
            .map_err(|e| RegistryError::network(reference, e))
    }

    /// Run `op` against a clone of this store on the blocking pool.
    async fn blocking<T, F>(&self, reference: &ImageReference, op: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: FnOnce(&Self, &ImageReference) -> Result<T, RegistryError> + Send + 'static,
    {
        let store = self.clone();
        let owned = reference.clone();
        tokio::task::spawn_blocking(move || op(&store, &owned))
            .await
            .map_err(|e| RegistryError::network(reference, e))?
    }
}

impl Registry for LayoutRegistry {
    async fn resolve_digest(
        &self,
        reference: &ImageReference,
        credentials: &Credentials,
    ) -> Result<String, RegistryError> {
        tracing::trace!(%reference, ?credentials, "resolving in layout registry");
        self.blocking(reference, Self::lookup).await
    }

    async fn pull(
        &self,
        reference: &ImageReference,
        _credentials: &Credentials,
        dest_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        let dest_dir = dest_dir.to_path_buf();
        self.blocking(reference, move |store, reference| {
            store.pull_blocking(reference, &dest_dir)
        })
        .await
    }

    async fn push(
        &self,
        reference: &ImageReference,
        image: &Image,
        _credentials: &Credentials,
    ) -> Result<(), RegistryError> {
        let image = image.clone();
        let digest = self
            .blocking(reference, move |store, reference| store.write_blob(reference, &image))
            .await?;

        if reference.digest().is_none() {
            let tagged = digest.clone();
            self.blocking(reference, move |store, reference| store.write_tag(reference, &tagged))
                .await?;
        }

        tracing::debug!(%reference, %digest, "pushed to layout registry");
        Ok(())
    }
}

fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
