//! Minimal registry images: gzip layers, a config, and a manifest.
//!
//! Only what a signature sidecar needs. An [`Image`] starts empty (no base
//! layers, no inherited config) and layers are appended to it. Its digest
//! is the SHA-256 of its Docker v2 schema 2 manifest, so two images with
//! the same layers have the same digest.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::digest::Digest;
use crate::reference::ImageReference;

/// Media type of the image manifest.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Media type of the image config blob.
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
/// Media type of a gzip-compressed layer.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// File extension of layer entries in an image tarball.
pub const LAYER_SUFFIX: &str = ".tar.gz";

/// A gzip-compressed filesystem layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    compressed: Vec<u8>,
    digest: Digest,
    diff_id: Digest,
}

impl Layer {
    /// Compress an uncompressed tar archive into a layer.
    pub fn from_tar(tar: &[u8]) -> io::Result<Self> {
        // flate2 leaves the gzip mtime at zero, keeping the blob reproducible.
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(tar)?;
        let compressed = encoder.finish()?;
        Ok(Self {
            digest: Digest::sha256(&compressed),
            diff_id: Digest::sha256(tar),
            compressed,
        })
    }

    /// The compressed blob.
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// Digest of the compressed blob.
    pub const fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Digest of the uncompressed tar.
    pub const fn diff_id(&self) -> &Digest {
        &self.diff_id
    }

    fn file_name(&self) -> String {
        format!("{}{LAYER_SUFFIX}", self.digest.hex())
    }
}

/// An image assembled in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    layers: Vec<Layer>,
}

#[derive(Serialize)]
struct Descriptor<'a> {
    #[serde(rename = "mediaType")]
    media_type: &'a str,
    size: usize,
    digest: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    schema_version: u32,
    media_type: &'a str,
    config: Descriptor<'a>,
    layers: Vec<Descriptor<'a>>,
}

#[derive(Serialize)]
struct ConfigFile<'a> {
    architecture: &'a str,
    os: &'a str,
    rootfs: RootFs,
    config: EmptyConfig,
}

#[derive(Serialize)]
struct RootFs {
    #[serde(rename = "type")]
    kind: &'static str,
    diff_ids: Vec<String>,
}

#[derive(Serialize)]
struct EmptyConfig {}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TarballManifestEntry {
    config: String,
    repo_tags: Vec<String>,
    layers: Vec<String>,
}

impl Image {
    /// An image with no layers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append `layer` on top of the existing ones.
    #[must_use]
    pub fn append_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Layers, bottom first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The serialized config blob.
    pub fn config_bytes(&self) -> io::Result<Vec<u8>> {
        let config = ConfigFile {
            architecture: "",
            os: "",
            rootfs: RootFs {
                kind: "layers",
                diff_ids: self.layers.iter().map(|l| l.diff_id.to_string()).collect(),
            },
            config: EmptyConfig {},
        };
        Ok(serde_json::to_vec(&config)?)
    }

    /// The serialized manifest.
    pub fn manifest_bytes(&self) -> io::Result<Vec<u8>> {
        let config = self.config_bytes()?;
        let manifest = Manifest {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE,
            config: Descriptor {
                media_type: CONFIG_MEDIA_TYPE,
                size: config.len(),
                digest: Digest::sha256(&config).to_string(),
            },
            layers: self
                .layers
                .iter()
                .map(|l| Descriptor {
                    media_type: LAYER_MEDIA_TYPE,
                    size: l.compressed.len(),
                    digest: l.digest.to_string(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec(&manifest)?)
    }

    /// The image digest, i.e. the digest of its manifest.
    pub fn digest(&self) -> io::Result<Digest> {
        Ok(Digest::sha256(&self.manifest_bytes()?))
    }

    /// Write the image as a `docker save`-style tarball tagged `tag`.
    ///
    /// Entries: the config as `sha256:<hex>`, each layer as
    /// `<hex>.tar.gz`, then `manifest.json`.
    pub fn write_tarball<W: Write>(&self, writer: W, tag: &ImageReference) -> io::Result<W> {
        let config = self.config_bytes()?;
        let config_name = Digest::sha256(&config).to_string();

        let mut builder = tar::Builder::new(writer);
        append_file(&mut builder, &config_name, &config)?;
        for layer in &self.layers {
            append_file(&mut builder, &layer.file_name(), &layer.compressed)?;
        }

        let manifest = [TarballManifestEntry {
            config: config_name,
            repo_tags: vec![tag.to_string()],
            layers: self.layers.iter().map(Layer::file_name).collect(),
        }];
        append_file(&mut builder, "manifest.json", &serde_json::to_vec(&manifest)?)?;

        builder.into_inner()
    }
}

fn append_file<W: Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> io::Result<()> {
    let mut header = tar::Header::new_ustar();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn tag() -> ImageReference {
        "registry.example/app:v1".parse().expect("reference")
    }

    #[test]
    fn layer_digests_cover_both_forms() {
        let layer = Layer::from_tar(b"pretend tar").expect("layer");
        assert_eq!(layer.diff_id(), &Digest::sha256(b"pretend tar"));
        assert_eq!(layer.digest(), &Digest::sha256(layer.compressed()));

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(layer.compressed())
            .read_to_end(&mut decoded)
            .expect("gunzip");
        assert_eq!(decoded, b"pretend tar");
    }

    #[test]
    fn digest_is_reproducible() {
        let a = Image::empty().append_layer(Layer::from_tar(b"one").expect("layer"));
        let b = Image::empty().append_layer(Layer::from_tar(b"one").expect("layer"));
        let c = Image::empty().append_layer(Layer::from_tar(b"two").expect("layer"));
        assert_eq!(a.digest().expect("digest"), b.digest().expect("digest"));
        assert_ne!(a.digest().expect("digest"), c.digest().expect("digest"));
    }

    #[test]
    fn empty_image_has_no_layers() {
        let manifest: serde_json::Value =
            serde_json::from_slice(&Image::empty().manifest_bytes().expect("manifest"))
                .expect("json");
        assert_eq!(manifest["layers"], serde_json::json!([]));
        assert_eq!(manifest["schemaVersion"], 2);
    }

    #[test]
    fn tarball_lists_config_layers_and_manifest() {
        let image = Image::empty().append_layer(Layer::from_tar(b"one").expect("layer"));
        let bytes = image.write_tarball(Vec::new(), &tag()).expect("tarball");

        let mut archive = tar::Archive::new(bytes.as_slice());
        let names: Vec<String> = archive
            .entries()
            .expect("entries")
            .map(|e| e.expect("entry").path().expect("path").display().to_string())
            .collect();

        let layer_name = format!("{}.tar.gz", image.layers()[0].digest().hex());
        assert_eq!(names.len(), 3);
        assert!(names[0].starts_with("sha256:"));
        assert_eq!(names[1], layer_name);
        assert_eq!(names[2], "manifest.json");
    }
}
