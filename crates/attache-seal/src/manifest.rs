//! Provenance manifests and their canonical serialization.
//!
//! The JSON shape follows the container "simple signing" layout so other
//! implementations can read the payload:
//!
//! ```text
//! {
//!   "Critical": {
//!     "identity": {"docker-reference": "..."},
//!     "image": {"Docker-manifest-digest": "sha256:..."},
//!     "type": "attache builder signature"
//!   },
//!   "Optional": {"builder": "attache 0.1.0", "provenance": {...}}
//! }
//! ```
//!
//! Field order is fixed by the struct definitions and every map is a
//! `BTreeMap`, so the same facts always serialize to the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::digest::Digest;
use crate::error::SealError;
use crate::reference::ImageReference;

/// A signed statement that a build produced a given subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceManifest {
    /// Claims a verifier must understand.
    #[serde(rename = "Critical")]
    pub critical: Critical,
    /// Informational claims.
    #[serde(rename = "Optional", default)]
    pub optional: Optional,
}

impl ProvenanceManifest {
    /// Value of the `type` claim in every manifest this crate produces.
    pub const TYPE: &str = "attache builder signature";

    /// Prefix of the `builder` claim; the builder version follows it.
    pub const BUILDER_NAME: &str = "attache";
}

/// The critical section of a [`ProvenanceManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critical {
    /// What was built.
    pub identity: Identity,
    /// The content hash of what was built.
    pub image: ImageClaim,
    /// Always [`ProvenanceManifest::TYPE`] for manifests built here.
    #[serde(rename = "type")]
    pub kind: String,
}

/// The subject reference a manifest speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject reference as supplied when building.
    #[serde(rename = "docker-reference")]
    pub docker_reference: String,
}

/// The subject digest a manifest speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageClaim {
    /// Algorithm-prefixed digest of the subject (never of the manifest).
    #[serde(rename = "Docker-manifest-digest")]
    pub docker_manifest_digest: String,
}

/// The optional section of a [`ProvenanceManifest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optional {
    /// Builder identity, e.g. `"attache 0.1.0"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    /// Arbitrary provenance facts keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provenance: BTreeMap<String, ProvenanceValue>,
}

/// An opaque, pre-serialized JSON value.
///
/// Both constructors re-encode through `serde_json::Value`, whose object
/// type sorts keys, and emit compact JSON. Equal facts therefore always
/// produce equal bytes regardless of how the caller formatted them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceValue(Box<RawValue>);

impl ProvenanceValue {
    /// Canonicalize any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, SealError> {
        let value = serde_json::to_value(value)?;
        Ok(Self(serde_json::value::to_raw_value(&value)?))
    }

    /// Canonicalize a JSON document.
    pub fn from_json(json: &str) -> Result<Self, SealError> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
            SealError::MalformedInput(format!("provenance value is not valid JSON: {e}"))
        })?;
        Self::from_serialize(&value)
    }

    /// The canonical JSON text.
    pub fn as_json(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for ProvenanceValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_json() == other.as_json()
    }
}

impl Eq for ProvenanceValue {}

/// The bytes that get signed. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload(Box<[u8]>);

impl CanonicalPayload {
    /// Wrap bytes received from elsewhere, e.g. an extracted `body.json`.
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// The payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse the payload back into a manifest.
    pub fn manifest(&self) -> Result<ProvenanceManifest, SealError> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    /// The subject digest the payload claims.
    pub fn claimed_digest(&self) -> Result<Digest, SealError> {
        self.manifest()?
            .critical
            .image
            .docker_manifest_digest
            .parse()
    }
}

/// Builds the canonical payload for one completed unit of work.
///
/// ```
/// use attache_seal::manifest::{PayloadBuilder, ProvenanceValue};
///
/// let digest = "a".repeat(64);
/// let payload = PayloadBuilder::new("registry.example/app:v1", &digest)
///     .unwrap()
///     .builder_version("0.1.0")
///     .detail("steps", ProvenanceValue::from_json(r#"["compile","test"]"#).unwrap())
///     .build()
///     .unwrap();
/// assert!(payload.as_bytes().starts_with(b"{\"Critical\""));
/// ```
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    subject: String,
    reference: ImageReference,
    digest: Digest,
    builder_version: Option<String>,
    provenance: BTreeMap<String, ProvenanceValue>,
}

impl PayloadBuilder {
    /// Start a payload for `subject`, whose content hash is `digest`.
    ///
    /// `digest` may be `<algorithm>:<hex>` or a bare full-length hex
    /// string.
    pub fn new(subject: &str, digest: &str) -> Result<Self, SealError> {
        let reference = subject.parse::<ImageReference>()?;
        let digest = Digest::parse_strict(digest)?;
        Ok(Self {
            subject: subject.to_owned(),
            reference,
            digest,
            builder_version: None,
            provenance: BTreeMap::new(),
        })
    }

    /// The parsed subject reference.
    pub const fn subject(&self) -> &ImageReference {
        &self.reference
    }

    /// The subject digest the payload will claim.
    pub const fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Record the version of the builder that produced the subject.
    #[must_use]
    pub fn builder_version(mut self, version: impl Into<String>) -> Self {
        self.builder_version = Some(version.into());
        self
    }

    /// Attach one provenance fact. A repeated key replaces the earlier value.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: ProvenanceValue) -> Self {
        self.provenance.insert(key.into(), value);
        self
    }

    /// Attach many provenance facts.
    #[must_use]
    pub fn details(mut self, facts: impl IntoIterator<Item = (String, ProvenanceValue)>) -> Self {
        self.provenance.extend(facts);
        self
    }

    /// The manifest this builder describes.
    pub fn manifest(&self) -> ProvenanceManifest {
        ProvenanceManifest {
            critical: Critical {
                identity: Identity {
                    docker_reference: self.subject.clone(),
                },
                image: ImageClaim {
                    docker_manifest_digest: self.digest.to_string(),
                },
                kind: ProvenanceManifest::TYPE.to_owned(),
            },
            optional: Optional {
                builder: self
                    .builder_version
                    .as_ref()
                    .map(|v| format!("{} {v}", ProvenanceManifest::BUILDER_NAME)),
                provenance: self.provenance.clone(),
            },
        }
    }

    /// Serialize to canonical bytes.
    pub fn build(&self) -> Result<CanonicalPayload, SealError> {
        let bytes = serde_json::to_vec(&self.manifest())?;
        tracing::debug!(
            subject = %self.subject,
            digest = %self.digest,
            size = bytes.len(),
            "built provenance payload"
        );
        Ok(CanonicalPayload::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex() -> String {
        Digest::sha256(b"subject").hex().to_owned()
    }

    #[test]
    fn manifest_json_shape() {
        let payload = PayloadBuilder::new("registry.example/app:v1", &digest_hex())
            .expect("valid input")
            .builder_version("0.1.0")
            .detail("taskRun", ProvenanceValue::from_json(r#"{"b":2,"a":1}"#).expect("json"))
            .build()
            .expect("build");

        let expected = format!(
            concat!(
                r#"{{"Critical":{{"identity":{{"docker-reference":"registry.example/app:v1"}},"#,
                r#""image":{{"Docker-manifest-digest":"sha256:{}"}},"#,
                r#""type":"attache builder signature"}},"#,
                r#""Optional":{{"builder":"attache 0.1.0","provenance":{{"taskRun":{{"a":1,"b":2}}}}}}}}"#,
            ),
            digest_hex()
        );
        assert_eq!(String::from_utf8(payload.as_bytes().to_vec()).unwrap(), expected);
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let payload = PayloadBuilder::new("registry.example/app", &digest_hex())
            .expect("valid input")
            .build()
            .expect("build");
        let value: serde_json::Value = serde_json::from_slice(payload.as_bytes()).expect("json");
        assert_eq!(value["Optional"], serde_json::json!({}));
    }

    #[test]
    fn whitespace_and_key_order_do_not_matter() {
        let a = ProvenanceValue::from_json(r#"{ "z": [1, 2], "a": {"y": true, "x": null} }"#)
            .expect("json");
        let b = ProvenanceValue::from_json(r#"{"a":{"x":null,"y":true},"z":[1,2]}"#).expect("json");
        assert_eq!(a, b);
        assert_eq!(a.as_json(), r#"{"a":{"x":null,"y":true},"z":[1,2]}"#);
    }

    #[test]
    fn malformed_subject_rejected() {
        let result = PayloadBuilder::new("Not A Reference", &digest_hex());
        assert!(matches!(result, Err(SealError::MalformedInput(_))));
    }

    #[test]
    fn malformed_digest_rejected() {
        for digest in ["sha256:deadbeef", "md5:abcd", "not-hex", ""] {
            let result = PayloadBuilder::new("registry.example/app", digest);
            assert!(
                matches!(result, Err(SealError::MalformedInput(_))),
                "`{digest}` should be rejected"
            );
        }
    }

    #[test]
    fn malformed_provenance_json_rejected() {
        assert!(ProvenanceValue::from_json("{not json").is_err());
    }

    #[test]
    fn claimed_digest_reads_back() {
        let payload = PayloadBuilder::new("registry.example/app", &digest_hex())
            .expect("valid input")
            .build()
            .expect("build");
        assert_eq!(
            payload.claimed_digest().expect("claimed"),
            Digest::sha256(b"subject")
        );
        assert_eq!(
            payload.manifest().expect("parse").critical.kind,
            ProvenanceManifest::TYPE
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Building twice from the same input yields identical bytes.
            #[test]
            fn build_is_deterministic(
                facts in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
                version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
            ) {
                let make = || {
                    // Insert in reverse to show ordering comes from the map, not the caller.
                    facts.iter().rev().fold(
                        PayloadBuilder::new("registry.example/app:v1", &digest_hex())
                            .expect("valid input")
                            .builder_version(version.clone()),
                        |b, (k, v)| b.detail(k.clone(), ProvenanceValue::from_serialize(v).expect("value")),
                    )
                };
                let first = make().build().expect("build");
                let second = make().build().expect("build");
                prop_assert_eq!(first.as_bytes(), second.as_bytes());
            }
        }
    }
}
