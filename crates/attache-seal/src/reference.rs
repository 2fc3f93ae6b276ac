//! Registry artifact references: `[registry/]repository[:tag][@digest]`.
//!
//! Follows the Docker naming rules: the first path component names a
//! registry only when it looks like a host (contains `.` or `:`, or is
//! `localhost`). Anything else lives on Docker Hub, and single-component
//! repositories there get the implicit `library/` namespace.

use std::fmt;
use std::str::FromStr;

use crate::digest::Digest;
use crate::error::SealError;

/// Registry used when a reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Longest tag a registry accepts.
pub const MAX_TAG_LEN: usize = 128;

/// A parsed reference to an artifact in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl ImageReference {
    /// Build a tagged reference from already-validated parts.
    pub(crate) fn tagged(registry: &str, repository: &str, tag: String) -> Self {
        Self {
            registry: registry.to_owned(),
            repository: repository.to_owned(),
            tag: Some(tag),
            digest: None,
        }
    }

    /// Registry host, with port if one was given.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path within the registry.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The tag, if the reference has one.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The digest, if the reference pins one.
    pub const fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// The same repository pinned to `digest`, without a tag.
    #[must_use]
    pub fn with_digest(&self, digest: Digest) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest),
        }
    }

    /// `registry/repository`, without tag or digest.
    pub fn context(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

impl FromStr for ImageReference {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| SealError::MalformedInput(format!("reference `{s}`: {reason}"));

        if s.is_empty() {
            return Err(malformed("empty"));
        }

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) => (name, Some(digest.parse::<Digest>()?)),
            None => (s, None),
        };

        // A tag can only follow the last path component; a colon before the
        // last slash is a registry port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_owned()))
            }
            None => (name, None),
        };

        if let Some(tag) = &tag {
            if !is_valid_tag(tag) {
                return Err(malformed("invalid tag"));
            }
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if looks_like_host(first) => (first.to_owned(), rest.to_owned()),
            Some(_) => (DEFAULT_REGISTRY.to_owned(), name.to_owned()),
            None => (DEFAULT_REGISTRY.to_owned(), format!("library/{name}")),
        };

        if !is_valid_registry(&registry) {
            return Err(malformed("invalid registry host"));
        }
        if !repository.split('/').all(is_valid_component) {
            return Err(malformed("invalid repository name"));
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// Dot-separated alphanumeric/hyphen labels, optionally followed by
/// `:<port>`.
fn is_valid_registry(registry: &str) -> bool {
    let (host, port) = match registry.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (registry, None),
    };
    let valid_port =
        port.is_none_or(|p| !p.is_empty() && p.len() <= 5 && p.bytes().all(|b| b.is_ascii_digit()));
    valid_port && !host.is_empty() && host.split('.').all(is_valid_host_label)
}

fn is_valid_host_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Lowercase alphanumerics separated by `.`, `_`, `__`, or runs of `-`.
fn is_valid_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    if !is_lower_alnum(*first) || !is_lower_alnum(*last) {
        return false;
    }

    let mut run = Vec::new();
    for &b in bytes {
        if is_lower_alnum(b) {
            if !is_valid_separator(&run) {
                return false;
            }
            run.clear();
        } else if matches!(b, b'.' | b'_' | b'-') {
            run.push(b);
        } else {
            return false;
        }
    }
    true
}

fn is_valid_separator(run: &[u8]) -> bool {
    matches!(run, [] | [b'.'] | [b'_'] | [b'_', b'_']) || run.iter().all(|&b| b == b'-')
}

const fn is_lower_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn is_valid_tag(tag: &str) -> bool {
    if tag.len() > MAX_TAG_LEN {
        return false;
    }
    let mut chars = tag.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_registry_repository_and_digest() {
        let r: ImageReference = "registry.example/repo@sha256:deadbeef"
            .parse()
            .expect("should parse");
        assert_eq!(r.registry(), "registry.example");
        assert_eq!(r.repository(), "repo");
        assert_eq!(r.tag(), None);
        assert_eq!(r.digest().map(Digest::hex), Some("deadbeef"));
    }

    #[test]
    fn parse_port_is_not_a_tag() {
        let r: ImageReference = "localhost:5000/team/app".parse().expect("should parse");
        assert_eq!(r.registry(), "localhost:5000");
        assert_eq!(r.repository(), "team/app");
        assert_eq!(r.tag(), None);

        let tagged: ImageReference = "localhost:5000/team/app:v1".parse().expect("should parse");
        assert_eq!(tagged.tag(), Some("v1"));
    }

    #[test]
    fn docker_hub_defaults() {
        let r: ImageReference = "alpine:3.20".parse().expect("should parse");
        assert_eq!(r.registry(), DEFAULT_REGISTRY);
        assert_eq!(r.repository(), "library/alpine");
        assert_eq!(r.tag(), Some("3.20"));

        let ns: ImageReference = "team/app".parse().expect("should parse");
        assert_eq!(ns.registry(), DEFAULT_REGISTRY);
        assert_eq!(ns.repository(), "team/app");
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "registry.example/repo@sha256:deadbeef",
            "localhost:5000/team/app:v1",
            "ghcr.io/org/tool:latest@sha256:cafe",
        ] {
            let r: ImageReference = input.parse().expect("should parse");
            assert_eq!(r.to_string(), input);
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for input in [
            "",
            "Registry.example/Repo",
            "registry.example/repo:",
            "registry.example/repo:-bad",
            "registry.example//repo",
            "registry.example/repo--/x",
            "registry.example/re po",
            "registry.example/repo@sha256:XYZ",
            "../escaped:v1",
            "./escaped:v1",
            "registry..example/repo",
            ".registry.example/repo",
            "-bad.example/repo",
            "registry.example:/repo",
            "registry.example:port/repo",
            "localhost:5000:1/repo",
        ] {
            assert!(
                input.parse::<ImageReference>().is_err(),
                "`{input}` should be rejected"
            );
        }
    }

    #[test]
    fn with_digest_drops_tag() {
        let r: ImageReference = "registry.example/repo:latest".parse().expect("should parse");
        let pinned = r.with_digest(Digest::sha256(b"x"));
        assert_eq!(pinned.tag(), None);
        assert!(pinned.to_string().starts_with("registry.example/repo@sha256:"));
    }

    #[test]
    fn tag_length_is_bounded() {
        let longest = format!("registry.example/repo:{}", "a".repeat(MAX_TAG_LEN));
        longest.parse::<ImageReference>().expect("128-character tag is valid");

        let too_long = format!("registry.example/repo:{}", "a".repeat(MAX_TAG_LEN + 1));
        assert!(matches!(
            too_long.parse::<ImageReference>(),
            Err(SealError::MalformedInput(_))
        ));
    }

    #[test]
    fn hosts_with_ports_and_hyphens_parse() {
        for input in ["my-registry.example:443/app", "10.0.0.1:5000/app", "localhost/app"] {
            input.parse::<ImageReference>().expect("should parse");
        }
    }
}
