//! Content digests in `<algorithm>:<hex>` form.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256, Sha512};

use crate::error::SealError;

/// A content hash algorithm known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// SHA-256, 64 hex characters.
    Sha256,
    /// SHA-512, 128 hex characters.
    Sha512,
}

impl Algorithm {
    /// The algorithm's name as it appears in a digest string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of a full hex-encoded hash for this algorithm.
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content digest.
///
/// The hex part is always lowercase, so a given hash has exactly one
/// spelling. Parsing accepts any non-empty hex length (short digests show
/// up in references and tests); [`Digest::require_full_length`] enforces
/// the algorithm's real length where it matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// Hash `data` with SHA-256.
    pub fn sha256(data: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            hex: hex::encode(Sha256::digest(data)),
        }
    }

    /// Hash `data` with SHA-512.
    pub fn sha512(data: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::Sha512,
            hex: hex::encode(Sha512::digest(data)),
        }
    }

    /// Build a digest from a bare hex string, inferring the algorithm from
    /// its length.
    pub fn from_hex(hex: &str) -> Result<Self, SealError> {
        let algorithm = [Algorithm::Sha256, Algorithm::Sha512]
            .into_iter()
            .find(|a| a.hex_len() == hex.len())
            .ok_or_else(|| {
                SealError::MalformedInput(format!(
                    "bare digest `{hex}` has {} hex characters, expected 64 or 128",
                    hex.len()
                ))
            })?;
        validate_hex(hex)?;
        Ok(Self {
            algorithm,
            hex: hex.to_owned(),
        })
    }

    /// Parse either `<algorithm>:<hex>` or a bare full-length hex string,
    /// and require the full algorithm length.
    pub fn parse_strict(input: &str) -> Result<Self, SealError> {
        let digest = if input.contains(':') {
            input.parse::<Self>()?
        } else {
            Self::from_hex(input)?
        };
        digest.require_full_length()?;
        Ok(digest)
    }

    /// Fail unless the hex part has the algorithm's full length.
    pub fn require_full_length(&self) -> Result<(), SealError> {
        if self.hex.len() == self.algorithm.hex_len() {
            Ok(())
        } else {
            Err(SealError::MalformedInput(format!(
                "{} digest must have {} hex characters, got {}",
                self.algorithm,
                self.algorithm.hex_len(),
                self.hex.len()
            )))
        }
    }

    /// The hash algorithm.
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The lowercase hex hash, without algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl FromStr for Digest {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, hex)) = s.split_once(':') else {
            return Err(SealError::MalformedInput(format!(
                "digest `{s}` is missing an algorithm prefix"
            )));
        };
        let algorithm = Algorithm::from_name(name).ok_or_else(|| {
            SealError::MalformedInput(format!("unknown digest algorithm `{name}`"))
        })?;
        if hex.len() > algorithm.hex_len() {
            return Err(SealError::MalformedInput(format!(
                "{algorithm} digest is longer than {} hex characters",
                algorithm.hex_len()
            )));
        }
        validate_hex(hex)?;
        Ok(Self {
            algorithm,
            hex: hex.to_owned(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

fn validate_hex(hex: &str) -> Result<(), SealError> {
    if hex.is_empty() {
        return Err(SealError::MalformedInput("empty digest".to_owned()));
    }
    if let Some(bad) = hex
        .chars()
        .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
    {
        return Err(SealError::MalformedInput(format!(
            "digest contains `{bad}`, expected lowercase hex"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_known_value() {
        let digest = Digest::sha256(b"");
        assert_eq!(digest.hex(), EMPTY_SHA256);
        assert_eq!(digest.to_string(), format!("sha256:{EMPTY_SHA256}"));
    }

    #[test]
    fn sha512_has_full_length() {
        let digest = Digest::sha512(b"hello");
        assert_eq!(digest.algorithm(), Algorithm::Sha512);
        digest.require_full_length().expect("full length");
    }

    #[test]
    fn parse_short_digest_is_lenient() {
        let digest: Digest = "sha256:deadbeef".parse().expect("should parse");
        assert_eq!(digest.hex(), "deadbeef");
        assert!(digest.require_full_length().is_err());
    }

    #[test]
    fn parse_rejects_unknown_algorithm() {
        let result = "md5:deadbeef".parse::<Digest>();
        assert!(matches!(result, Err(SealError::MalformedInput(_))));
    }

    #[test]
    fn parse_rejects_uppercase_and_non_hex() {
        assert!("sha256:DEADBEEF".parse::<Digest>().is_err());
        assert!("sha256:xyz".parse::<Digest>().is_err());
        assert!("sha256:".parse::<Digest>().is_err());
        assert!("deadbeef".parse::<Digest>().is_err());
    }

    #[test]
    fn strict_accepts_bare_hex_and_infers_algorithm() {
        let digest = Digest::parse_strict(EMPTY_SHA256).expect("bare sha256");
        assert_eq!(digest.algorithm(), Algorithm::Sha256);

        let prefixed = Digest::parse_strict(&format!("sha256:{EMPTY_SHA256}")).expect("prefixed");
        assert_eq!(digest, prefixed);
    }

    #[test]
    fn strict_rejects_short_digest() {
        assert!(Digest::parse_strict("sha256:deadbeef").is_err());
        assert!(Digest::parse_strict("deadbeef").is_err());
    }
}
