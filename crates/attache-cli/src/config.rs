//! Optional `attache.toml` configuration.
//!
//! Resolution order for every setting: command-line flag, then the config
//! file, then a built-in default. The file is read from `--config` when
//! given, otherwise from the XDG config dir (`~/.config/attache/attache.toml`)
//! if it exists.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::Deserialize;

/// Config file name inside the XDG config dir.
const CONFIG_FILE: &str = "attache.toml";

/// Registry root used when neither flag nor file names one.
const DEFAULT_REGISTRY_ROOT: &str = "registry";

static DEFAULT_CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    directories::ProjectDirs::from("dev", "attache", "attache")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
});

/// Errors loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file named by `--config` could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("invalid config {path}: {source}")]
    Invalid {
        /// Path that was parsed.
        path: PathBuf,
        /// Parse error.
        source: toml::de::Error,
    },
}

/// Settings read from `attache.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory backing the local registry.
    pub registry_root: Option<PathBuf>,
    /// PEM signing key used by `sign`.
    pub signing_key: Option<PathBuf>,
    /// PEM public key used by `verify`.
    pub public_key: Option<PathBuf>,
    /// Builder version recorded in signed manifests.
    pub builder_version: Option<String>,
}

impl Config {
    /// Load `explicit`, or the default config file if present.
    ///
    /// A missing default file yields an empty config; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match DEFAULT_CONFIG_PATH.as_deref() {
                Some(path) if path.is_file() => Self::from_file(path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Registry root: flag, then file, then `./registry`.
    pub fn registry_root(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.registry_root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_ROOT))
    }

    /// Signing key: flag, then file, then `<config dir>/keys/local.pem`.
    pub fn signing_key(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.signing_key.clone())
            .unwrap_or_else(attache_seal::signer::default_key_path)
    }

    /// Public key: flag, then file. `None` means "derive from the signing key".
    pub fn public_key(&self, flag: Option<PathBuf>) -> Option<PathBuf> {
        flag.or_else(|| self.public_key.clone())
    }

    /// Builder version: flag, then file, then this binary's version.
    pub fn builder_version(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.builder_version.clone())
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_file_and_file_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            registry_root = "/srv/registry"
            builder_version = "9.9.9"
            "#,
        )
        .expect("parse");

        assert_eq!(
            config.registry_root(Some(PathBuf::from("/flag"))),
            PathBuf::from("/flag")
        );
        assert_eq!(config.registry_root(None), PathBuf::from("/srv/registry"));
        assert_eq!(config.builder_version(None), "9.9.9");
        assert_eq!(config.public_key(None), None);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::default();
        assert_eq!(config.registry_root(None), PathBuf::from("registry"));
        assert_eq!(config.builder_version(None), env!("CARGO_PKG_VERSION"));
        assert!(config.signing_key(None).ends_with("local.pem"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("attache.toml");
        std::fs::write(&path, "registry = \"typo\"\n").expect("write");
        let err = Config::load(Some(&path)).expect_err("should reject");
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/attache.toml"))).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
