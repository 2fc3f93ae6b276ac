//! Registry credentials and where they come from.
//!
//! Resolving credentials (cluster secrets, keychains, helpers) is someone
//! else's job; the core only ever sees a [`CredentialProvider`].

use std::fmt;

use crate::error::ErrorKind;

/// Environment variable holding a registry username.
pub const USERNAME_VAR: &str = "ATTACHE_REGISTRY_USERNAME";
/// Environment variable holding a registry password.
pub const PASSWORD_VAR: &str = "ATTACHE_REGISTRY_PASSWORD";
/// Environment variable holding a registry bearer token.
pub const TOKEN_VAR: &str = "ATTACHE_REGISTRY_TOKEN";

/// Authentication material for one registry.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// No authentication.
    #[default]
    Anonymous,
    /// Username and password.
    Basic {
        /// Registry username.
        username: String,
        /// Registry password.
        password: String,
    },
    /// A pre-issued bearer token.
    Bearer {
        /// The token.
        token: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Credentials could not be produced.
#[derive(Debug, thiserror::Error)]
#[error("credentials for `{registry}` unavailable: {reason}")]
pub struct CredentialError {
    /// Registry the credentials were requested for.
    pub registry: String,
    /// What went wrong.
    pub reason: String,
}

impl CredentialError {
    /// Always [`ErrorKind::CredentialFailure`].
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::CredentialFailure
    }
}

/// Supplies registry credentials on demand.
pub trait CredentialProvider: Send + Sync {
    /// Credentials to use against `registry`.
    fn credentials_for(&self, registry: &str) -> Result<Credentials, CredentialError>;
}

/// The same credentials for every registry.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials_for(&self, _registry: &str) -> Result<Credentials, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Credentials from [`USERNAME_VAR`]/[`PASSWORD_VAR`] or [`TOKEN_VAR`].
///
/// With nothing set the registry is accessed anonymously.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn from_lookup(
        registry: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, CredentialError> {
        if let Some(token) = lookup(TOKEN_VAR) {
            return Ok(Credentials::Bearer { token });
        }
        match (lookup(USERNAME_VAR), lookup(PASSWORD_VAR)) {
            (Some(username), Some(password)) => Ok(Credentials::Basic { username, password }),
            (None, None) => Ok(Credentials::Anonymous),
            (Some(_), None) => Err(CredentialError {
                registry: registry.to_owned(),
                reason: format!("{USERNAME_VAR} is set but {PASSWORD_VAR} is not"),
            }),
            (None, Some(_)) => Err(CredentialError {
                registry: registry.to_owned(),
                reason: format!("{PASSWORD_VAR} is set but {USERNAME_VAR} is not"),
            }),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials_for(&self, registry: &str) -> Result<Credentials, CredentialError> {
        Self::from_lookup(registry, |name| std::env::var(name).ok())
    }
}
