//! Configuration structures for public key lookups.
//!
//! Configuration is assembled from layers. Each [`ConfigLayer`] only carries the fields
//! its source set explicitly; layers are merged so that later sources win, and the result
//! is resolved together with the positional username into an immutable [`LookupConfig`].

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use validator::{Validate, ValidationError};

/// Directory attribute holding a user's SSH public keys.
pub const KEY_ATTRIBUTE: &str = "sshPublicKey";

/// Placeholder in the filter template that is replaced by the username.
pub const USERNAME_PLACEHOLDER: &str = "%s";

/// Default directory server host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default port for plain LDAP.
pub const DEFAULT_PORT: u16 = 389;
/// Default port for LDAP over TLS.
pub const DEFAULT_TLS_PORT: u16 = 636;
/// Default filter template.
pub const DEFAULT_FILTER: &str = "(&(objectClass=posixAccount)(uid=%s))";

/// A partially populated configuration from a single source.
///
/// `None` means "not set by this source".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    /// Directory server hostname or IP address.
    pub host: Option<String>,
    /// Directory server port.
    pub port: Option<u16>,
    /// Search base DN.
    pub base: Option<String>,
    /// Filter template containing one `%s` placeholder.
    pub filter: Option<String>,
    /// Whether to connect over TLS.
    pub use_tls: Option<bool>,
    /// Whether to skip certificate verification.
    pub skip_verify: Option<bool>,
    /// PEM CA certificate used to verify the server.
    pub ca_cert: Option<PathBuf>,
}

impl ConfigLayer {
    /// Creates an empty layer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            host: None,
            port: None,
            base: None,
            filter: None,
            use_tls: None,
            skip_verify: None,
            ca_cert: None,
        }
    }

    /// Sets the host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the search base.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Sets the filter template.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enables or disables TLS.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = Some(use_tls);
        self
    }

    /// Enables or disables skipping certificate verification.
    #[must_use]
    pub const fn with_skip_verify(mut self, skip: bool) -> Self {
        self.skip_verify = Some(skip);
        self
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Merges `overrides` on top of this layer. Fields set in `overrides` win.
    #[must_use]
    pub fn merge(self, overrides: ConfigLayer) -> Self {
        Self {
            host: overrides.host.or(self.host),
            port: overrides.port.or(self.port),
            base: overrides.base.or(self.base),
            filter: overrides.filter.or(self.filter),
            use_tls: overrides.use_tls.or(self.use_tls),
            skip_verify: overrides.skip_verify.or(self.skip_verify),
            ca_cert: overrides.ca_cert.or(self.ca_cert),
        }
    }
}

/// Fully resolved configuration for a single lookup.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct LookupConfig {
    #[validate(length(min = 1, message = "host must not be empty"))]
    host: String,

    #[validate(range(min = 1, message = "port must be between 1 and 65535"))]
    port: u16,

    base: String,

    #[validate(custom(function = "validate_filter_template"))]
    filter: String,

    use_tls: bool,

    skip_verify: bool,

    ca_cert: Option<PathBuf>,

    username: String,
}

fn validate_filter_template(filter: &str) -> std::result::Result<(), ValidationError> {
    if filter.matches(USERNAME_PLACEHOLDER).count() == 1 {
        Ok(())
    } else {
        let mut err = ValidationError::new("filter_placeholder");
        err.message = Some("filter must contain exactly one %s placeholder".into());
        Err(err)
    }
}

impl LookupConfig {
    /// Resolves a merged layer and the positional arguments into a lookup configuration.
    ///
    /// Fields missing from `layer` fall back to the built-in defaults. When no port is
    /// set the default follows the transport: 636 with TLS, 389 without.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the resolved fields fail validation, and
    /// [`Error::Usage`] unless `positional` holds exactly one non-empty username.
    pub fn resolve(layer: ConfigLayer, positional: &[String]) -> Result<Self> {
        let use_tls = layer.use_tls.unwrap_or(false);
        let default_port = if use_tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        };

        let mut config = Self {
            host: layer.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: layer.port.unwrap_or(default_port),
            base: layer.base.unwrap_or_default(),
            filter: layer.filter.unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            use_tls,
            skip_verify: layer.skip_verify.unwrap_or(false),
            ca_cert: layer.ca_cert,
            username: String::new(),
        };

        config.username = match positional {
            [username] if !username.is_empty() => username.clone(),
            [_] => return Err(Error::Usage("username must not be empty".to_string())),
            _ => {
                return Err(Error::Usage(
                    "must specify exactly one username".to_string(),
                ))
            }
        };

        config.validate()?;

        debug!(
            host = %config.host,
            port = config.port,
            base = %config.base,
            filter = %config.filter,
            tls = config.use_tls,
            skip_verify = config.skip_verify,
            username = %config.username,
            "resolved lookup configuration"
        );

        Ok(config)
    }

    /// Returns the directory server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the directory server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the search base DN.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the filter template.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Returns whether the connection uses TLS.
    #[must_use]
    pub const fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Returns whether certificate verification was explicitly disabled.
    #[must_use]
    pub const fn skip_verify(&self) -> bool {
        self.skip_verify
    }

    /// Optional CA certificate path.
    #[must_use]
    pub fn ca_cert(&self) -> Option<&Path> {
        self.ca_cert.as_deref()
    }

    /// Returns the user whose keys are looked up.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn resolve_uses_defaults() {
        let config = LookupConfig::resolve(ConfigLayer::new(), &args(&["jdoe"])).unwrap();
        assert_eq!(config.host(), DEFAULT_HOST);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.base(), "");
        assert_eq!(config.filter(), DEFAULT_FILTER);
        assert!(!config.use_tls());
        assert!(!config.skip_verify());
        assert!(config.ca_cert().is_none());
        assert_eq!(config.username(), "jdoe");
    }

    #[test]
    fn resolve_defaults_tls_port() {
        let layer = ConfigLayer::new().with_tls(true);
        let config = LookupConfig::resolve(layer, &args(&["jdoe"])).unwrap();
        assert_eq!(config.port(), DEFAULT_TLS_PORT);

        let layer = ConfigLayer::new().with_tls(true).with_port(3269);
        let config = LookupConfig::resolve(layer, &args(&["jdoe"])).unwrap();
        assert_eq!(config.port(), 3269);
    }

    #[test]
    fn resolve_requires_exactly_one_username() {
        let err = LookupConfig::resolve(ConfigLayer::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));

        let err = LookupConfig::resolve(ConfigLayer::new(), &args(&["alice", "bob"]))
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));

        let err = LookupConfig::resolve(ConfigLayer::new(), &args(&[""])).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn resolve_rejects_filter_without_placeholder() {
        let layer = ConfigLayer::new().with_filter("(uid=jdoe)");
        let err = LookupConfig::resolve(layer, &args(&["jdoe"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let layer = ConfigLayer::new().with_filter("(|(uid=%s)(mail=%s))");
        let err = LookupConfig::resolve(layer, &args(&["jdoe"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn resolve_rejects_empty_host_and_zero_port() {
        let layer = ConfigLayer::new().with_host("");
        let err = LookupConfig::resolve(layer, &args(&["jdoe"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let layer = ConfigLayer::new().with_port(0);
        let err = LookupConfig::resolve(layer, &args(&["jdoe"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn merge_prefers_overrides() {
        let file = ConfigLayer::new()
            .with_host("ldap.example.com")
            .with_port(389)
            .with_base("dc=example,dc=com")
            .with_tls(true)
            .with_ca_cert("/etc/ssl/ldap-ca.pem");
        let flags = ConfigLayer::new()
            .with_host("10.0.0.5")
            .with_tls(false)
            .with_skip_verify(true);

        let merged = file.merge(flags);
        assert_eq!(merged.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(merged.port, Some(389));
        assert_eq!(merged.base.as_deref(), Some("dc=example,dc=com"));
        assert_eq!(merged.use_tls, Some(false));
        assert_eq!(merged.skip_verify, Some(true));
        assert_eq!(
            merged.ca_cert.as_deref(),
            Some(Path::new("/etc/ssl/ldap-ca.pem"))
        );
        assert!(merged.filter.is_none());
    }
}
