//! Reader for `nslcd.conf`-style configuration files.
//!
//! Only the directives that describe how to reach and query the directory are
//! interpreted. Everything else in the file is ignored, so the tool can share the
//! configuration already deployed for `nslcd`.

use crate::config::{ConfigLayer, DEFAULT_HOST, USERNAME_PLACEHOLDER};
use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::{Host, Url};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nslcd.conf";

const MAP_NAMES: &[&str] = &[
    "aliases",
    "ethers",
    "group",
    "hosts",
    "netgroup",
    "networks",
    "passwd",
    "protocols",
    "rpc",
    "services",
    "shadow",
];

/// Reads the configuration file at `path` if it exists.
///
/// A missing file yields an empty layer.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or contains an
/// invalid directive.
pub fn read_optional(path: &Path) -> Result<ConfigLayer> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            debug!("Reading configuration from {}", path.display());
            parse(&contents, &path.display().to_string())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("No configuration file at {}", path.display());
            Ok(ConfigLayer::new())
        }
        Err(err) => Err(Error::Config(format!(
            "failed to read {}: {err}",
            path.display()
        ))),
    }
}

/// Parses configuration file contents. `origin` names the source in error messages.
///
/// # Errors
///
/// Returns [`Error::Config`] for a directive with a missing or invalid value.
pub fn parse(contents: &str, origin: &str) -> Result<ConfigLayer> {
    let mut layer = ConfigLayer::new();
    let mut uri_tls = None;
    let mut ssl_tls = None;
    let mut base = None;
    let mut passwd_base = None;

    for (index, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line_no = index + 1;
        let (keyword, value) = match line.split_once(char::is_whitespace) {
            Some((keyword, value)) => (keyword.to_ascii_lowercase(), value.trim()),
            None => (line.to_ascii_lowercase(), ""),
        };
        let invalid = |message: String| Error::Config(format!("{origin}:{line_no}: {message}"));

        match keyword.as_str() {
            "uri" | "base" | "filter" | "ssl" | "tls_reqcert" | "tls_cacertfile"
                if value.is_empty() =>
            {
                return Err(invalid(format!("missing value for `{keyword}`")));
            }
            "uri" => {
                if uri_tls.is_some() {
                    continue;
                }
                for candidate in value.split_whitespace() {
                    match parse_uri(candidate) {
                        Some((host, port, tls)) => {
                            layer.host = Some(host);
                            layer.port = port;
                            uri_tls = Some(tls);
                            break;
                        }
                        None => warn!("{origin}:{line_no}: skipping unsupported uri `{candidate}`"),
                    }
                }
            }
            "base" => match split_map(value) {
                (Some(map), dn) if map.eq_ignore_ascii_case("passwd") => {
                    passwd_base = Some(dn.to_string());
                }
                (Some(map), _) => debug!("{origin}:{line_no}: ignoring base for map `{map}`"),
                (None, dn) => base = Some(dn.to_string()),
            },
            "filter" => match split_map(value) {
                (Some(map), filter) if map.eq_ignore_ascii_case("passwd") && !filter.is_empty() => {
                    layer.filter = Some(format!("(&{filter}(uid={USERNAME_PLACEHOLDER}))"));
                }
                (Some(map), _) if !map.eq_ignore_ascii_case("passwd") => {
                    debug!("{origin}:{line_no}: ignoring filter for map `{map}`");
                }
                _ => return Err(invalid(format!("invalid filter directive `{value}`"))),
            },
            "ssl" => {
                ssl_tls = Some(match value.to_ascii_lowercase().as_str() {
                    "on" | "yes" | "true" => true,
                    "off" | "no" | "false" => false,
                    "start_tls" => {
                        return Err(invalid("`ssl start_tls` is not supported".to_string()))
                    }
                    other => return Err(invalid(format!("invalid ssl value `{other}`"))),
                });
            }
            "tls_reqcert" => {
                layer.skip_verify = Some(match value.to_ascii_lowercase().as_str() {
                    "never" | "allow" => true,
                    "try" | "demand" | "hard" => false,
                    other => return Err(invalid(format!("invalid tls_reqcert value `{other}`"))),
                });
            }
            "tls_cacertfile" => layer.ca_cert = Some(PathBuf::from(value)),
            other => debug!("{origin}:{line_no}: ignoring directive `{other}`"),
        }
    }

    layer.use_tls = ssl_tls.or(uri_tls);
    layer.base = passwd_base.or(base);
    Ok(layer)
}

/// Splits an optional leading map name off a directive value.
fn split_map(value: &str) -> (Option<&str>, &str) {
    if let Some((first, rest)) = value.split_once(char::is_whitespace) {
        if MAP_NAMES.iter().any(|map| map.eq_ignore_ascii_case(first)) {
            return (Some(first), rest.trim());
        }
    }
    if MAP_NAMES.iter().any(|map| map.eq_ignore_ascii_case(value)) {
        return (Some(value), "");
    }
    (None, value)
}

/// Extracts host, explicit port and TLS flag from an `ldap://` or `ldaps://` URI.
fn parse_uri(candidate: &str) -> Option<(String, Option<u16>, bool)> {
    let url = Url::parse(candidate).ok()?;
    let tls = match url.scheme() {
        "ldap" => false,
        "ldaps" => true,
        _ => return None,
    };
    // `ldap:///` names the default host.
    let host = match url.host() {
        None => DEFAULT_HOST.to_string(),
        Some(Host::Domain("")) => DEFAULT_HOST.to_string(),
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
    };
    Some((host, url.port(), tls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_typical_file() {
        let contents = "\
# /etc/nslcd.conf
uid nslcd
gid nslcd

uri ldaps://ldap.example.com:1636/
base dc=example,dc=com
base group ou=Groups,dc=example,dc=com
tls_reqcert demand
tls_cacertfile /etc/ssl/certs/ldap-ca.pem
";
        let layer = parse(contents, "nslcd.conf").unwrap();
        assert_eq!(layer.host.as_deref(), Some("ldap.example.com"));
        assert_eq!(layer.port, Some(1636));
        assert_eq!(layer.use_tls, Some(true));
        assert_eq!(layer.skip_verify, Some(false));
        assert_eq!(layer.base.as_deref(), Some("dc=example,dc=com"));
        assert_eq!(
            layer.ca_cert.as_deref(),
            Some(Path::new("/etc/ssl/certs/ldap-ca.pem"))
        );
        assert!(layer.filter.is_none());
    }

    #[test]
    fn first_usable_uri_wins() {
        let contents = "\
uri ldapi:///var/run/slapd.sock ldap://10.1.2.3/
uri ldaps://backup.example.com/
";
        let layer = parse(contents, "nslcd.conf").unwrap();
        assert_eq!(layer.host.as_deref(), Some("10.1.2.3"));
        assert_eq!(layer.port, None);
        assert_eq!(layer.use_tls, Some(false));
    }

    #[test]
    fn empty_uri_host_means_default_host() {
        let plain = parse("uri ldap:///", "nslcd.conf").unwrap();
        assert_eq!(plain.host.as_deref(), Some("localhost"));
        assert_eq!(plain.port, None);
        assert_eq!(plain.use_tls, Some(false));

        let tls = parse("uri ldaps:/// ldap://backup.example.com/", "nslcd.conf").unwrap();
        assert_eq!(tls.host.as_deref(), Some("localhost"));
        assert_eq!(tls.use_tls, Some(true));
    }

    #[test]
    fn ipv6_uri_host_is_unbracketed() {
        let layer = parse("uri ldaps://[2001:db8::1]:636/", "nslcd.conf").unwrap();
        assert_eq!(layer.host.as_deref(), Some("2001:db8::1"));
        assert_eq!(layer.port, Some(636));
    }

    #[test]
    fn passwd_base_and_filter_take_precedence() {
        let contents = "\
base passwd ou=People,dc=example,dc=com
base dc=example,dc=com
filter passwd (objectClass=inetOrgPerson)
filter group (objectClass=posixGroup)
";
        let layer = parse(contents, "nslcd.conf").unwrap();
        assert_eq!(layer.base.as_deref(), Some("ou=People,dc=example,dc=com"));
        assert_eq!(
            layer.filter.as_deref(),
            Some("(&(objectClass=inetOrgPerson)(uid=%s))")
        );
    }

    #[test]
    fn ssl_directive_overrides_uri_scheme() {
        let layer = parse("uri ldap://ldap.example.com\nssl on\n", "nslcd.conf").unwrap();
        assert_eq!(layer.use_tls, Some(true));

        let layer = parse("ssl off\nuri ldaps://ldap.example.com\n", "nslcd.conf").unwrap();
        assert_eq!(layer.use_tls, Some(false));
    }

    #[test]
    fn tls_reqcert_never_skips_verification() {
        let layer = parse("tls_reqcert never", "nslcd.conf").unwrap();
        assert_eq!(layer.skip_verify, Some(true));
        let layer = parse("TLS_REQCERT allow", "nslcd.conf").unwrap();
        assert_eq!(layer.skip_verify, Some(true));
    }

    #[test]
    fn rejects_start_tls_and_bad_values() {
        let err = parse("ssl start_tls", "nslcd.conf").unwrap_err();
        assert!(matches!(err, Error::Config(ref message) if message.contains("nslcd.conf:1")));

        let err = parse("\ntls_reqcert sometimes", "nslcd.conf").unwrap_err();
        assert!(matches!(err, Error::Config(ref message) if message.contains("nslcd.conf:2")));

        let err = parse("base", "nslcd.conf").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = parse("filter passwd", "nslcd.conf").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn read_optional_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layer = read_optional(&dir.path().join("nslcd.conf")).unwrap();
        assert_eq!(layer, ConfigLayer::new());
    }

    #[test]
    fn read_optional_reads_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "uri ldap://ldap.example.com:3389/").unwrap();
        writeln!(file, "base dc=example,dc=com").unwrap();

        let layer = read_optional(file.path()).unwrap();
        assert_eq!(layer.host.as_deref(), Some("ldap.example.com"));
        assert_eq!(layer.port, Some(3389));
        assert_eq!(layer.base.as_deref(), Some("dc=example,dc=com"));
    }
}
