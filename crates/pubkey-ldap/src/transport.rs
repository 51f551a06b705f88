//! Transport selection for the directory connection.

use crate::Result;
use ldap3::LdapConnSettings;
use native_tls::{Certificate, TlsConnector};
use pubkey_core::{Error, LookupConfig};
use std::fs;
use std::net::{IpAddr, Ipv6Addr};
use tracing::warn;

/// How the connection to the directory server is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain TCP (`ldap://`).
    Plain,
    /// TLS from connection start (`ldaps://`).
    Tls {
        /// Whether the server certificate is verified.
        verify: bool,
    },
}

impl Transport {
    /// Selects the transport for a resolved configuration.
    ///
    /// Certificate verification is disabled when the host is a literal IP address or
    /// when `skip_verify` is set.
    #[must_use]
    pub fn select(config: &LookupConfig) -> Self {
        if !config.use_tls() {
            return Self::Plain;
        }

        let ip_literal = is_ip_literal(config.host());
        if ip_literal && !config.skip_verify() {
            warn!(
                host = config.host(),
                "certificate verification disabled for IP address host"
            );
        }

        Self::Tls {
            verify: !(ip_literal || config.skip_verify()),
        }
    }

    /// URL scheme for this transport.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "ldap",
            Self::Tls { .. } => "ldaps",
        }
    }
}

/// Returns true if `host` is a literal IPv4 or IPv6 address.
#[must_use]
pub fn is_ip_literal(host: &str) -> bool {
    bare_host(host).parse::<IpAddr>().is_ok()
}

/// Builds the connection URL for the configured host, port and transport.
///
/// IPv6 literals are bracketed.
#[must_use]
pub fn server_url(config: &LookupConfig, transport: Transport) -> String {
    let host = bare_host(config.host());
    let host = if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    format!("{}://{host}:{}", transport.scheme(), config.port())
}

fn bare_host(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host)
}

pub(crate) fn build_ldap_settings(
    config: &LookupConfig,
    transport: Transport,
) -> Result<LdapConnSettings> {
    let settings = LdapConnSettings::new();

    match transport {
        Transport::Plain => Ok(settings),
        Transport::Tls { verify: false } => {
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|err| {
                    Error::Connection(format!("failed to construct TLS connector: {err}"))
                })?;
            Ok(settings.set_connector(connector).set_no_tls_verify(true))
        }
        Transport::Tls { verify: true } => {
            let Some(cert_path) = config.ca_cert() else {
                return Ok(settings);
            };
            let pem = fs::read(cert_path).map_err(|err| {
                Error::Connection(format!(
                    "failed to read CA certificate {}: {err}",
                    cert_path.display()
                ))
            })?;
            let certificate = Certificate::from_pem(&pem)
                .map_err(|err| Error::Connection(format!("invalid CA certificate: {err}")))?;
            let connector = TlsConnector::builder()
                .add_root_certificate(certificate)
                .build()
                .map_err(|err| {
                    Error::Connection(format!("failed to load CA certificate: {err}"))
                })?;
            Ok(settings.set_connector(connector))
        }
    }
}
