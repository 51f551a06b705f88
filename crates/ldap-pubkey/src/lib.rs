//! Command-line surface for LDAP public key lookups.
//!
//! `ldap-pubkey` is meant to be run by an SSH server as `AuthorizedKeysCommand`. It
//! prints the keys stored for exactly one user and exits non-zero on any failure.

#![deny(missing_docs)]

use clap::Parser;
use pubkey_core::nslcd::{self, DEFAULT_CONFIG_PATH};
use pubkey_core::{ConfigLayer, LookupConfig, Result};
use pubkey_ldap::PubkeyClient;
use std::io::Write;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "ldap-pubkey",
    version,
    about = "Print a user's SSH public keys stored in LDAP"
)]
pub struct Cli {
    /// LDAP server host
    #[arg(long)]
    pub host: Option<String>,

    /// LDAP server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Search base
    #[arg(long)]
    pub base: Option<String>,

    /// Search filter, `%s` is replaced by the username
    #[arg(long)]
    pub filter: Option<String>,

    /// Connect over TLS
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub tls: Option<bool>,

    /// Skip TLS certificate verification
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub skip: Option<bool>,

    /// PEM CA certificate used to verify the server
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// User whose keys are printed
    #[arg(value_name = "USERNAME")]
    pub usernames: Vec<String>,
}

impl Cli {
    /// Returns the configuration fields set on the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            host: self.host.clone(),
            port: self.port,
            base: self.base.clone(),
            filter: self.filter.clone(),
            use_tls: self.tls,
            skip_verify: self.skip,
            ca_cert: self.ca_cert.clone(),
        }
    }
}

/// Resolves the configuration file and command-line overrides.
///
/// # Errors
///
/// Returns a configuration or usage error; see [`LookupConfig::resolve`].
pub fn resolve_config(cli: &Cli) -> Result<LookupConfig> {
    let file = nslcd::read_optional(&cli.config)?;
    LookupConfig::resolve(file.merge(cli.overrides()), &cli.usernames)
}

/// Looks up the user's keys and writes them to `out`.
///
/// Nothing is written unless the lookup succeeds.
///
/// # Errors
///
/// Returns the first error raised by resolution, connection, search or output.
pub async fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let config = resolve_config(cli)?;
    let keys = PubkeyClient::new(config).fetch_keys().await?;
    write_keys(&keys, out)
}

/// Writes one key per line.
///
/// # Errors
///
/// Returns [`pubkey_core::Error::Output`] if writing fails.
pub fn write_keys<W: Write>(keys: &[String], out: &mut W) -> Result<()> {
    let mut buffer = String::new();
    for key in keys {
        buffer.push_str(key);
        buffer.push('\n');
    }
    out.write_all(buffer.as_bytes())?;
    out.flush()?;
    Ok(())
}
