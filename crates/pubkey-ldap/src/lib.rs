//! LDAP client for SSH public key lookups.
//!
//! This crate opens a single anonymously bound session to the configured directory,
//! searches for the user's entry and extracts the stored `sshPublicKey` values.

#![deny(missing_docs)]

mod client;
mod transport;

pub use client::{extract_keys, LdapEntry, PubkeyClient};
pub use transport::{is_ip_literal, server_url, Transport};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = pubkey_core::Result<T>;
