//! # pubkey-core
//!
//! Core types for looking up SSH public keys stored in an LDAP directory.
//!
//! This crate owns everything that happens before a network connection is opened:
//! the error taxonomy shared by the workspace and the layered configuration model.
//!
//! ## Modules
//!
//! - [`error`] - Error types and exit status mapping
//! - [`config`] - Configuration layers and the resolved [`LookupConfig`]
//! - [`nslcd`] - Reader for `nslcd.conf`-style configuration files

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod nslcd;

// Re-export commonly used types
pub use config::{ConfigLayer, LookupConfig, KEY_ATTRIBUTE};
pub use error::{Error, Result};
