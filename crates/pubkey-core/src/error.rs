//! Error types for public key lookups.
//!
//! Every failure in the tool is fatal. Errors are propagated as values up to a single
//! point in the binary, which reports them and maps them onto a process exit status.

use thiserror::Error;

/// Exit status for command-line usage errors (`EX_USAGE` from `sysexits.h`).
pub const EXIT_USAGE: u8 = 64;
/// Exit status for configuration errors (`EX_CONFIG` from `sysexits.h`).
pub const EXIT_CONFIG: u8 = 78;
/// Exit status for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Main error type for public key lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Wrong number of positional arguments or an empty username
    #[error("Usage error: {0}")]
    Usage(String),

    /// Configuration file or resolved configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket, TLS or bind failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Search failed or did not yield exactly one entry with keys
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Keys could not be written to the output stream
    #[error("Output error: {0}")]
    Output(String),
}

/// Specialized result type for public key lookups.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Usage(_) => "USAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Lookup(_) => "LOOKUP_ERROR",
            Self::Output(_) => "OUTPUT_ERROR",
        }
    }

    /// Returns the process exit status this error maps to.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::Config(_) => EXIT_CONFIG,
            Self::Connection(_) | Self::Lookup(_) | Self::Output(_) => EXIT_FAILURE,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Output(err.to_string())
    }
}
