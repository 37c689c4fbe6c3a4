//! Error types for the sync domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DirectoryError`] - Wallet directory loading errors
//! - [`FetchError`] - Block explorer / transfer source errors
//! - [`NormalizeError`] - Transfer normalization errors
//! - [`SinkError`] - Local file and remote sheet write errors
//! - [`SyncError`] - Top-level per-wallet orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Directory Errors
// =============================================================================

/// Wallet directory loading failures.
///
/// These abort the whole run: no wallet can be processed without the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory file does not exist.
    #[error("Wallet directory not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The directory exists but its content is unusable.
    #[error("Wallet directory malformed: {0}")]
    Malformed(String),

    /// The directory could not be read.
    #[error("Wallet directory unreadable at {}: {message}", path.display())]
    Io {
        /// Path of the directory file.
        path: PathBuf,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Fetch Errors
// =============================================================================

/// Transfer source errors.
///
/// These occur when talking to the block explorer API. A fetch error aborts
/// processing for the affected wallet only.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The API refused the request because of rate limiting.
    #[error("Rate limited by API: {0}")]
    RateLimited(String),

    /// The API answered with a non-success status.
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Decoding error: {0}")]
    Decode(String),

    /// A transfer record is missing required fields.
    #[error("Invalid transfer record: {0}")]
    InvalidRecord(String),

    /// The source was configured with unusable settings (base URL, page size).
    #[error("Invalid source configuration: {0}")]
    Config(String),
}

// =============================================================================
// Normalize Errors
// =============================================================================

/// Transfer normalization errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// Neither end of the transfer is the tracked wallet.
    #[error("Transfer {tx_id} does not involve wallet {wallet}")]
    UnrelatedTransfer {
        /// Transaction identifier.
        tx_id: String,
        /// Tracked wallet address.
        wallet: String,
    },

    /// No rate is known for the token symbol.
    #[error("No rate available for {symbol} on {date}")]
    MissingRate {
        /// Token symbol.
        symbol: String,
        /// Transfer date (YYYY-MM-DD).
        date: String,
    },

    /// `QTY × RATE` does not fit in a decimal.
    #[error("Amount overflow for transfer {tx_id}")]
    AmountOverflow {
        /// Transaction identifier.
        tx_id: String,
    },
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Sink write errors, distinguishing local file from remote sheet failures.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the local CSV file failed. The previous file is untouched.
    #[error("Local write to {} failed: {message}", path.display())]
    Local {
        /// Destination file.
        path: PathBuf,
        /// Error details.
        message: String,
    },

    /// Writing the remote sheet tab failed.
    #[error("Remote write to tab {tab} failed: {message}")]
    Remote {
        /// Destination tab name.
        tab: String,
        /// Error details.
        message: String,
    },

    /// The sink could not be built (empty destination, HTTP client).
    ///
    /// Credential problems are reported per write as [`SinkError::Remote`].
    #[error("Sink setup failed: {0}")]
    Setup(String),
}

/// Outcome of a sink pass where at least one sink failed.
///
/// Both sinks are always attempted, so both may carry an error.
#[derive(Debug, Default)]
pub struct SinkFailures {
    pub local: Option<SinkError>,
    pub remote: Option<SinkError>,
}

impl SinkFailures {
    pub fn is_empty(&self) -> bool {
        self.local.is_none() && self.remote.is_none()
    }
}

impl fmt::Display for SinkFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = [&self.local, &self.remote]
            .into_iter()
            .flatten()
            .map(ToString::to_string)
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Pipeline stage at which a wallet sync failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Directory,
    Fetch,
    Normalize,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Directory => "directory",
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Top-level sync orchestration errors.
///
/// This is the error type returned by [`crate::services::SyncService`].
/// It wraps all lower-level errors and adds sync-specific variants.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wallet directory error.
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Transfer source error.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Normalization error.
    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    /// One or both sinks failed.
    #[error("Write error: {0}")]
    Sinks(SinkFailures),

    /// The CLI identifier matches neither an address nor a label.
    #[error("Unknown wallet identifier '{identifier}'. Known labels: {known}")]
    UnknownWallet {
        /// Identifier as given on the command line.
        identifier: String,
        /// Comma-separated list of known labels.
        known: String,
    },

    /// Batch mode found no wallet marked `internal`.
    #[error("No internal wallets found in wallet directory")]
    NoInternalWallets,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            SyncError::Directory(_)
            | SyncError::UnknownWallet { .. }
            | SyncError::NoInternalWallets => Stage::Directory,
            SyncError::Fetch(FetchError::Config(_)) => Stage::Config,
            SyncError::Fetch(_) => Stage::Fetch,
            SyncError::Normalize(_) => Stage::Normalize,
            SyncError::Sinks(_) => Stage::Write,
            SyncError::Config(_) => Stage::Config,
        }
    }
}

impl From<SinkError> for SyncError {
    fn from(err: SinkError) -> Self {
        let mut failures = SinkFailures::default();
        match err {
            SinkError::Local { .. } => failures.local = Some(err),
            SinkError::Remote { .. } => failures.remote = Some(err),
            SinkError::Setup(message) => return SyncError::Config(message),
        }
        SyncError::Sinks(failures)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Result type for transfer source operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;
