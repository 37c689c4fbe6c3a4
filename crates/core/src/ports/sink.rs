//! Port traits for row sinks.
//!
//! The local sink is always present. The remote sink is a capability: the
//! sync service holds it as an `Option` and skips it when absent.

use std::path::Path;

use async_trait::async_trait;

use crate::error::SinkResult;
use crate::models::NormalizedRow;

/// Writes a wallet's rows to a local file.
#[async_trait]
pub trait LocalSink: Send + Sync {
    /// Replace `path` with exactly `rows`, header first.
    ///
    /// Implementations must be all-or-nothing: on failure the previous file
    /// content (or its absence) is left untouched.
    async fn write(&self, rows: &[NormalizedRow], path: &Path) -> SinkResult<()>;
}

/// Writes a wallet's rows to a remote spreadsheet tab.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Create `tab` if absent, then replace its content with header + `rows`.
    async fn write(&self, rows: &[NormalizedRow], tab: &str) -> SinkResult<()>;

    /// Human-readable destination, for logs.
    fn destination(&self) -> String;
}
