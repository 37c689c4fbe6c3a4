//! Port trait for the transfer data source.
//!
//! This trait defines the interface for fetching token transfers of a
//! wallet from a block explorer. Implementations live in the
//! infrastructure layer (e.g., `walletsync-tronscan`).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::FetchResult;
use crate::models::{DateRange, RawTransfer};

/// Lazy stream of transfers, in the order the source yields them.
///
/// The source paginates underneath; consumers read until the stream ends
/// and must not assume any page size.
pub type TransferStream = Pin<Box<dyn Stream<Item = FetchResult<RawTransfer>> + Send>>;

/// Port trait for a paginated transfer source.
#[async_trait]
pub trait TransferSource: Send + Sync {
    /// Start fetching transfers involving `address`.
    ///
    /// `range` is a hint: sources may use it to narrow the query, and the
    /// caller still filters by date.
    async fn fetch(&self, address: &str, range: &DateRange) -> FetchResult<TransferStream>;
}
