//! Business logic services.

mod normalizer;
mod sync;

pub use normalizer::Normalizer;
pub use sync::{BatchReport, SyncConfig, SyncService, WalletFailure, WalletReport};
