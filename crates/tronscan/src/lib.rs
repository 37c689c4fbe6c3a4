//! Tronscan adapter for walletsync.
//!
//! This crate implements the [`TransferSource`] port from `walletsync-core`,
//! fetching TRC20 token transfers of a wallet from the Tronscan HTTP API.
//!
//! # Features
//!
//! - Lazy pagination over `api/transfer/trc20`, oldest transfer first
//! - Optional `TRON-PRO-API-KEY` authentication
//! - Tolerant record parsing (numbers as JSON numbers or strings)
//! - Exact token quantities scaled by the token decimals
//!
//! # Usage
//!
//! ```ignore
//! use walletsync_tronscan::{TronscanClient, TronscanConfig};
//!
//! let client = TronscanClient::new(TronscanConfig::default())?;
//! let mut stream = client.fetch(address, &DateRange::unbounded()).await?;
//!
//! while let Some(transfer) = stream.next().await {
//!     // Normalize transfer...
//! }
//! ```
//!
//! [`TransferSource`]: walletsync_core::ports::TransferSource

mod client;
mod parse;

pub use client::{TronscanClient, TronscanConfig, USDT_CONTRACT};
