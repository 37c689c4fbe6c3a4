//! Core domain layer for the wallet transfer exporter.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services that turn token transfers of a wallet into
//! accounting rows. It follows hexagonal architecture principles - this is
//! the innermost layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    walletsync (binary)                      │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │     walletsync-tronscan      │       walletsync-sinks       │
//! │       (explorer API)         │     (CSV, Google Sheets)     │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                  walletsync-core  ← YOU ARE HERE            │
//! │           (models, directory, ports, services)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (WalletEntry, RawTransfer, NormalizedRow)
//! - [`directory`] - Wallet directory loading and lookups
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (Normalizer, SyncService)
//! - [`error`] - Domain error types
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! - [`ports::TransferSource`] - Stream transfers of a wallet, page by page
//! - [`ports::LocalSink`] - Atomically replace a wallet's CSV file
//! - [`ports::RemoteSink`] - Replace a spreadsheet tab (optional)
//! - [`ports::RateSource`] - Rate used for the `AMOUNT` column
//!
//! ## Sync Lifecycle
//!
//! 1. Load the wallet directory and resolve the requested wallet(s)
//! 2. Stream transfers from the source until it is exhausted
//! 3. Drop transfers outside the date range
//! 4. Normalize into `DATE,CAT,INFO,SYMB,QTY,RATE,AMOUNT,ACC` rows
//! 5. Write the local file, then the remote tab if configured

pub mod directory;
pub mod error;
pub mod models;
pub mod ports;
pub mod services;
