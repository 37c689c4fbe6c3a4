//! Sink adapters for walletsync.
//!
//! This crate implements the sink ports from `walletsync-core`:
//!
//! - [`CsvFileSink`] - [`LocalSink`] writing one CSV file per wallet,
//!   replaced atomically through a temporary file
//! - [`SheetsSink`] - [`RemoteSink`] replacing one Google Sheets tab per
//!   wallet through the Sheets v4 REST API
//!
//! Both sinks write the same `DATE,CAT,INFO,SYMB,QTY,RATE,AMOUNT,ACC`
//! header followed by the rows in source order.
//!
//! [`LocalSink`]: walletsync_core::ports::LocalSink
//! [`RemoteSink`]: walletsync_core::ports::RemoteSink

mod csv_file;
mod sheets;

pub use csv_file::CsvFileSink;
pub use sheets::{SHEETS_SCOPE, SheetsConfig, SheetsSink};
