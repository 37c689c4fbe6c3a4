//! Transfer normalization into the fixed output schema.

use crate::directory::WalletDirectory;
use crate::error::{NormalizeError, NormalizeResult};
use crate::models::{Direction, NormalizedRow, RawTransfer, WalletEntry, shorten_address};
use crate::ports::RateSource;

/// Maps raw transfers into [`NormalizedRow`]s for one run.
///
/// Holds read-only borrows of the directory and rate source, so the same
/// transfer always yields the same row.
pub struct Normalizer<'a> {
    directory: &'a WalletDirectory,
    rates: &'a dyn RateSource,
}

impl<'a> Normalizer<'a> {
    pub fn new(directory: &'a WalletDirectory, rates: &'a dyn RateSource) -> Self {
        Self { directory, rates }
    }

    /// Normalize `raw` from the point of view of the tracked `wallet`.
    ///
    /// `CAT` is the counterparty's label, or its address when the directory
    /// has no label for it. Outbound quantities are negative.
    pub fn normalize(&self, raw: &RawTransfer, wallet: &WalletEntry) -> NormalizeResult<NormalizedRow> {
        let (direction, counterparty) = raw.direction_for(&wallet.address).ok_or_else(|| {
            NormalizeError::UnrelatedTransfer {
                tx_id: raw.tx_id.clone(),
                wallet: wallet.address.clone(),
            }
        })?;

        let date = raw.time.date();
        let rate = self
            .rates
            .rate(&raw.symbol, date)
            .ok_or_else(|| NormalizeError::MissingRate {
                symbol: raw.symbol.clone(),
                date: date.format("%Y-%m-%d").to_string(),
            })?;

        let quantity = match direction {
            Direction::In => raw.quantity,
            Direction::Out => -raw.quantity,
        };
        let amount = quantity
            .checked_mul(rate)
            .ok_or_else(|| NormalizeError::AmountOverflow {
                tx_id: raw.tx_id.clone(),
            })?;

        let category = self
            .directory
            .label_for(counterparty)
            .unwrap_or(counterparty)
            .to_string();

        Ok(NormalizedRow {
            date: raw.time,
            category,
            info: format!("Wallet: {}", shorten_address(counterparty)),
            symbol: raw.symbol.clone(),
            quantity,
            rate,
            amount,
            account: wallet.account_label(),
        })
    }
}
