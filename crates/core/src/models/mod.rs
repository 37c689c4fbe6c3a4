//! Domain models for wallet transfer exports.
//!
//! These models are source- and sink-agnostic and represent the canonical
//! form of transfers within the domain layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

// =============================================================================
// Wallets
// =============================================================================

/// Who owns a wallet listed in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerType {
    /// Operated by us; included in `my_wallets` batch syncs.
    Internal,
    /// Counterparty; used only for labeling.
    Client,
}

impl FromStr for OwnerType {
    type Err = String;

    /// Case-insensitive. An empty value reads as [`OwnerType::Client`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internal" => Ok(OwnerType::Internal),
            "client" | "" => Ok(OwnerType::Client),
            other => Err(format!(
                "invalid owner_type '{}', expected 'internal' or 'client'",
                other
            )),
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerType::Internal => f.write_str("internal"),
            OwnerType::Client => f.write_str("client"),
        }
    }
}

/// A row of the wallet directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEntry {
    /// Chain address (unique key).
    pub address: String,
    /// Human-readable label. May be empty.
    pub label: String,
    pub owner_type: OwnerType,
}

impl WalletEntry {
    pub fn new(address: impl Into<String>, label: impl Into<String>, owner_type: OwnerType) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
            owner_type,
        }
    }

    /// Name used for file names, tab names and the `ACC` column.
    ///
    /// The label when present, otherwise the last 6 characters of the address.
    pub fn account_label(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        let skip = self.address.chars().count().saturating_sub(6);
        self.address.chars().skip(skip).collect()
    }

    pub fn is_internal(&self) -> bool {
        self.owner_type == OwnerType::Internal
    }
}

/// Compact `Txxx...yyyy` form of an address for display.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// =============================================================================
// Transfers
// =============================================================================

/// When a transfer happened, at the precision the source provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferTime {
    /// Calendar date only.
    Date(NaiveDate),
    /// Exact UTC instant.
    Instant(DateTime<Utc>),
}

impl TransferTime {
    /// Build from a millisecond Unix timestamp.
    pub fn from_millis(ms: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(ms).map(TransferTime::Instant)
    }

    /// Calendar date (UTC) of the transfer.
    pub fn date(&self) -> NaiveDate {
        match self {
            TransferTime::Date(d) => *d,
            TransferTime::Instant(ts) => ts.date_naive(),
        }
    }
}

impl fmt::Display for TransferTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            TransferTime::Instant(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Direction of a transfer relative to the tracked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Transfer record as produced by a [`crate::ports::TransferSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransfer {
    /// Transaction identifier (hash).
    pub tx_id: String,
    pub time: TransferTime,
    /// Token symbol (e.g., "USDT").
    pub symbol: String,
    /// Unsigned token quantity, already scaled by the token decimals.
    pub quantity: Decimal,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
}

impl RawTransfer {
    /// Direction and counterparty address from `wallet`'s point of view.
    ///
    /// Returns `None` when neither end is `wallet`. A self-transfer is
    /// treated as inbound with the wallet itself as counterparty.
    pub fn direction_for(&self, wallet: &str) -> Option<(Direction, &str)> {
        if self.to == wallet {
            Some((Direction::In, self.from.as_str()))
        } else if self.from == wallet {
            Some((Direction::Out, self.to.as_str()))
        } else {
            None
        }
    }
}

/// Inclusive calendar date bounds for a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Create a range, rejecting `from` after `to`.
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, String> {
        if let (Some(f), Some(t)) = (from, to)
            && f > t
        {
            return Err(format!("from-date {} is after to-date {}", f, t));
        }
        Ok(Self { from, to })
    }

    /// Range without bounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_bounded(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|f| date >= f) && self.to.is_none_or(|t| date <= t)
    }
}

// =============================================================================
// Output rows
// =============================================================================

/// Column header shared by every sink, in output order.
pub const ROW_HEADER: [&str; 8] = ["DATE", "CAT", "INFO", "SYMB", "QTY", "RATE", "AMOUNT", "ACC"];

/// One output row per transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    /// `DATE`
    pub date: TransferTime,
    /// `CAT`: counterparty label, or its raw address when unknown.
    pub category: String,
    /// `INFO`
    pub info: String,
    /// `SYMB`
    pub symbol: String,
    /// `QTY`: signed, negative for outbound transfers.
    pub quantity: Decimal,
    /// `RATE`
    pub rate: Decimal,
    /// `AMOUNT` = `QTY` × `RATE`.
    pub amount: Decimal,
    /// `ACC`: account label of the tracked wallet.
    pub account: String,
}

impl NormalizedRow {
    /// Render as string cells in [`ROW_HEADER`] order.
    ///
    /// Decimals are printed without trailing zeros; the value is unchanged.
    pub fn to_record(&self) -> [String; 8] {
        [
            self.date.to_string(),
            self.category.clone(),
            self.info.clone(),
            self.symbol.clone(),
            self.quantity.normalize().to_string(),
            self.rate.normalize().to_string(),
            self.amount.normalize().to_string(),
            self.account.clone(),
        ]
    }
}

// =============================================================================
// Tests
// =============================================================================
