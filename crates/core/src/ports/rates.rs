//! Port trait for token rates.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Symbols treated as 1:1 unless overridden.
pub const DEFAULT_STABLECOINS: [&str; 4] = ["USDT", "USDC", "USDD", "TUSD"];

/// Source of the `RATE` column.
///
/// Implementations must be deterministic for a given run so that
/// normalization stays pure.
pub trait RateSource: Send + Sync {
    /// Rate of one unit of `symbol` on `date`, if known.
    fn rate(&self, symbol: &str, date: NaiveDate) -> Option<Decimal>;
}

/// Fixed per-symbol rates, independent of date.
#[derive(Debug, Clone, Default)]
pub struct FixedRates {
    rates: HashMap<String, Decimal>,
}

impl FixedRates {
    /// Empty table: every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stablecoins at 1.
    pub fn stablecoins() -> Self {
        let rates = DEFAULT_STABLECOINS
            .iter()
            .map(|s| (s.to_string(), Decimal::ONE))
            .collect();
        Self { rates }
    }

    /// Set or override the rate for a symbol (case-insensitive).
    pub fn with_rate(mut self, symbol: &str, rate: Decimal) -> Self {
        self.rates.insert(symbol.to_uppercase(), rate);
        self
    }
}

impl RateSource for FixedRates {
    fn rate(&self, symbol: &str, _date: NaiveDate) -> Option<Decimal> {
        self.rates.get(&symbol.to_uppercase()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 1).unwrap()
    }

    #[test]
    fn stablecoins_default_to_one() {
        let rates = FixedRates::stablecoins();
        assert_eq!(rates.rate("USDT", day()), Some(Decimal::ONE));
        assert_eq!(rates.rate("usdc", day()), Some(Decimal::ONE));
        assert_eq!(rates.rate("TRX", day()), None);
    }

    #[test]
    fn overrides_replace_defaults() {
        let rates = FixedRates::stablecoins()
            .with_rate("usdt", Decimal::new(9998, 4))
            .with_rate("TRX", Decimal::new(31, 2));
        assert_eq!(rates.rate("USDT", day()), Some(Decimal::new(9998, 4)));
        assert_eq!(rates.rate("trx", day()), Some(Decimal::new(31, 2)));
        assert_eq!(FixedRates::new().rate("USDT", day()), None);
    }
}
