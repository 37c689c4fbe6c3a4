//! Parsing of Tronscan transfer pages.
//!
//! Tronscan is loose about field names and types across endpoints and
//! versions, so every field is looked up under several keys and numbers are
//! accepted either as JSON numbers or as strings.

use rust_decimal::Decimal;
use serde_json::Value;

use walletsync_core::error::{FetchError, FetchResult};
use walletsync_core::models::{RawTransfer, TransferTime};

/// Largest scale a [`Decimal`] can carry.
const MAX_DECIMALS: u32 = 28;

// =============================================================================
// Field extraction
// =============================================================================

/// Extract a field from a record, trying multiple key names in order.
///
/// # Example
///
/// ```ignore
/// let from = extract_field(record, &["from", "from_address"], parse_string);
/// ```
pub(crate) fn extract_field<T>(
    data: &Value,
    keys: &[&str],
    parser: fn(&Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find_map(parser)
}

/// Parse a non-empty string.
pub(crate) fn parse_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse an amount (u128) from JSON.
///
/// Token amounts routinely exceed what a JSON number can carry exactly, so
/// Tronscan sends them as strings.
pub(crate) fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a u64 from JSON.
pub(crate) fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a u32 from JSON.
pub(crate) fn parse_u32(value: &Value) -> Option<u32> {
    parse_u64(value).and_then(|v| v.try_into().ok())
}

// =============================================================================
// Records
// =============================================================================

/// Parse one transfer record.
///
/// `default_symbol` is used when the record carries no `tokenInfo.tokenAbbr`.
pub(crate) fn parse_transfer(record: &Value, default_symbol: &str) -> FetchResult<RawTransfer> {
    let tx_id = extract_field(record, &["transaction_id", "hash"], parse_string)
        .ok_or_else(|| missing("transaction_id", record))?;
    let from = extract_field(record, &["from", "from_address"], parse_string)
        .ok_or_else(|| missing("from", record))?;
    let to = extract_field(record, &["to", "to_address"], parse_string)
        .ok_or_else(|| missing("to", record))?;

    let millis = extract_field(record, &["block_timestamp", "block_ts"], parse_u64)
        .ok_or_else(|| missing("block_timestamp", record))?;
    let time = i64::try_from(millis)
        .ok()
        .and_then(TransferTime::from_millis)
        .ok_or_else(|| {
            FetchError::InvalidRecord(format!("{}: timestamp {} out of range", tx_id, millis))
        })?;

    let token_info = record.get("tokenInfo").unwrap_or(&Value::Null);
    let amount = extract_field(record, &["amount", "quant", "amount_str"], parse_amount)
        .ok_or_else(|| missing("amount", record))?;
    let decimals = extract_field(record, &["decimals"], parse_u32)
        .or_else(|| extract_field(token_info, &["tokenDecimal"], parse_u32))
        .ok_or_else(|| missing("decimals", record))?;
    let quantity = scale_amount(amount, decimals).ok_or_else(|| {
        FetchError::InvalidRecord(format!(
            "{}: amount {} with {} decimals",
            tx_id, amount, decimals
        ))
    })?;

    let symbol = extract_field(token_info, &["tokenAbbr"], parse_string)
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| default_symbol.to_string());

    Ok(RawTransfer {
        tx_id,
        time,
        symbol,
        quantity,
        from,
        to,
    })
}

/// `amount / 10^decimals` as an exact decimal.
fn scale_amount(amount: u128, decimals: u32) -> Option<Decimal> {
    if decimals > MAX_DECIMALS {
        return None;
    }
    let amount = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(amount, decimals).ok()
}

fn missing(field: &str, record: &Value) -> FetchError {
    let tx = record
        .get("transaction_id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown tx>");
    FetchError::InvalidRecord(format!("{}: missing or invalid '{}'", tx, field))
}

// =============================================================================
// Pages
// =============================================================================

/// Parse a page body into transfers.
///
/// An empty body is an empty page. The transfer array is read from
/// `token_transfers` or `data`; a body with neither is also an empty page.
pub(crate) fn parse_page(body: &str, default_symbol: &str) -> FetchResult<Vec<RawTransfer>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let payload: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("{}: {}", e, truncate(body, 200))))?;

    let records = ["token_transfers", "data"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .filter_map(Value::as_array)
        .find(|records| !records.is_empty());

    match records {
        Some(records) => records
            .iter()
            .map(|record| parse_transfer(record, default_symbol))
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// First `max` characters of `s`.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SENDER: &str = "TNXoiAJ3dct8Fjg4M9fkLFh9S2v9TXc32G";
    const RECEIVER: &str = "TJDENsfBJs4RFETt1X1W8wMDc8M5XnJhCe";

    fn record() -> Value {
        json!({
            "transaction_id": "a1b2c3",
            "block_timestamp": 1_759_306_530_000u64,
            "from": SENDER,
            "to": RECEIVER,
            "amount": "100000000",
            "decimals": 6,
            "tokenInfo": { "tokenAbbr": "usdt", "tokenDecimal": 6 }
        })
    }

    // Test critique: montant en chaîne, décimales en nombre
    #[test]
    fn test_parse_transfer_string_and_number_fields() {
        let transfer = parse_transfer(&record(), "USDT").unwrap();
        assert_eq!(transfer.tx_id, "a1b2c3");
        assert_eq!(transfer.quantity, Decimal::from(100));
        assert_eq!(transfer.symbol, "USDT");
        assert_eq!(transfer.from, SENDER);
        assert_eq!(transfer.to, RECEIVER);
        assert_eq!(transfer.time.to_string(), "2025-10-01 08:15:30");
    }

    #[test]
    fn test_parse_transfer_alternate_keys() {
        let alt = json!({
            "transaction_id": "ff00",
            "block_ts": "1759306530000",
            "from_address": SENDER,
            "to_address": RECEIVER,
            "quant": 1_500_000u64,
            "tokenInfo": { "tokenDecimal": "6" }
        });
        let transfer = parse_transfer(&alt, "USDT").unwrap();
        assert_eq!(transfer.quantity, Decimal::new(15, 1));
        assert_eq!(transfer.symbol, "USDT");
    }

    // Sans tokenAbbr, le symbole configuré est utilisé
    #[test]
    fn test_symbol_fallback() {
        let mut value = record();
        value["tokenInfo"] = json!({});
        let transfer = parse_transfer(&value, "USDT").unwrap();
        assert_eq!(transfer.symbol, "USDT");
    }

    #[test]
    fn test_missing_field_is_invalid_record() {
        let mut value = record();
        value.as_object_mut().unwrap().remove("to");
        let err = parse_transfer(&value, "USDT").unwrap_err();
        assert!(matches!(err, FetchError::InvalidRecord(ref m) if m.contains("'to'")));
    }

    #[test]
    fn test_scale_amount_limits() {
        assert_eq!(scale_amount(1, 0), Some(Decimal::ONE));
        assert_eq!(scale_amount(1, 29), None);
        assert_eq!(scale_amount(u128::MAX, 6), None);
    }

    #[test]
    fn test_parse_page_keys() {
        let body = json!({ "token_transfers": [record()], "total": 1 }).to_string();
        assert_eq!(parse_page(&body, "USDT").unwrap().len(), 1);

        let body = json!({ "data": [record(), record()] }).to_string();
        assert_eq!(parse_page(&body, "USDT").unwrap().len(), 2);

        let body = json!({ "token_transfers": [], "total": 0 }).to_string();
        assert!(parse_page(&body, "USDT").unwrap().is_empty());
    }

    // Test critique: un corps vide sur 200 termine la pagination sans erreur
    #[test]
    fn test_parse_page_empty_and_invalid_bodies() {
        assert!(parse_page("", "USDT").unwrap().is_empty());
        assert!(parse_page("  \n", "USDT").unwrap().is_empty());

        let err = parse_page("<html>busy</html>", "USDT").unwrap_err();
        assert!(matches!(err, FetchError::Decode(ref m) if m.contains("<html>")));
    }
}
