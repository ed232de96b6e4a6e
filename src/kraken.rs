use std::str::FromStr;

use crate::base::{MapError, RawRow, Transaction, TransactionType};
use crate::detect::ExchangeFormat;
use crate::number::parse_decimal;
use crate::time::parse_date_time;

/// Normalize Kraken asset codes to standard tickers.
///
/// Kraken uses special prefixes:
/// - `X` prefix for crypto (XXBT = BTC, XETH = ETH)
/// - `Z` prefix for fiat (ZEUR = EUR, ZUSD = USD)
/// - Newer assets have no prefix (DOT, SOL)
///
/// Known mappings are handled explicitly, then unknown 4+ character
/// codes fall back to stripping the X/Z prefix.
fn normalize_currency(currency: &str) -> String {
    match currency {
        "XXBT" | "XBT" => "BTC".to_owned(),
        "XETH" => "ETH".to_owned(),
        "XXRP" => "XRP".to_owned(),
        "XLTC" => "LTC".to_owned(),
        "XXLM" => "XLM".to_owned(),
        "XXMR" => "XMR".to_owned(),
        "XXDG" => "DOGE".to_owned(),
        "ZEUR" => "EUR".to_owned(),
        "ZUSD" => "USD".to_owned(),
        "ZGBP" => "GBP".to_owned(),
        "ZJPY" => "JPY".to_owned(),
        "ZCAD" => "CAD".to_owned(),
        "ZAUD" => "AUD".to_owned(),
        "ZCHF" => "CHF".to_owned(),
        other => {
            if other.len() >= 4 {
                let first_char = other.chars().next().unwrap();
                if first_char == 'X' || first_char == 'Z' {
                    return other[1..].to_owned();
                }
            }
            other.to_owned()
        }
    }
}

/// Parse a Kraken trading pair into (base, quote).
///
/// Newer exports separate the legs with a slash ("XBT/USD"); older ones
/// concatenate the asset codes ("XXBTZEUR"). Slash pairs are split
/// directly, concatenated ones by matching known quote codes at the
/// end, with a 3/4-character split as a last resort.
fn parse_pair(pair: &str) -> (String, String) {
    // Asset codes are ASCII; reject anything else instead of guessing
    // a split point
    if !pair.is_ascii() {
        return (String::new(), String::new());
    }
    if let Some((base, quote)) = pair.split_once('/') {
        return (normalize_currency(base.trim()), normalize_currency(quote.trim()));
    }

    let known_quotes = [
        "ZEUR", "ZUSD", "ZGBP", "ZCAD", "ZAUD", "ZJPY", "XXBT", "XBT", "EUR", "USD",
    ];
    for quote in known_quotes {
        if pair.len() > quote.len() && pair.ends_with(quote) {
            let base = &pair[..pair.len() - quote.len()];
            return (normalize_currency(base), normalize_currency(quote));
        }
    }

    let mid = if pair.len() > 6 { 4 } else { 3 };
    let mid = mid.min(pair.len());
    (normalize_currency(&pair[..mid]), normalize_currency(&pair[mid..]))
}

/// Kraken trades export:
/// `txid,ordertxid,pair,time,type,ordertype,price,cost,fee,vol,margin,misc,ledgers`
///
/// The type field is taken verbatim and validated against the canonical
/// type set; Kraken reports fees in the quote currency for spot trades.
pub(crate) fn map_row(row: &RawRow) -> Result<Transaction, MapError> {
    let raw_time = row.require("time")?;
    let timestamp = parse_date_time(raw_time)
        .map_err(|err| MapError::field("time", raw_time, err.to_string()))?;

    let pair = row.require("pair")?;
    let (base, quote) = parse_pair(pair);
    if base.is_empty() {
        return Err(MapError::field("pair", pair, "unrecognized trading pair"));
    }

    let raw_type = row.require("type")?;
    let tx_type = TransactionType::from_str(&raw_type.to_ascii_lowercase())
        .map_err(|_| MapError::field("type", raw_type, "unrecognized transaction type"))?;

    let raw_vol = row.require("vol")?;
    let amount =
        parse_decimal(raw_vol).map_err(|err| MapError::field("vol", raw_vol, err.to_string()))?;

    let raw_price = row.require("price")?;
    let price = parse_decimal(raw_price)
        .map_err(|err| MapError::field("price", raw_price, err.to_string()))?;

    let fee = match row.get("fee").filter(|value| !value.is_empty()) {
        Some(raw) => parse_decimal(raw).map_err(|err| MapError::field("fee", raw, err.to_string()))?,
        None => rust_decimal::Decimal::ZERO,
    };

    let total_value = match row.get("cost").filter(|value| !value.is_empty()) {
        Some(raw) => parse_decimal(raw).map_err(|err| MapError::field("cost", raw, err.to_string()))?,
        None => amount * price,
    };

    let mut tx = Transaction::new(timestamp, tx_type, base, amount);
    tx.price = price;
    tx.fee = fee;
    tx.fee_currency = quote;
    tx.total_value = total_value;
    tx.exchange = ExchangeFormat::Kraken;
    tx.raw_data = row.to_json();
    Ok(tx)
}
