use rust_decimal::Decimal;

use crate::base::{MapError, RawRow, Transaction, TransactionType};
use crate::detect::ExchangeFormat;
use crate::number::parse_decimal;
use crate::time::parse_date_time;

/// Known quote currencies, most specific first. A pair like "BTCUSDT" is
/// split by matching these suffixes; the 4-character stablecoins must be
/// tried before "USD" would match the wrong boundary.
const QUOTE_SUFFIXES: &[&str] = &[
    "USDT", "USDC", "BUSD", "BNB", "ETH", "BTC", "USD", "EUR", "GBP",
];

const STABLECOINS: &[&str] = &["USDT", "USDC", "BUSD"];

pub(crate) fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.contains(&symbol)
}

/// Splits a concatenated trading pair like "BTCUSDT" into base and
/// quote. Falls back to assuming the last 3-4 characters are the quote
/// when no known suffix matches. Tickers are ASCII; anything else is
/// returned empty so the caller rejects the row.
pub(crate) fn split_pair(pair: &str) -> (String, String) {
    let pair = pair.trim().to_ascii_uppercase();
    if !pair.is_ascii() {
        return (String::new(), String::new());
    }

    for quote in QUOTE_SUFFIXES {
        if pair.len() > quote.len() && pair.ends_with(quote) {
            let base = &pair[..pair.len() - quote.len()];
            return (base.to_owned(), (*quote).to_owned());
        }
    }

    if pair.len() <= 3 {
        return (pair, String::new());
    }
    let quote_len = if pair.len() > 6 { 4 } else { 3 };
    let split = pair.len() - quote_len;
    (pair[..split].to_owned(), pair[split..].to_owned())
}

fn parse_timestamp(row: &RawRow) -> Result<chrono::NaiveDateTime, MapError> {
    let (field, raw) = match row.get("date(utc)") {
        Some(value) => ("Date(UTC)", value),
        None => ("Date", row.require("date")?),
    };
    if raw.is_empty() {
        return Err(MapError::field(field, raw, "missing value"));
    }
    parse_date_time(raw).map_err(|err| MapError::field(field, raw, err.to_string()))
}

fn parse_amount_field(row: &RawRow, field: &str) -> Result<Decimal, MapError> {
    let raw = row.require(field)?;
    parse_decimal(raw).map_err(|err| MapError::field(field, raw, err.to_string()))
}

/// Binance spot trade export:
/// `Date(UTC),Market,Type,Price,Amount,Total,Fee,Fee Coin`
///
/// `Amount` is the executed base quantity and `Total` the quote
/// notional; the side field carries BUY/SELL directly.
pub(crate) fn map_spot_row(row: &RawRow) -> Result<Transaction, MapError> {
    let timestamp = parse_timestamp(row)?;

    let market = row.require("market")?;
    let (base, _quote) = split_pair(market);
    if base.is_empty() {
        return Err(MapError::field("Market", market, "unrecognized trading pair"));
    }

    let side = row.require("type")?;
    let tx_type = match side.to_ascii_lowercase().as_str() {
        "buy" => TransactionType::Buy,
        "sell" => TransactionType::Sell,
        _ => return Err(MapError::field("Type", side, "unrecognized trade side")),
    };

    let amount = parse_amount_field(row, "amount")?;
    let price = parse_amount_field(row, "price")?;
    let fee = match row.get("fee").filter(|value| !value.is_empty()) {
        Some(raw) => parse_decimal(raw).map_err(|err| MapError::field("Fee", raw, err.to_string()))?,
        None => Decimal::ZERO,
    };

    let total_value = match row.get("total").filter(|value| !value.is_empty()) {
        Some(raw) => parse_decimal(raw).map_err(|err| MapError::field("Total", raw, err.to_string()))?,
        None => amount * price,
    };

    let mut tx = Transaction::new(timestamp, tx_type, base, amount);
    tx.price = price;
    tx.fee = fee;
    tx.fee_currency = row
        .get("fee coin")
        .map(|coin| coin.to_ascii_uppercase())
        .unwrap_or_default();
    tx.total_value = total_value;
    tx.exchange = ExchangeFormat::BinanceSpot;
    tx.raw_data = row.to_json();
    Ok(tx)
}

/// Binance deposit export:
/// `Date(UTC),Coin,Network,Amount,Address,TXID,Status`
///
/// Deposits carry no trade price. Stablecoins default to a $1 peg when
/// `assume_stablecoin_peg` is set; anything else stays at price 0,
/// deferring valuation to market data.
pub(crate) fn map_deposit_row(
    row: &RawRow,
    assume_stablecoin_peg: bool,
) -> Result<Transaction, MapError> {
    map_transfer_row(row, TransactionType::TransferIn, assume_stablecoin_peg)
}

/// Binance withdrawal export:
/// `Date(UTC),Coin,Network,Amount,Transaction Fee,Address,Transaction ID,Status`
///
/// The fee is deducted from the withdrawn amount, so the total reflects
/// amount plus fee.
pub(crate) fn map_withdrawal_row(
    row: &RawRow,
    assume_stablecoin_peg: bool,
) -> Result<Transaction, MapError> {
    map_transfer_row(row, TransactionType::TransferOut, assume_stablecoin_peg)
}

fn map_transfer_row(
    row: &RawRow,
    tx_type: TransactionType,
    assume_stablecoin_peg: bool,
) -> Result<Transaction, MapError> {
    let timestamp = parse_timestamp(row)?;
    let coin = row.require("coin")?.to_ascii_uppercase();
    let amount = parse_amount_field(row, "amount")?;

    let fee = match tx_type {
        TransactionType::TransferOut => {
            match row.get("transaction fee").or_else(|| row.get("fee")) {
                Some(raw) if !raw.is_empty() => parse_decimal(raw)
                    .map_err(|err| MapError::field("Transaction Fee", raw, err.to_string()))?,
                _ => Decimal::ZERO,
            }
        }
        _ => Decimal::ZERO,
    };

    let price = if assume_stablecoin_peg && is_stablecoin(&coin) {
        Decimal::ONE
    } else {
        Decimal::ZERO
    };

    let total_value = match tx_type {
        TransactionType::TransferOut => amount + fee,
        _ => amount,
    };

    let mut tx = Transaction::new(timestamp, tx_type, coin.clone(), amount);
    tx.price = price;
    tx.fee = fee;
    tx.fee_currency = coin;
    tx.total_value = total_value;
    tx.exchange = match tx_type {
        TransactionType::TransferOut => ExchangeFormat::BinanceWithdrawal,
        _ => ExchangeFormat::BinanceDeposit,
    };
    tx.raw_data = row.to_json();
    Ok(tx)
}
