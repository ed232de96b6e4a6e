use rust_decimal::Decimal;

use crate::base::{MapError, RawRow, Transaction, TransactionType};
use crate::detect::ExchangeFormat;
use crate::number::parse_decimal;
use crate::time::parse_date_time;

/// Fixed lookup for Coinbase's `Transaction Type` column. Anything not
/// listed maps to [`TransactionType::Other`] rather than failing the
/// row; Coinbase adds labels over time.
fn map_transaction_type(raw: &str) -> TransactionType {
    match raw.to_ascii_lowercase().as_str() {
        "buy" => TransactionType::Buy,
        "sell" => TransactionType::Sell,
        "send" => TransactionType::TransferOut,
        "receive" => TransactionType::TransferIn,
        "coinbase earn" | "learning reward" => TransactionType::Reward,
        "staking income" => TransactionType::Stake,
        _ => TransactionType::Other,
    }
}

fn parse_optional(row: &RawRow, field: &str) -> Result<Decimal, MapError> {
    match row.get(field).filter(|value| !value.is_empty()) {
        Some(raw) => parse_decimal(raw).map_err(|err| MapError::field(field, raw, err.to_string())),
        None => Ok(Decimal::ZERO),
    }
}

/// Coinbase transaction report:
/// `Timestamp,Transaction Type,Asset,Quantity Transacted,Spot Price
/// Currency,Spot Price at Transaction,Subtotal,Total (inclusive of fees
/// and/or spread),Fees and/or Spread,Notes`
///
/// Coinbase encodes direction in the type rather than the sign, so the
/// quantity is taken as absolute value.
pub(crate) fn map_row(row: &RawRow) -> Result<Transaction, MapError> {
    let raw_timestamp = row.require("timestamp")?;
    let timestamp = parse_date_time(raw_timestamp)
        .map_err(|err| MapError::field("Timestamp", raw_timestamp, err.to_string()))?;

    let tx_type = map_transaction_type(row.require("transaction type")?);
    let symbol = row.require("asset")?.to_ascii_uppercase();

    let raw_amount = row.require("quantity transacted")?;
    let amount = parse_decimal(raw_amount)
        .map_err(|err| MapError::field("Quantity Transacted", raw_amount, err.to_string()))?
        .abs();

    let price = parse_optional(row, "spot price at transaction")?;
    let fee = parse_optional(row, "fees and/or spread")?;
    let total = parse_optional(row, "total (inclusive of fees and/or spread)")?;
    let total_value = if total.is_zero() { amount * price } else { total };

    let mut tx = Transaction::new(timestamp, tx_type, symbol, amount);
    tx.price = price;
    tx.fee = fee;
    tx.fee_currency = row
        .get("spot price currency")
        .map(|currency| currency.to_ascii_uppercase())
        .unwrap_or_else(|| "USD".to_owned());
    tx.total_value = total_value;
    tx.exchange = ExchangeFormat::Coinbase;
    tx.raw_data = row.to_json();
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv::StringRecord;
    use rust_decimal_macros::dec;

    const HEADERS: &str = "Timestamp,Transaction Type,Asset,Quantity Transacted,\
        Spot Price Currency,Spot Price at Transaction,Subtotal,\
        Total (inclusive of fees and/or spread),Fees and/or Spread,Notes";

    fn row_from_csv(data_line: &str) -> (StringRecord, StringRecord) {
        let csv_data = format!("{}\n{}\n", HEADERS, data_line);
        let mut rdr = csv::Reader::from_reader(csv_data.as_bytes());
        let headers = rdr.headers().unwrap().clone();
        let record = rdr.records().next().unwrap().unwrap();
        (headers, record)
    }

    #[test]
    fn test_map_buy() {
        let (headers, record) = row_from_csv(
            "2024-01-15T10:30:00Z,Buy,BTC,0.1,USD,42000.00,4200.00,4225.00,25.00,Bought 0.1 BTC",
        );
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();

        assert_eq!(tx.tx_type, TransactionType::Buy);
        assert_eq!(tx.symbol, "BTC");
        assert_eq!(tx.amount, dec!(0.1));
        assert_eq!(tx.price, dec!(42000.00));
        assert_eq!(tx.fee, dec!(25.00));
        assert_eq!(tx.total_value, dec!(4225.00));
        assert_eq!(tx.exchange, ExchangeFormat::Coinbase);
    }

    #[test]
    fn test_send_maps_to_transfer_out_with_abs_amount() {
        let (headers, record) = row_from_csv(
            "2024-01-20T08:00:00Z,Send,ETH,-1.5,USD,2500.00,,,,Sent to cold wallet",
        );
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();

        assert_eq!(tx.tx_type, TransactionType::TransferOut);
        assert_eq!(tx.amount, dec!(1.5));
        // no total column value, so derived from amount * price
        assert_eq!(tx.total_value, dec!(3750.000));
    }

    #[test]
    fn test_reward_and_staking_labels() {
        let (headers, record) =
            row_from_csv("2024-02-01T00:00:00Z,Coinbase Earn,ALGO,10,USD,0.25,2.50,2.50,0,Earn");
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();
        assert_eq!(tx.tx_type, TransactionType::Reward);

        let (headers, record) =
            row_from_csv("2024-02-02T00:00:00Z,Staking Income,SOL,0.05,USD,100.00,5.00,5.00,0,Stake");
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();
        assert_eq!(tx.tx_type, TransactionType::Stake);
    }

    #[test]
    fn test_unrecognized_type_maps_to_other() {
        let (headers, record) =
            row_from_csv("2024-02-03T00:00:00Z,Advanced Trade Margin,BTC,0.01,USD,42000,420,420,0,");
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();
        assert_eq!(tx.tx_type, TransactionType::Other);
    }

    #[test]
    fn test_malformed_quantity_is_row_error() {
        let (headers, record) =
            row_from_csv("2024-02-03T00:00:00Z,Buy,BTC,abc,USD,42000,420,420,0,");
        let err = map_row(&RawRow::new(&headers, &record)).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("Quantity Transacted"));
    }
}
