use csv::StringRecord;
use rust_decimal::Decimal;

use crate::base::{MapError, RawRow, Transaction, TransactionType};
use crate::detect::ExchangeFormat;
use crate::number::parse_decimal;
use crate::time::parse_date_time;

const DATE_SYNONYMS: &[&str] = &["date", "timestamp", "time", "datetime"];
const TYPE_SYNONYMS: &[&str] = &["type", "side", "transaction_type", "action"];
const SYMBOL_SYNONYMS: &[&str] = &["symbol", "asset", "coin", "currency", "pair"];
const AMOUNT_SYNONYMS: &[&str] = &["amount", "quantity", "qty", "volume", "vol"];
const PRICE_SYNONYMS: &[&str] = &["price", "rate", "unit_price"];
const FEE_SYNONYMS: &[&str] = &["fee", "fees", "commission"];
const TOTAL_SYNONYMS: &[&str] = &["total", "value", "total_value"];

/// Locates a column by synonym list: exact case-insensitive match first,
/// substring match second. Synonyms are tried in priority order within
/// each pass.
fn find_column(headers: &StringRecord, synonyms: &[&str]) -> Option<usize> {
    for synonym in synonyms {
        if let Some(index) = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(synonym))
        {
            return Some(index);
        }
    }
    for synonym in synonyms {
        if let Some(index) = headers
            .iter()
            .position(|header| header.trim().to_ascii_lowercase().contains(synonym))
        {
            return Some(index);
        }
    }
    None
}

/// Loose transaction-type normalization for unknown exports. Unmatched
/// labels become [`TransactionType::Other`] instead of failing the row.
fn map_transaction_type(raw: &str) -> TransactionType {
    let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    match normalized.parse() {
        Ok(tx_type) => tx_type,
        Err(_) => match normalized.as_str() {
            "deposit" => TransactionType::TransferIn,
            "withdrawal" | "withdraw" => TransactionType::TransferOut,
            "staking" => TransactionType::Stake,
            "rewards" => TransactionType::Reward,
            "mined" => TransactionType::Mining,
            _ => TransactionType::Other,
        },
    }
}

fn optional_decimal(row: &RawRow, index: Option<usize>, field: &str) -> Result<Decimal, MapError> {
    match index.and_then(|i| row.get_index(i)).filter(|value| !value.is_empty()) {
        Some(raw) => parse_decimal(raw).map_err(|err| MapError::field(field, raw, err.to_string())),
        None => Ok(Decimal::ZERO),
    }
}

/// Heuristic mapper for exports the detector doesn't recognize. Column
/// names are matched against synonym lists; date, symbol and amount are
/// mandatory (the row is rejected, not defaulted, when they cannot be
/// located), price/fee/total default to zero.
pub(crate) fn map_row(row: &RawRow) -> Result<Transaction, MapError> {
    let headers = row.headers();

    let date_col = find_column(headers, DATE_SYNONYMS)
        .ok_or_else(|| MapError::new("could not locate a date column"))?;
    let symbol_col = find_column(headers, SYMBOL_SYNONYMS)
        .ok_or_else(|| MapError::new("could not locate a symbol column"))?;
    let amount_col = find_column(headers, AMOUNT_SYNONYMS)
        .ok_or_else(|| MapError::new("could not locate an amount column"))?;

    let date_field = headers.get(date_col).unwrap_or("date").to_owned();
    let raw_date = row
        .get_index(date_col)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MapError::field(date_field.clone(), "", "missing value"))?;
    let timestamp = parse_date_time(raw_date)
        .map_err(|err| MapError::field(date_field, raw_date, err.to_string()))?;

    let symbol_field = headers.get(symbol_col).unwrap_or("symbol").to_owned();
    let raw_symbol = row
        .get_index(symbol_col)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MapError::field(symbol_field, "", "missing value"))?;
    // A pair column like "BTC/USD" contributes its base leg
    let symbol = raw_symbol
        .split('/')
        .next()
        .unwrap_or(raw_symbol)
        .trim()
        .to_ascii_uppercase();

    let amount_field = headers.get(amount_col).unwrap_or("amount").to_owned();
    let raw_amount = row
        .get_index(amount_col)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MapError::field(amount_field.clone(), "", "missing value"))?;
    let amount = parse_decimal(raw_amount)
        .map_err(|err| MapError::field(amount_field, raw_amount, err.to_string()))?;

    let tx_type = find_column(headers, TYPE_SYNONYMS)
        .and_then(|i| row.get_index(i))
        .filter(|value| !value.is_empty())
        .map(map_transaction_type)
        .unwrap_or(TransactionType::Other);

    let price = optional_decimal(row, find_column(headers, PRICE_SYNONYMS), "price")?;
    let fee = optional_decimal(row, find_column(headers, FEE_SYNONYMS), "fee")?;
    let total = optional_decimal(row, find_column(headers, TOTAL_SYNONYMS), "total")?;
    let total_value = if total.is_zero() { amount * price } else { total };

    let mut tx = Transaction::new(timestamp, tx_type, symbol, amount);
    tx.price = price;
    tx.fee = fee;
    tx.total_value = total_value;
    tx.exchange = ExchangeFormat::Other;
    tx.raw_data = row.to_json();
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row_from_csv(csv_data: &str) -> (StringRecord, StringRecord) {
        let mut rdr = csv::Reader::from_reader(csv_data.as_bytes());
        let headers = rdr.headers().unwrap().clone();
        let record = rdr.records().next().unwrap().unwrap();
        (headers, record)
    }

    #[test]
    fn test_exact_synonym_match() {
        let (headers, record) = row_from_csv(
            "date,side,asset,quantity,rate,commission,value\n\
             2024-03-01 12:00:00,buy,eth,2.5,2500.00,5.00,6255.00\n",
        );
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();

        assert_eq!(tx.tx_type, TransactionType::Buy);
        assert_eq!(tx.symbol, "ETH");
        assert_eq!(tx.amount, dec!(2.5));
        assert_eq!(tx.price, dec!(2500.00));
        assert_eq!(tx.fee, dec!(5.00));
        assert_eq!(tx.total_value, dec!(6255.00));
        assert_eq!(tx.exchange, ExchangeFormat::Other);
    }

    #[test]
    fn test_substring_synonym_match() {
        let (headers, record) = row_from_csv(
            "Trade Date,Order Side,Base Currency,Filled Quantity,Fill Price\n\
             2024-03-02,SELL,BTC/USDT,0.2,65000\n",
        );
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();

        assert_eq!(tx.tx_type, TransactionType::Sell);
        assert_eq!(tx.symbol, "BTC");
        assert_eq!(tx.amount, dec!(0.2));
        assert_eq!(tx.price, dec!(65000));
        assert_eq!(tx.total_value, dec!(13000.0));
    }

    #[test]
    fn test_type_aliases_and_fallback() {
        assert_eq!(map_transaction_type("Deposit"), TransactionType::TransferIn);
        assert_eq!(map_transaction_type("withdraw"), TransactionType::TransferOut);
        assert_eq!(map_transaction_type("Staking"), TransactionType::Stake);
        assert_eq!(map_transaction_type("defi yield"), TransactionType::DefiYield);
        assert_eq!(map_transaction_type("mystery"), TransactionType::Other);
    }

    #[test]
    fn test_missing_mandatory_column_rejects_row() {
        let (headers, record) = row_from_csv(
            "date,side,quantity\n\
             2024-03-01,buy,2.5\n",
        );
        let err = map_row(&RawRow::new(&headers, &record)).unwrap_err();
        assert!(err.message.contains("symbol"));
    }

    #[test]
    fn test_missing_optional_columns_default_to_zero() {
        let (headers, record) = row_from_csv(
            "timestamp,coin,amount\n\
             2024-03-01 09:00:00,DOGE,1000\n",
        );
        let tx = map_row(&RawRow::new(&headers, &record)).unwrap();
        assert_eq!(tx.tx_type, TransactionType::Other);
        assert_eq!(tx.price, Decimal::ZERO);
        assert_eq!(tx.fee, Decimal::ZERO);
        assert_eq!(tx.total_value, Decimal::ZERO);
    }
}
