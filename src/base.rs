use std::fmt;

use chrono::NaiveDateTime;
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::detect::ExchangeFormat;

/// Canonical transaction kinds produced by the row mappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Sell,
    Trade,
    Stake,
    Reward,
    Airdrop,
    Mining,
    DefiYield,
    TransferIn,
    TransferOut,
    Other,
}

impl TransactionType {
    /// Returns `true` for the kinds that bring an asset into the user's
    /// holdings.
    #[must_use]
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            Self::Buy
                | Self::Trade
                | Self::Stake
                | Self::Reward
                | Self::Airdrop
                | Self::Mining
                | Self::DefiYield
                | Self::TransferIn
        )
    }

    /// Returns `true` for the kinds that move an asset out of the user's
    /// holdings.
    #[must_use]
    pub fn is_disposal(&self) -> bool {
        matches!(self, Self::Sell | Self::TransferOut)
    }

    /// Returns `true` if the kind is [`TransferIn`] or [`TransferOut`].
    ///
    /// [`TransferIn`]: TransactionType::TransferIn
    /// [`TransferOut`]: TransactionType::TransferOut
    #[must_use]
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::TransferIn | Self::TransferOut)
    }
}

/// Cost-basis conventions supported by the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CostBasisMethod {
    Fifo,
    AverageCost,
}

/// An immutable fact about a single asset movement, created once by a row
/// mapper and never mutated afterwards. Timestamps are naive UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub symbol: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub fee_currency: String,
    pub total_value: Decimal,
    pub exchange: ExchangeFormat,
    /// The original row, retained for duplicate detection and audit.
    pub raw_data: Value,
}

impl Transaction {
    pub fn new(
        timestamp: NaiveDateTime,
        tx_type: TransactionType,
        symbol: String,
        amount: Decimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: String::new(),
            timestamp,
            tx_type,
            symbol,
            amount,
            price: Decimal::ZERO,
            fee: Decimal::ZERO,
            fee_currency: String::new(),
            total_value: Decimal::ZERO,
            exchange: ExchangeFormat::Other,
            raw_data: Value::Null,
        }
    }

    /// Exchange-native transaction id from the retained raw row, matched
    /// case-insensitively on TXID/txHash style field names.
    pub fn native_txid(&self) -> Option<&str> {
        let map = self.raw_data.as_object()?;
        map.iter()
            .find(|(key, _)| {
                let key = key.to_ascii_lowercase();
                key == "txid" || key == "txhash" || key == "transaction id"
            })
            .and_then(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

/// Severity of a row-scoped issue. A row that raises an [`Severity::Error`]
/// contributes no transaction; warnings and infos are advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A row-scoped validation issue. `row` is the 1-based data row index
/// (0 for file-level issues).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIssue {
    pub row: usize,
    pub field: Option<String>,
    pub value: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl RowIssue {
    pub fn error(row: usize, message: impl Into<String>) -> Self {
        Self::new(row, message, Severity::Error)
    }

    pub fn warning(row: usize, message: impl Into<String>) -> Self {
        Self::new(row, message, Severity::Warning)
    }

    pub fn info(row: usize, message: impl Into<String>) -> Self {
        Self::new(row, message, Severity::Info)
    }

    fn new(row: usize, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            row,
            field: None,
            value: None,
            message: message.into(),
            severity,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self.value = Some(value.into());
        self
    }
}

/// Error raised by a row mapper. Always row-scoped: one malformed row
/// produces one error entry and the rest of the file continues.
#[derive(Debug, Clone, PartialEq)]
pub struct MapError {
    pub field: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl MapError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn field(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            value: Some(value.into()),
            message: message.into(),
        }
    }

    pub(crate) fn into_issue(self, row: usize) -> RowIssue {
        RowIssue {
            row,
            field: self.field,
            value: self.value,
            message: self.message,
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.field, &self.value) {
            (Some(field), Some(value)) => {
                write!(f, "{} (field '{}', value '{}')", self.message, field, value)
            }
            (Some(field), None) => write!(f, "{} (field '{}')", self.message, field),
            _ => f.write_str(&self.message),
        }
    }
}

/// The unit of work returned by ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub transactions: Vec<Transaction>,
    pub errors: Vec<RowIssue>,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub duplicates: usize,
}

impl ParseResult {
    /// A file-level failure: zero transactions and a single descriptive
    /// error entry. Never a thrown error that aborts the caller.
    pub fn file_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![RowIssue::error(0, message)],
            ..Self::default()
        }
    }
}

/// A raw row as seen by the mappers: header names paired with field
/// values, looked up case-insensitively.
pub struct RawRow<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
}

impl<'a> RawRow<'a> {
    pub fn new(headers: &'a StringRecord, record: &'a StringRecord) -> Self {
        Self { headers, record }
    }

    pub fn headers(&self) -> &StringRecord {
        self.headers
    }

    /// Case-insensitive exact header lookup. Returns the trimmed value,
    /// or `None` when the column is absent.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name))
            .and_then(|index| self.record.get(index))
            .map(str::trim)
    }

    /// Value at a column index, trimmed.
    pub fn get_index(&self, index: usize) -> Option<&'a str> {
        self.record.get(index).map(str::trim)
    }

    /// Like [`get`], but a missing column or empty value is a [`MapError`].
    ///
    /// [`get`]: RawRow::get
    pub fn require(&self, name: &str) -> Result<&'a str, MapError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(MapError::field(name, "", "missing value")),
            None => Err(MapError::new(format!("missing column '{}'", name))),
        }
    }

    /// The original row as a JSON object, retained on the transaction for
    /// duplicate detection and audit.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (header, value) in self.headers.iter().zip(self.record.iter()) {
            map.insert(header.trim().to_owned(), Value::String(value.trim().to_owned()));
        }
        Value::Object(map)
    }
}
