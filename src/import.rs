use std::str::FromStr;

use chrono::Utc;
use csv::ReaderBuilder;
use log::debug;
use rust_decimal::Decimal;

use crate::base::{MapError, ParseResult, RawRow, RowIssue, Transaction};
use crate::detect::{detect_exchange_format, ExchangeFormat};
use crate::{binance, coinbase, generic, kraken, pdf, spreadsheet};

/// Size ceilings enforced before parsing begins; oversized files are
/// rejected outright rather than timing out mid-parse.
pub const MAX_CSV_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_SPREADSHEET_BYTES: usize = 25 * 1024 * 1024;
pub const MAX_PDF_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub user_id: String,
    /// Forces a schema instead of auto-detection. `None` or `"auto"`
    /// triggers the format detector.
    pub exchange_hint: Option<String>,
    /// Worksheet to read from spreadsheet uploads; falls back to the
    /// first sheet when absent or not found.
    pub sheet_name: Option<String>,
    /// Value USDT/USDC/BUSD transfers at $1 when the export carries no
    /// price. A de-pegged stablecoin will be misvalued under this
    /// assumption, hence the switch.
    pub assume_stablecoin_peg: bool,
}

impl ImportOptions {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            exchange_hint: None,
            sheet_name: None,
            assume_stablecoin_peg: true,
        }
    }
}

/// Parses an exchange export into canonical transactions.
///
/// Row-level problems exclude single rows and are collected in the
/// result; file-level problems (unsupported extension, size over limit,
/// unreadable container, no extractable table) produce a
/// zero-transaction result with a single descriptive error. This
/// function never fails the caller.
pub fn parse_file(bytes: &[u8], filename: &str, options: &ImportOptions) -> ParseResult {
    let extension = match filename.rsplit_once('.') {
        Some((_, extension)) => extension.to_ascii_lowercase(),
        None => return ParseResult::file_error(format!("file '{}' has no extension", filename)),
    };

    let limit = match extension.as_str() {
        "csv" => MAX_CSV_BYTES,
        "xlsx" | "xls" => MAX_SPREADSHEET_BYTES,
        "pdf" => MAX_PDF_BYTES,
        _ => {
            return ParseResult::file_error(format!("unsupported file extension '.{}'", extension))
        }
    };
    if bytes.len() > limit {
        return ParseResult::file_error(format!(
            "file exceeds the {} MB limit for .{} files",
            limit / (1024 * 1024),
            extension
        ));
    }
    if bytes.is_empty() {
        return ParseResult::file_error("file is empty");
    }

    let mut notes = Vec::new();
    let csv_text = match extension.as_str() {
        "csv" => String::from_utf8_lossy(bytes).into_owned(),
        "xlsx" | "xls" => match spreadsheet::extract_worksheet(bytes, options.sheet_name.as_deref())
        {
            Ok(sheet) => {
                notes.extend(sheet.notes);
                sheet.text
            }
            Err(err) => return ParseResult::file_error(err.to_string()),
        },
        _ => match pdf::extract_table(bytes) {
            Ok(text) => text,
            Err(err) => return ParseResult::file_error(err.to_string()),
        },
    };

    parse_rows(&csv_text, options, notes)
}

fn parse_rows(csv_text: &str, options: &ImportOptions, notes: Vec<RowIssue>) -> ParseResult {
    if csv_text.trim().is_empty() {
        return ParseResult::file_error("file contains no data");
    }

    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let headers = match rdr.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => return ParseResult::file_error(format!("unreadable header row: {}", err)),
    };

    let mut result = ParseResult {
        errors: notes,
        ..ParseResult::default()
    };
    let format = resolve_format(&headers, options, &mut result.errors);
    debug!("parsing rows as {}", format);

    let now = Utc::now().naive_utc();
    for (index, record) in rdr.records().enumerate() {
        let row_number = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                result.total_rows += 1;
                result
                    .errors
                    .push(RowIssue::error(row_number, format!("unreadable row: {}", err)));
                continue;
            }
        };
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        result.total_rows += 1;

        let row = RawRow::new(&headers, &record);
        let mapped = match format {
            ExchangeFormat::BinanceSpot => binance::map_spot_row(&row),
            ExchangeFormat::BinanceDeposit => {
                binance::map_deposit_row(&row, options.assume_stablecoin_peg)
            }
            ExchangeFormat::BinanceWithdrawal => {
                binance::map_withdrawal_row(&row, options.assume_stablecoin_peg)
            }
            ExchangeFormat::Coinbase => coinbase::map_row(&row),
            ExchangeFormat::Kraken => kraken::map_row(&row),
            ExchangeFormat::Other => generic::map_row(&row),
        };

        let mut tx = match mapped.and_then(validate) {
            Ok(tx) => tx,
            Err(err) => {
                result.errors.push(err.into_issue(row_number));
                continue;
            }
        };

        // Retained with a warning, not excluded
        if tx.timestamp > now {
            result.errors.push(
                RowIssue::warning(row_number, "transaction timestamp is in the future")
                    .with_field("timestamp", tx.timestamp.to_string()),
            );
        }

        tx.user_id = options.user_id.clone();
        result.transactions.push(tx);
    }

    result.valid_rows = result.transactions.len();
    if result.total_rows == 0 {
        result
            .errors
            .push(RowIssue::error(0, "file contains no data rows"));
    } else if result.valid_rows == 0 {
        result.errors.insert(
            0,
            RowIssue::error(
                0,
                format!("no valid transactions found in {} rows", result.total_rows),
            ),
        );
    }
    result
}

fn resolve_format(
    headers: &csv::StringRecord,
    options: &ImportOptions,
    issues: &mut Vec<RowIssue>,
) -> ExchangeFormat {
    match options.exchange_hint.as_deref() {
        Some(hint) if !hint.eq_ignore_ascii_case("auto") => {
            match ExchangeFormat::from_str(&hint.to_ascii_lowercase()) {
                Ok(format) => format,
                Err(_) => {
                    issues.push(RowIssue::warning(
                        0,
                        format!("unknown exchange hint '{}', auto-detecting", hint),
                    ));
                    detect_exchange_format(headers)
                }
            }
        }
        _ => detect_exchange_format(headers),
    }
}

/// Hard per-transaction invariants. A violation excludes the row and is
/// reported, never silently dropped.
fn validate(tx: Transaction) -> Result<Transaction, MapError> {
    if tx.symbol.is_empty() {
        return Err(MapError::field("symbol", "", "symbol must not be empty"));
    }
    if tx.amount <= Decimal::ZERO {
        return Err(MapError::field(
            "amount",
            tx.amount.to_string(),
            "amount must be positive",
        ));
    }
    if tx.price < Decimal::ZERO {
        return Err(MapError::field(
            "price",
            tx.price.to_string(),
            "price must not be negative",
        ));
    }
    Ok(tx)
}
