use anyhow::{anyhow, Context, Result};
use regex::Regex;

const DATE_TOKENS: &[&str] = &["date", "timestamp", "time"];
const AMOUNT_TOKENS: &[&str] = &["amount", "quantity", "qty", "volume"];
const SYMBOL_TOKENS: &[&str] = &["symbol", "asset", "coin", "currency", "pair"];

fn date_pattern() -> Regex {
    // ISO dates or slash dates, anywhere in the line
    Regex::new(r"\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4}").unwrap()
}

fn number_pattern() -> Regex {
    Regex::new(r"\b\d+(\.\d+)?\b").unwrap()
}

fn contains_any(line: &str, tokens: &[&str]) -> bool {
    let line = line.to_ascii_lowercase();
    tokens.iter().any(|token| line.contains(token))
}

/// Splits a table line into fields: lines with a literal comma are
/// treated as already delimited, otherwise runs of two-or-more
/// whitespace characters separate the columns.
fn split_columns(line: &str) -> Vec<String> {
    if line.contains(',') {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        if let Some(Ok(record)) = rdr.records().next() {
            return record.iter().map(|field| field.trim().to_owned()).collect();
        }
    }
    let splitter = Regex::new(r"\s{2,}").unwrap();
    splitter
        .split(line.trim())
        .map(|field| field.trim().to_owned())
        .filter(|field| !field.is_empty())
        .collect()
}

fn csv_quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// Heuristically locates a transaction table in extracted PDF text:
/// a header line carrying date, amount and symbol/asset tokens, and
/// data lines that contain both a date and a further numeric field.
/// Best-effort by design; no matching lines is a hard error rather
/// than a guessed partial table.
pub(crate) fn table_from_text(text: &str) -> Result<String> {
    let dates = date_pattern();
    let numbers = number_pattern();

    let mut header: Option<Vec<String>> = None;
    let mut lines = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if header.is_none()
            && contains_any(line, DATE_TOKENS)
            && contains_any(line, AMOUNT_TOKENS)
            && contains_any(line, SYMBOL_TOKENS)
        {
            header = Some(split_columns(line));
            continue;
        }

        // Preamble above the header (statement dates, balances) is not
        // table data
        if header.is_none() {
            continue;
        }

        if let Some(date_match) = dates.find(line) {
            // require a number beyond the date itself
            let remainder = &line[date_match.end()..];
            if numbers.is_match(remainder) {
                lines.push(split_columns(line));
            }
        }
    }

    let header = header.ok_or_else(|| anyhow!("no transaction data found"))?;
    if lines.is_empty() {
        return Err(anyhow!("no transaction data found"));
    }

    let mut csv_text = String::new();
    csv_text.push_str(
        &header
            .iter()
            .map(|field| csv_quote(field))
            .collect::<Vec<_>>()
            .join(","),
    );
    for fields in lines {
        csv_text.push('\n');
        csv_text.push_str(
            &fields
                .iter()
                .map(|field| csv_quote(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    Ok(csv_text)
}

/// Extracts text from PDF bytes and locates the transaction table.
pub(crate) fn extract_table(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes).context("unreadable PDF")?;
    table_from_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_delimited_table() {
        let text = "\
Acme Exchange Account History

Date                 Type      Asset    Amount      Price
2024-01-15 10:00:00  buy       BTC      0.50000     42000.00
2024-02-01 09:30:00  sell      BTC      0.25000     48000.00

Page 1 of 1";
        let csv_text = table_from_text(text).unwrap();
        let mut lines = csv_text.lines();
        assert_eq!(lines.next(), Some("Date,Type,Asset,Amount,Price"));
        assert_eq!(lines.next(), Some("2024-01-15 10:00:00,buy,BTC,0.50000,42000.00"));
        assert_eq!(lines.next(), Some("2024-02-01 09:30:00,sell,BTC,0.25000,48000.00"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_comma_delimited_lines_pass_through() {
        let text = "\
Transaction history
date,type,asset,amount,price
2024-01-15,buy,ETH,2.0,2500.00";
        let csv_text = table_from_text(text).unwrap();
        assert!(csv_text.starts_with("date,type,asset,amount,price"));
        assert!(csv_text.contains("2024-01-15,buy,ETH,2.0,2500.00"));
    }

    #[test]
    fn test_preamble_before_header_is_not_table_data() {
        let text = "\
Statement date 2024-03-01, closing balance 1234.56

Date                 Type      Asset    Amount      Price
2024-01-15 10:00:00  buy       BTC      0.50000     42000.00";
        let csv_text = table_from_text(text).unwrap();
        assert_eq!(csv_text.lines().count(), 2);
        assert!(!csv_text.contains("Statement date"));
    }

    #[test]
    fn test_no_table_is_hard_error() {
        let err = table_from_text("Annual report\nNothing to see here.").unwrap_err();
        assert!(err.to_string().contains("no transaction data found"));
    }

    #[test]
    fn test_header_without_data_lines_is_error() {
        let text = "Date      Amount      Asset";
        assert!(table_from_text(text).is_err());
    }

    #[test]
    fn test_prose_with_dates_needs_header() {
        // date-bearing prose without a recognizable header is rejected
        let text = "On 2024-01-15 the market moved 5 percent.";
        assert!(table_from_text(text).is_err());
    }
}
