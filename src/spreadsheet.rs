use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};

use crate::base::RowIssue;

/// A worksheet re-serialized as CSV text, ready for the same detection
/// and mapping path as a native CSV upload.
pub(crate) struct SheetCsv {
    pub text: String,
    pub notes: Vec<RowIssue>,
}

/// Serializes a worksheet cell to its string form: rich text unwrapped,
/// dates to ISO-8601, numbers without formatting.
fn serialize_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Float(value) => value.to_string(),
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|datetime| datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(text) => text.clone(),
        Data::DurationIso(text) => text.clone(),
        Data::Error(_) => String::new(),
    }
}

/// RFC 4180 quoting for values that would break the synthetic CSV.
fn csv_quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

/// Extracts a worksheet into CSV text. When the requested sheet does not
/// exist the first worksheet is used instead, noted as an info-severity
/// issue rather than an error.
pub(crate) fn extract_worksheet(bytes: &[u8], sheet_name: Option<&str>) -> Result<SheetCsv> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).context("unreadable workbook")?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first_sheet = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("workbook contains no worksheets"))?;

    let mut notes = Vec::new();
    let selected = match sheet_name {
        Some(requested) if sheet_names.iter().any(|name| name == requested) => requested.to_owned(),
        Some(requested) => {
            notes.push(RowIssue::info(
                0,
                format!("sheet '{}' not found, using '{}'", requested, first_sheet),
            ));
            first_sheet
        }
        None => first_sheet,
    };

    let range = workbook
        .worksheet_range(&selected)
        .map_err(|err| anyhow!("failed to read sheet '{}': {}", selected, err))?;

    let mut lines = Vec::new();
    for row in range.rows() {
        let fields: Vec<String> = row
            .iter()
            .map(|cell| csv_quote(&serialize_cell(cell)))
            .collect();
        if fields.iter().all(String::is_empty) {
            continue;
        }
        lines.push(fields.join(","));
    }

    Ok(SheetCsv {
        text: lines.join("\n"),
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_cell_forms() {
        assert_eq!(serialize_cell(&Data::Empty), "");
        assert_eq!(serialize_cell(&Data::String("BTC".to_owned())), "BTC");
        assert_eq!(serialize_cell(&Data::Float(42.0)), "42");
        assert_eq!(serialize_cell(&Data::Float(0.125)), "0.125");
        assert_eq!(serialize_cell(&Data::Int(7)), "7");
        assert_eq!(serialize_cell(&Data::Bool(true)), "true");
        assert_eq!(
            serialize_cell(&Data::DateTimeIso("2024-01-15T10:00:00".to_owned())),
            "2024-01-15T10:00:00"
        );
    }

    #[test]
    fn test_csv_quote() {
        assert_eq!(csv_quote("plain"), "plain");
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_quote("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(extract_worksheet(b"not a workbook", None).is_err());
    }
}
