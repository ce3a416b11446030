use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::Value;

use crate::error::{CollectionsError, Result};

/// One decoded row, cells keyed by their original header in column order.
pub type RawRow = Vec<(String, String)>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Reads the first sheet of a workbook into a grid of display strings.
pub trait WorkbookReader: Send + Sync {
    fn first_sheet(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>>;
}

pub struct CalamineReader;

impl WorkbookReader for CalamineReader {
    fn first_sheet(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| CollectionsError::CorruptFile(format!("Workbook: {}", e)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| CollectionsError::CorruptFile("Workbook has no sheets".into()))?
            .map_err(|e| CollectionsError::CorruptFile(format!("Worksheet: {}", e)))?;

        Ok(range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        other => other.to_string(),
    }
}

pub fn decode_csv(text: &str) -> TabularData {
    rows_from_grid(split_csv(text))
}

pub fn decode_json(text: &str) -> Result<TabularData> {
    let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .map_err(|e| CollectionsError::CorruptFile(format!("Invalid JSON: {}", e)))?;

    let entries = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let nested_key = ["data", "rows"]
                .into_iter()
                .find(|key| matches!(map.get(*key), Some(Value::Array(_))));
            match nested_key.and_then(|key| map.remove(key)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        _ => Vec::new(),
    };

    let rows: Vec<RawRow> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Object(map) => Some(
                map.into_iter()
                    .map(|(key, value)| (key, json_cell(value)))
                    .collect::<RawRow>(),
            ),
            _ => None,
        })
        .collect();

    let headers = rows
        .first()
        .map(|row| row.iter().map(|(key, _)| key.clone()).collect())
        .unwrap_or_default();

    Ok(TabularData { headers, rows })
}

fn json_cell(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

pub fn decode_spreadsheet(bytes: &[u8], reader: &dyn WorkbookReader) -> Result<TabularData> {
    Ok(rows_from_grid(reader.first_sheet(bytes)?))
}

/// Character scan with a quote-state flag. Doubled quotes inside a quoted
/// field are a literal quote; line breaks inside quotes stay in the cell.
fn split_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// First non-blank record is the header; blank records are skipped.
fn rows_from_grid(grid: Vec<Vec<String>>) -> TabularData {
    let mut records = grid
        .into_iter()
        .filter(|record| record.iter().any(|cell| !cell.trim().is_empty()));

    let headers: Vec<String> = match records.next() {
        Some(header) => header.into_iter().map(|h| h.trim().to_string()).collect(),
        None => return TabularData::default(),
    };

    let rows = records
        .map(|record| {
            headers
                .iter()
                .enumerate()
                .map(|(idx, header)| {
                    let cell = record.get(idx).map(|c| c.trim().to_string()).unwrap_or_default();
                    (header.clone(), cell)
                })
                .collect()
        })
        .collect();

    TabularData { headers, rows }
}
