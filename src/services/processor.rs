use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::MAX_UPLOAD_BYTES;
use crate::error::{CollectionsError, Result};
use crate::models::Queue;
use crate::services::normalizer::normalize_rows;
use crate::services::pdf_fields::extract_invoice_fields;
use crate::services::queue::new_queue;
use crate::services::tabular::{decode_csv, decode_json, decode_spreadsheet, RawRow, WorkbookReader};
use crate::services::text_extraction::TextExtractor;
use crate::utils::sha256_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Spreadsheet,
    Pdf,
}

fn format_from_extension(file_name: &str) -> Option<FileFormat> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_ascii_lowercase();
    match ext.as_str() {
        "csv" | "txt" => Some(FileFormat::Csv),
        "json" => Some(FileFormat::Json),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileFormat::Spreadsheet),
        "pdf" => Some(FileFormat::Pdf),
        _ => None,
    }
}

fn format_from_media_type(media_type: &str) -> Option<FileFormat> {
    let essence = media_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "text/csv" | "application/csv" | "text/plain" => Some(FileFormat::Csv),
        "application/json" | "text/json" => Some(FileFormat::Json),
        "application/pdf" => Some(FileFormat::Pdf),
        "application/vnd.ms-excel" | "application/vnd.oasis.opendocument.spreadsheet" => {
            Some(FileFormat::Spreadsheet)
        }
        m if m.starts_with("application/vnd.openxmlformats-officedocument.spreadsheetml") => {
            Some(FileFormat::Spreadsheet)
        }
        _ => None,
    }
}

fn format_from_magic(bytes: &[u8]) -> Option<FileFormat> {
    const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    if bytes.starts_with(b"%PDF") {
        return Some(FileFormat::Pdf);
    }
    if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&OLE_MAGIC) {
        return Some(FileFormat::Spreadsheet);
    }
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'[') | Some(b'{') => Some(FileFormat::Json),
        _ => None,
    }
}

/// Extension, then declared media type, then content sniffing.
pub fn detect_format(file_name: &str, media_type: Option<&str>, bytes: &[u8]) -> Result<FileFormat> {
    format_from_extension(file_name)
        .or_else(|| media_type.and_then(format_from_media_type))
        .or_else(|| format_from_magic(bytes))
        .ok_or_else(|| CollectionsError::UnsupportedFormat(file_name.to_string()))
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn decode_rows(
    bytes: &[u8],
    format: FileFormat,
    file_name: &str,
    reader: &dyn WorkbookReader,
    now: DateTime<Utc>,
) -> Result<Vec<RawRow>> {
    let rows = match format {
        FileFormat::Csv => decode_csv(&decode_text(bytes)).rows,
        FileFormat::Json => decode_json(&decode_text(bytes))?.rows,
        FileFormat::Spreadsheet => decode_spreadsheet(bytes, reader)?.rows,
        FileFormat::Pdf => {
            if !bytes.starts_with(b"%PDF") {
                tracing::warn!(file = %file_name, "PDF upload without %PDF header, salvaging anyway");
            }
            let text = TextExtractor::extract_from_pdf(bytes);
            if !TextExtractor::validate_text_quality(&text) {
                tracing::warn!(file = %file_name, chars = text.len(), "Very little text salvaged from PDF");
            }
            vec![extract_invoice_fields(&text, file_name, now).into_row()]
        }
    };
    Ok(rows)
}

/// Full ingest pipeline up to a ranked queue. Nothing is stored here.
pub fn build_queue(
    bytes: &[u8],
    file_name: &str,
    media_type: Option<&str>,
    reader: &dyn WorkbookReader,
    now: DateTime<Utc>,
) -> Result<Queue> {
    if bytes.is_empty() || bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CollectionsError::EmptyFile);
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(CollectionsError::FileTooLarge {
            size: bytes.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }

    let format = detect_format(file_name, media_type, bytes)?;
    let rows = decode_rows(bytes, format, file_name, reader, now)?;
    if rows.is_empty() {
        return Err(CollectionsError::EmptyFile);
    }

    let outcome = normalize_rows(&rows, now);
    if outcome.invoices.is_empty() {
        return Err(CollectionsError::NoActionableInvoices);
    }

    let queue = new_queue(file_name, sha256_bytes(bytes), outcome.invoices, now);
    tracing::info!(
        queue_id = %queue.id,
        file = %file_name,
        format = ?format,
        rows = outcome.rows_considered,
        active = queue.prioritized_invoices.len(),
        "Queue created"
    );
    Ok(queue)
}
