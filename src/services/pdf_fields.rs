//! Line heuristics that pull a single invoice out of salvaged PDF text.

use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;

use crate::services::tabular::RawRow;
use crate::utils::{format_decimal, parse_currency, parse_date, parse_money};

const INVOICE_ID_LABELS: [&str; 6] = [
    "invoice number",
    "invoice no",
    "invoice #",
    "invoice id",
    "invoice num",
    "reference",
];
const CUSTOMER_LABELS: [&str; 7] = [
    "bill to",
    "billed to",
    "customer name",
    "customer",
    "client",
    "sold to",
    "attention",
];
const AMOUNT_DUE_LABELS: [&str; 4] = ["amount due", "balance due", "total due", "amount payable"];
const AMOUNT_HINTS: [&str; 5] = ["amount", "balance", "total", "due", "outstanding"];
const ISSUE_DATE_LABELS: [&str; 5] = [
    "invoice date",
    "issue date",
    "date of issue",
    "date issued",
    "issued",
];
const DUE_DATE_LABELS: [&str; 4] = ["due date", "payment due", "due by", "due on"];

/// Days added to the issue date when no due date is printed.
const DEFAULT_TERMS_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct PdfInvoiceFields {
    pub invoice_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub amount_due: f64,
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub status: &'static str,
}

impl PdfInvoiceFields {
    /// Canonical-header row so PDF uploads share the tabular normalization path.
    pub fn into_row(self) -> RawRow {
        let mut row: RawRow = vec![
            ("invoiceId".into(), self.invoice_id),
            ("customerName".into(), self.customer_name.unwrap_or_default()),
            ("customerEmail".into(), self.customer_email.unwrap_or_default()),
            ("amountDue".into(), format_decimal(self.amount_due)),
            ("currency".into(), self.currency),
            ("dueDate".into(), self.due_date.format("%Y-%m-%d").to_string()),
            ("status".into(), self.status.to_string()),
        ];
        if let Some(issue) = self.issue_date {
            row.push(("issueDate".into(), issue.format("%Y-%m-%d").to_string()));
        }
        row
    }
}

fn line_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n|\r| {2,}|\t").expect("static regex"))
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex")
    })
}

fn invoice_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(INV(?:OICE)?)[-\s#:]*([A-Za-z0-9/_-]*\d[A-Za-z0-9/_-]*)")
            .expect("static regex")
    })
}

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[/.-]\d{1,2}[/.-]\d{2,4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}|\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?,?\s+\d{4})\b",
        )
        .expect("static regex")
    })
}

fn money_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\(?-?[$€£]?-?\d{1,3}(?:,\d{3})*(?:\.\d+)?\)?$|^\(?-?[$€£]?-?\d+(?:\.\d+)?\)?$")
            .expect("static regex")
    })
}

fn paid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)paid\s+in\s+full|payment\s+received|\bsettled\b").expect("static regex")
    })
}

/// Splits on line breaks and on runs of two or more spaces; collapses and trims.
pub fn split_lines(text: &str) -> Vec<String> {
    line_splitter()
        .split(text)
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_label_line(line: &str) -> bool {
    line.ends_with(':')
}

fn find_label(line: &str, labels: &[&str]) -> Option<usize> {
    let lower = line.to_ascii_lowercase();
    labels
        .iter()
        .find_map(|label| lower.find(label).map(|pos| pos + label.len()))
}

/// First labeled value only.
#[cfg(test)]
fn extract_labeled_value(lines: &[String], labels: &[&str]) -> Option<String> {
    labeled_values(lines, labels).into_iter().next()
}

/// Same-line suffix after each matching label, else the following line unless
/// that is a label too.
fn labeled_values(lines: &[String], labels: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(end) = find_label(line, labels) else {
            continue;
        };
        let suffix = line[end..].trim_start_matches(|c: char| c == ':' || c == '.' || c.is_whitespace());
        if !suffix.is_empty() {
            values.push(suffix.trim().to_string());
            continue;
        }
        if let Some(next) = lines.get(idx + 1) {
            if !is_label_line(next) {
                values.push(next.clone());
            }
        }
    }
    values
}

fn sanitize_invoice_id(raw: &str) -> Option<String> {
    let first = raw.split_whitespace().next()?;
    let cleaned: String = first
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '#' | ':'))
        .collect();
    let cleaned = cleaned
        .trim_start_matches(|c| matches!(c, '#' | ':' | '-'))
        .replace(['#', ':'], "");
    (!cleaned.is_empty()).then_some(cleaned)
}

fn filename_slug(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    let slug: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    (!slug.is_empty()).then_some(slug)
}

pub fn extract_invoice_id(lines: &[String], text: &str, file_name: &str, now: DateTime<Utc>) -> String {
    labeled_values(lines, &INVOICE_ID_LABELS)
        .iter()
        .find_map(|value| sanitize_invoice_id(value))
        .or_else(|| {
            invoice_id_pattern().captures(text).map(|caps| {
                let token = &caps[2];
                if caps[1].len() == 3 {
                    format!("{}-{}", caps[1].to_ascii_uppercase(), token.trim_start_matches('-'))
                } else {
                    token.to_string()
                }
            })
        })
        .or_else(|| filename_slug(file_name))
        .unwrap_or_else(|| format!("PDF-{}", now.timestamp_millis()))
}

pub fn extract_email(text: &str) -> Option<String> {
    email_pattern().find(text).map(|m| m.as_str().to_string())
}

pub fn extract_customer_name(lines: &[String], email: Option<&str>) -> Option<String> {
    let labeled = labeled_values(lines, &CUSTOMER_LABELS)
        .into_iter()
        .find(|value| !value.contains('@'));
    if labeled.is_some() {
        return labeled;
    }

    let email = email?;
    let email_idx = lines.iter().position(|line| line.contains(email))?;
    let previous = lines.get(email_idx.checked_sub(1)?)?;
    (!previous.contains('@') && !is_label_line(previous)).then(|| previous.clone())
}

/// Money tokens on a line, ignoring anything that is part of a date.
fn money_tokens(line: &str) -> Vec<String> {
    let without_dates = date_pattern().replace_all(line, " ");
    without_dates
        .split_whitespace()
        .map(|token| token.trim_end_matches([',', ';', ':']))
        .map(|token| token.trim_end_matches('.'))
        .filter(|token| money_token().is_match(token))
        .map(str::to_string)
        .collect()
}

fn largest<'a>(tokens: impl Iterator<Item = &'a String>) -> Option<(f64, &'a String)> {
    tokens
        .map(|token| (parse_money(token), token))
        .filter(|(value, _)| *value != 0.0)
        .max_by(|a, b| a.0.abs().total_cmp(&b.0.abs()))
}

/// Largest-magnitude token: documents often print subtotal and total together.
pub fn extract_amount(lines: &[String]) -> Option<(f64, String)> {
    let labeled: Vec<String> = labeled_values(lines, &AMOUNT_DUE_LABELS)
        .iter()
        .flat_map(|value| money_tokens(value))
        .collect();
    if let Some((value, token)) = largest(labeled.iter()) {
        return Some((value.abs(), token.clone()));
    }

    let hinted: Vec<String> = lines
        .iter()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            AMOUNT_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .flat_map(|line| money_tokens(line))
        .collect();
    if let Some((value, token)) = largest(hinted.iter()) {
        return Some((value.abs(), token.clone()));
    }

    let anywhere: Vec<String> = lines.iter().flat_map(|line| money_tokens(line)).collect();
    largest(anywhere.iter()).map(|(value, token)| (value.abs(), token.clone()))
}

fn first_date_in(value: &str) -> Option<NaiveDate> {
    date_pattern()
        .find_iter(value)
        .find_map(|m| parse_date(m.as_str()))
}

fn labeled_date(lines: &[String], labels: &[&str]) -> Option<NaiveDate> {
    labeled_values(lines, labels)
        .iter()
        .find_map(|value| first_date_in(value))
}

/// Issue date then due date. Print order usually puts the issue date first.
pub fn extract_dates(lines: &[String], text: &str, now: DateTime<Utc>) -> (Option<NaiveDate>, NaiveDate) {
    let all_dates: Vec<NaiveDate> = date_pattern()
        .find_iter(text)
        .filter_map(|m| parse_date(m.as_str()))
        .collect();

    let issue = labeled_date(lines, &ISSUE_DATE_LABELS).or_else(|| all_dates.first().copied());
    let due = labeled_date(lines, &DUE_DATE_LABELS).or_else(|| all_dates.last().copied());

    let due = match (due, issue) {
        (Some(due), _) => due,
        (None, Some(issue)) => issue + Duration::days(DEFAULT_TERMS_DAYS),
        (None, None) => (now - Duration::days(DEFAULT_TERMS_DAYS)).date_naive(),
    };
    (issue, due)
}

pub fn extract_status(text: &str) -> &'static str {
    if paid_pattern().is_match(text) {
        "paid"
    } else {
        "overdue"
    }
}

pub fn extract_invoice_fields(text: &str, file_name: &str, now: DateTime<Utc>) -> PdfInvoiceFields {
    let lines = split_lines(text);
    let invoice_id = extract_invoice_id(&lines, text, file_name, now);
    let customer_email = extract_email(text);
    let customer_name = extract_customer_name(&lines, customer_email.as_deref());
    let (amount_due, currency) = match extract_amount(&lines) {
        Some((value, token)) => (value, parse_currency(&token, "USD")),
        None => (0.0, "USD".to_string()),
    };
    let (issue_date, due_date) = extract_dates(&lines, text, now);

    PdfInvoiceFields {
        invoice_id,
        customer_name,
        customer_email,
        amount_due,
        currency,
        issue_date,
        due_date,
        status: extract_status(text),
    }
}
