use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::InvoiceStatus;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 18] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%m/%d/%y",
    "%m-%d-%y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d %B, %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%Y%m%d",
];

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn format_decimal(value: f64) -> String {
    format!("{:.2}", value)
}

/// `1234.5` -> `1,234.50`
pub fn format_amount(value: f64) -> String {
    let fixed = format_decimal(value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, cents)
}

/// Lenient money parse. Accounting parentheses mean negative; anything unreadable is 0.
pub fn parse_money(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let parenthesized = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => {
            if parenthesized {
                -value.abs()
            } else {
                value
            }
        }
        _ => 0.0,
    }
}

pub fn parse_currency(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return trimmed.to_ascii_uppercase();
    }
    if trimmed.contains('$') {
        return "USD".to_string();
    }
    if trimmed.contains('€') {
        return "EUR".to_string();
    }
    if trimmed.contains('£') {
        return "GBP".to_string();
    }
    fallback.to_string()
}

fn ordinal_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("static regex"))
}

fn month_abbrev_dot() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b([a-z]{3,4})\.").expect("static regex"))
}

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (1900..=2200).contains(&date.year()).then_some(date)
}

/// Free-form date parse. Returns `None` rather than guessing.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return plausible(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return plausible(dt.date());
        }
    }

    let simplified = ordinal_suffix().replace_all(trimmed, "$1");
    let simplified = month_abbrev_dot().replace_all(&simplified, "$1");
    let simplified = simplified.split_whitespace().collect::<Vec<_>>().join(" ");

    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(&simplified, fmt).ok())
        .find_map(plausible)
}

/// Whole calendar days from `due` to `now`, never negative.
pub fn days_overdue(due: NaiveDate, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - due).num_days().max(0)
}

/// Calendar-day age of a timestamp relative to `now`.
pub fn age_in_days(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - then.date_naive()).num_days()
}

pub fn normalize_status(raw: &str) -> InvoiceStatus {
    let key: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    if key.contains("unpaid") {
        if key.contains("overdue") || key.contains("pastdue") || key.contains("late") {
            return InvoiceStatus::Overdue;
        }
        return InvoiceStatus::Open;
    }
    // "Partially paid" still has a balance.
    if key.contains("partial") {
        return InvoiceStatus::Partial;
    }
    if ["paid", "settled", "closed", "complete"].iter().any(|k| key.contains(k)) {
        return InvoiceStatus::Paid;
    }
    if ["void", "cancel", "draft"].iter().any(|k| key.contains(k)) {
        return InvoiceStatus::Inactive;
    }
    if ["overdue", "pastdue", "late"].iter().any(|k| key.contains(k)) {
        return InvoiceStatus::Overdue;
    }
    InvoiceStatus::Open
}
