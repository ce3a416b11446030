use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{Invoice, RiskTier};
use crate::services::fields::{FieldResolver, ResolvedFields};
use crate::services::tabular::RawRow;
use crate::utils::{days_overdue, normalize_status, parse_currency, parse_date, parse_money};

pub const MAX_ROWS: usize = 2000;
const UNKNOWN_CUSTOMER: &str = "Unknown customer";

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub invoices: Vec<Invoice>,
    pub rows_considered: usize,
    pub rows_discarded: usize,
    pub duplicates_merged: usize,
}

/// Builds canonical invoices from decoded rows, dropping anything that is not
/// collectible today, then collapses rows sharing an invoice key.
pub fn normalize_rows(rows: &[RawRow], now: DateTime<Utc>) -> NormalizeOutcome {
    let considered = rows.len().min(MAX_ROWS);
    if rows.len() > MAX_ROWS {
        tracing::warn!(rows = rows.len(), limit = MAX_ROWS, "Row limit reached, ignoring the rest");
    }

    let mut outcome = NormalizeOutcome {
        rows_considered: considered,
        ..Default::default()
    };
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for (row_number, row) in rows.iter().take(MAX_ROWS).enumerate() {
        let fields = FieldResolver::resolve(row);
        let Some(candidate) = build_candidate(fields, row_number, now) else {
            outcome.rows_discarded += 1;
            continue;
        };

        match index_by_key.get(&candidate.invoice_key) {
            Some(&idx) => {
                outcome.duplicates_merged += 1;
                if supersedes(&candidate, &outcome.invoices[idx]) {
                    outcome.invoices[idx] = candidate;
                }
            }
            None => {
                index_by_key.insert(candidate.invoice_key.clone(), outcome.invoices.len());
                outcome.invoices.push(candidate);
            }
        }
    }

    tracing::debug!(
        considered = outcome.rows_considered,
        kept = outcome.invoices.len(),
        discarded = outcome.rows_discarded,
        merged = outcome.duplicates_merged,
        "Rows normalized"
    );
    outcome
}

/// Greater days overdue wins; ties go to the larger balance.
fn supersedes(candidate: &Invoice, existing: &Invoice) -> bool {
    candidate.days_overdue > existing.days_overdue
        || (candidate.days_overdue == existing.days_overdue
            && candidate.amount_due > existing.amount_due)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn build_candidate(fields: ResolvedFields, row_number: usize, now: DateTime<Utc>) -> Option<Invoice> {
    let due_date = parse_date(fields.due_date.as_deref().unwrap_or_default())?;
    let overdue = days_overdue(due_date, now);
    let amount_raw = fields.amount_due.clone().unwrap_or_default();
    let amount_due = parse_money(&amount_raw);
    let status = normalize_status(fields.status.as_deref().unwrap_or_default());

    if overdue <= 0 || amount_due <= 0.0 || !status.is_collectible() {
        return None;
    }

    let invoice_id =
        non_empty(fields.invoice_id).unwrap_or_else(|| format!("ROW-{}", row_number + 1));
    let customer_name = non_empty(fields.customer_name).unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string());
    let customer_email = non_empty(fields.customer_email).filter(|email| email.contains('@'));
    let inferred_currency = parse_currency(&amount_raw, "USD");
    let currency = match non_empty(fields.currency) {
        Some(raw) => parse_currency(&raw, &inferred_currency),
        None => inferred_currency,
    };
    let last_contact_date = fields
        .last_contact_date
        .as_deref()
        .and_then(parse_date)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    Some(Invoice {
        invoice_key: Invoice::make_key(&invoice_id, &customer_name),
        invoice_id,
        customer_name,
        customer_email,
        amount_due,
        currency,
        due_date,
        issue_date: fields.issue_date.as_deref().and_then(parse_date),
        status,
        last_contact_date,
        notes: non_empty(fields.notes).unwrap_or_default(),
        history: Vec::new(),
        days_overdue: overdue,
        priority_score: 0,
        risk_tier: RiskTier::Low,
        risk_reasons: Vec::new(),
        next_action: String::new(),
    })
}
