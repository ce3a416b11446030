//! Priority and risk scoring. Everything here is a pure function of the
//! invoice and the supplied `now`; nothing stored on the invoice is trusted.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Action, ActionType, Invoice, InvoiceStatus, RiskTier};
use crate::utils::{age_in_days, days_overdue};

const OVERDUE_CAP_DAYS: i64 = 120;
const OVERDUE_WEIGHT: f64 = 0.6;
const NO_EMAIL_BONUS: f64 = 10.0;
const PARTIAL_BONUS: f64 = 7.0;
const STALE_CONTACT_DAYS: i64 = 14;
const STALE_CONTACT_BONUS: f64 = 8.0;
const NEVER_CONTACTED_BONUS: f64 = 5.0;
const FIRM_REMINDER_WINDOW_DAYS: i64 = 7;

pub const REASON_LONG_OVERDUE: &str = "30+ days overdue";
pub const REASON_HIGH_BALANCE: &str = "Balance of 5,000 or more";
pub const REASON_NO_EMAIL: &str = "No email on file";
pub const REASON_BROKEN_PROMISE: &str = "Broken payment promise";
pub const REASON_DEFAULT: &str = "Normal overdue monitoring";

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub days_overdue: i64,
    pub priority_score: u8,
    pub risk_tier: RiskTier,
    pub risk_reasons: Vec<String>,
    pub next_action: String,
}

fn amount_tier_bonus(amount: f64) -> f64 {
    match amount {
        a if a >= 10_000.0 => 20.0,
        a if a >= 5_000.0 => 14.0,
        a if a >= 2_500.0 => 10.0,
        a if a >= 1_000.0 => 6.0,
        a if a > 0.0 => 2.0,
        _ => 0.0,
    }
}

pub fn history_weight(history: &[Action], now: DateTime<Utc>) -> f64 {
    let count = |kind: ActionType| history.iter().filter(|a| a.action_type == kind).count() as f64;

    let mut weight = 7.0 * count(ActionType::Sent) + 3.0 * count(ActionType::Copied)
        + 18.0 * count(ActionType::PromiseBroken)
        - 6.0 * count(ActionType::PromiseToPay);

    if history.iter().any(|a| a.action_type == ActionType::Paid) {
        weight -= 100.0;
    }
    if let Some(latest) = history.iter().map(|a| a.timestamp).max() {
        if now.signed_duration_since(latest) <= Duration::days(1) {
            weight -= 8.0;
        }
    }
    weight
}

fn next_action(tier: RiskTier, now: DateTime<Utc>) -> String {
    match tier {
        RiskTier::Low => "Send a friendly reminder".to_string(),
        RiskTier::Medium => format!(
            "Send a firm reminder asking for payment by {}",
            (now + Duration::days(FIRM_REMINDER_WINDOW_DAYS)).format("%b %d, %Y")
        ),
        RiskTier::High => "Escalate: send a final notice before collections".to_string(),
    }
}

pub fn score_invoice(invoice: &Invoice, now: DateTime<Utc>) -> Ranking {
    let overdue = days_overdue(invoice.due_date, now);

    let mut score = overdue.min(OVERDUE_CAP_DAYS) as f64 * OVERDUE_WEIGHT;
    score += amount_tier_bonus(invoice.amount_due);
    if invoice.customer_email.is_none() {
        score += NO_EMAIL_BONUS;
    }
    if invoice.status == InvoiceStatus::Partial {
        score += PARTIAL_BONUS;
    }
    match invoice.last_contact_date {
        Some(contacted) if age_in_days(contacted, now) >= STALE_CONTACT_DAYS => {
            score += STALE_CONTACT_BONUS
        }
        Some(_) => {}
        None => score += NEVER_CONTACTED_BONUS,
    }
    score += history_weight(&invoice.history, now);

    let priority_score = score.round().clamp(0.0, 100.0) as u8;
    let risk_tier = RiskTier::from_score(priority_score);

    let mut risk_reasons = Vec::new();
    if overdue >= 30 {
        risk_reasons.push(REASON_LONG_OVERDUE.to_string());
    }
    if invoice.amount_due >= 5_000.0 {
        risk_reasons.push(REASON_HIGH_BALANCE.to_string());
    }
    if invoice.customer_email.is_none() {
        risk_reasons.push(REASON_NO_EMAIL.to_string());
    }
    if invoice
        .history
        .iter()
        .any(|a| a.action_type == ActionType::PromiseBroken)
    {
        risk_reasons.push(REASON_BROKEN_PROMISE.to_string());
    }
    if risk_reasons.is_empty() {
        risk_reasons.push(REASON_DEFAULT.to_string());
    }

    Ranking {
        days_overdue: overdue,
        priority_score,
        risk_tier,
        risk_reasons,
        next_action: next_action(risk_tier, now),
    }
}

/// Overwrites the derived fields with a fresh ranking.
pub fn rank_invoice(invoice: &mut Invoice, now: DateTime<Utc>) {
    let ranking = score_invoice(invoice, now);
    invoice.days_overdue = ranking.days_overdue;
    invoice.priority_score = ranking.priority_score;
    invoice.risk_tier = ranking.risk_tier;
    invoice.risk_reasons = ranking.risk_reasons;
    invoice.next_action = ranking.next_action;
}
