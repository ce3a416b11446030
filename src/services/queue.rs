use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Action, Invoice, InvoiceStatus, Queue, QueueSummary, RiskTier};
use crate::services::scoring::rank_invoice;

pub const RECENT_ACTIONS_LIMIT: usize = 30;

pub fn new_queue(
    source_file_name: &str,
    source_hash: String,
    invoices: Vec<Invoice>,
    now: DateTime<Utc>,
) -> Queue {
    let mut queue = Queue {
        id: Uuid::new_v4().to_string(),
        source_file_name: source_file_name.to_string(),
        source_hash,
        created_at: now,
        invoices,
        prioritized_invoices: Vec::new(),
        actions: Vec::new(),
        last_prioritized_at: None,
    };
    reprioritize(&mut queue, now);
    queue
}

/// Descending score, then days overdue, then balance.
fn priority_order(a: &Invoice, b: &Invoice) -> Ordering {
    b.priority_score
        .cmp(&a.priority_score)
        .then_with(|| b.days_overdue.cmp(&a.days_overdue))
        .then_with(|| b.amount_due.total_cmp(&a.amount_due))
}

/// Re-scores every invoice (paid and inactive included) and rebuilds the
/// prioritized view from the active ones.
pub fn reprioritize(queue: &mut Queue, now: DateTime<Utc>) {
    for invoice in queue.invoices.iter_mut() {
        rank_invoice(invoice, now);
    }

    let mut active: Vec<Invoice> = queue
        .invoices
        .iter()
        .filter(|inv| inv.is_active())
        .cloned()
        .collect();
    active.sort_by(priority_order);

    queue.prioritized_invoices = active;
    queue.last_prioritized_at = Some(now);
}

pub fn summarize(queue: &Queue) -> QueueSummary {
    let mut summary = QueueSummary {
        active_count: queue.prioritized_invoices.len(),
        high_risk_count: 0,
        medium_risk_count: 0,
        low_risk_count: 0,
        total_amount_due: 0.0,
        amount_by_currency: BTreeMap::new(),
        paid_count: queue
            .invoices
            .iter()
            .filter(|inv| inv.status == InvoiceStatus::Paid)
            .count(),
        last_prioritized_at: queue.last_prioritized_at,
    };

    for invoice in &queue.prioritized_invoices {
        match invoice.risk_tier {
            RiskTier::High => summary.high_risk_count += 1,
            RiskTier::Medium => summary.medium_risk_count += 1,
            RiskTier::Low => summary.low_risk_count += 1,
        }
        summary.total_amount_due += invoice.amount_due;
        *summary
            .amount_by_currency
            .entry(invoice.currency.clone())
            .or_insert(0.0) += invoice.amount_due;
    }

    summary
}

/// Newest first.
pub fn recent_actions(queue: &Queue) -> Vec<Action> {
    queue
        .actions
        .iter()
        .rev()
        .take(RECENT_ACTIONS_LIMIT)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::tests::invoice;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    fn keyed(mut inv: Invoice, key: &str) -> Invoice {
        inv.invoice_id = key.to_string();
        inv.invoice_key = Invoice::make_key(key, &inv.customer_name);
        inv
    }

    #[test]
    fn ties_break_on_days_then_amount() {
        let mut a = invoice(100.0, (2024, 1, 1), None);
        a.priority_score = 80;
        a.days_overdue = 10;
        let mut b = invoice(50.0, (2024, 1, 1), None);
        b.priority_score = 80;
        b.days_overdue = 20;
        assert_eq!(priority_order(&a, &b), Ordering::Greater);

        let mut c = b.clone();
        c.amount_due = 75.0;
        assert_eq!(priority_order(&c, &b), Ordering::Less);
    }

    #[test]
    fn view_holds_only_active_invoices_sorted() {
        let small = keyed(invoice(100.0, (2024, 1, 20), Some("a@b.co")), "SMALL");
        let big = keyed(invoice(12_000.0, (2023, 11, 1), None), "BIG");
        let mut paid = keyed(invoice(500.0, (2024, 1, 1), None), "PAID");
        paid.status = InvoiceStatus::Paid;
        let mut settled = keyed(invoice(0.0, (2024, 1, 1), None), "ZERO");
        settled.status = InvoiceStatus::Open;
        let future = keyed(invoice(900.0, (2024, 6, 1), None), "FUTURE");

        let queue = new_queue(
            "ar.csv",
            "hash".into(),
            vec![small, big, paid, settled, future],
            now(),
        );
        let keys: Vec<&str> = queue
            .prioritized_invoices
            .iter()
            .map(|inv| inv.invoice_id.as_str())
            .collect();
        assert_eq!(keys, vec!["BIG", "SMALL"]);
        assert_eq!(queue.invoices.len(), 5);
        assert_eq!(queue.last_prioritized_at, Some(now()));
        // Inactive invoices still get scored for audit.
        assert!(queue.invoices.iter().all(|inv| !inv.next_action.is_empty()));

        let summary = summarize(&queue);
        assert_eq!(summary.active_count, 2);
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.total_amount_due, 12_100.0);
        assert_eq!(summary.amount_by_currency.get("USD"), Some(&12_100.0));
        assert_eq!(
            summary.high_risk_count + summary.medium_risk_count + summary.low_risk_count,
            2
        );
    }

    #[test]
    fn reprioritize_is_idempotent() {
        let mut queue = new_queue(
            "ar.csv",
            "hash".into(),
            vec![
                keyed(invoice(3_000.0, (2023, 12, 1), None), "A"),
                keyed(invoice(3_000.0, (2023, 12, 1), Some("x@y.z")), "B"),
                keyed(invoice(40.0, (2024, 1, 28), None), "C"),
            ],
            now(),
        );
        reprioritize(&mut queue, now());
        let first_view = queue.prioritized_invoices.clone();
        let first_summary = summarize(&queue);
        reprioritize(&mut queue, now());
        assert_eq!(queue.prioritized_invoices, first_view);
        assert_eq!(summarize(&queue), first_summary);
    }

    #[test]
    fn per_currency_breakdown() {
        let mut eur = keyed(invoice(200.0, (2024, 1, 1), None), "E");
        eur.currency = "EUR".into();
        let usd = keyed(invoice(300.0, (2024, 1, 1), None), "U");
        let queue = new_queue("ar.json", "hash".into(), vec![eur, usd], now());
        let summary = summarize(&queue);
        assert_eq!(summary.amount_by_currency.get("EUR"), Some(&200.0));
        assert_eq!(summary.amount_by_currency.get("USD"), Some(&300.0));
        assert_eq!(summary.total_amount_due, 500.0);
    }
}
