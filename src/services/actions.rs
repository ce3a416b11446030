use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CollectionsError, Result};
use crate::models::{Action, ActionPayload, ActionType, Invoice, InvoiceStatus, Queue};
use crate::services::queue::reprioritize;

const DEFAULT_CHANNEL: &str = "email";

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn apply_transition(invoice: &mut Invoice, action_type: ActionType, at: DateTime<Utc>) {
    match action_type {
        ActionType::Copied | ActionType::Sent => invoice.last_contact_date = Some(at),
        ActionType::Paid => {
            invoice.status = InvoiceStatus::Paid;
            invoice.amount_due = 0.0;
        }
        ActionType::PromiseToPay => {
            invoice.status = InvoiceStatus::Partial;
            invoice.last_contact_date = Some(at);
        }
        ActionType::PromiseBroken => invoice.status = InvoiceStatus::Overdue,
        ActionType::Note => {}
    }
}

/// Records a follow-up against one invoice, applies its status transition and
/// re-ranks the whole queue. Lookups happen before anything is touched, so a
/// failed call leaves the queue unchanged.
pub fn log_action(
    queue: &mut Queue,
    invoice_key: &str,
    action_type: ActionType,
    payload: ActionPayload,
    now: DateTime<Utc>,
) -> Result<Action> {
    let invoice = queue
        .invoice_mut(invoice_key)
        .ok_or_else(|| CollectionsError::InvoiceNotFound(invoice_key.to_string()))?;

    // History timestamps never go backwards, even if the host clock does.
    let timestamp = invoice
        .history
        .last()
        .map(|last| last.timestamp.max(now))
        .unwrap_or(now);

    let action = Action {
        id: Uuid::new_v4().to_string(),
        invoice_key: invoice.invoice_key.clone(),
        action_type,
        tone: clean(payload.tone),
        channel: clean(payload.channel).unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        subject: clean(payload.subject),
        body: clean(payload.body),
        notes: clean(payload.notes),
        timestamp,
    };

    apply_transition(invoice, action_type, timestamp);
    invoice.history.push(action.clone());
    queue.actions.push(action.clone());

    tracing::info!(
        queue_id = %queue.id,
        invoice_key = %action.invoice_key,
        action = %action_type,
        "Action logged"
    );

    reprioritize(queue, now);
    Ok(action)
}
