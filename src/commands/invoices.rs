use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{CollectionsError, Result};
use crate::models::{
    ActionPayload, ActionType, DraftsResponse, IngestResponse, LogActionResponse,
};
use crate::services::actions;
use crate::services::drafts::compose_drafts;
use crate::services::processor::build_queue;
use crate::services::queue::{recent_actions, reprioritize, summarize};
use crate::services::state::{lock_queue, AppState};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogActionPayload {
    pub queue_id: String,
    pub invoice_key: String,
    pub action_type: String,
    #[serde(flatten)]
    pub details: ActionPayload,
}

pub fn ingest(
    state: &AppState,
    bytes: &[u8],
    file_name: &str,
    media_type: Option<&str>,
    now: DateTime<Utc>,
) -> Result<IngestResponse> {
    let queue = build_queue(bytes, file_name, media_type, state.workbook_reader.as_ref(), now)?;
    let response = IngestResponse {
        queue_id: queue.id.clone(),
        source_file_name: queue.source_file_name.clone(),
        summary: summarize(&queue),
        prioritized_invoices: queue.prioritized_invoices.clone(),
    };
    state.repository.put(queue)?;
    Ok(response)
}

/// The queue lock is released before the generator is awaited.
pub async fn get_drafts(
    state: &AppState,
    queue_id: &str,
    invoice_key: &str,
    now: DateTime<Utc>,
) -> Result<DraftsResponse> {
    let invoice = {
        let handle = state.queue(queue_id)?;
        let mut queue = lock_queue(&handle)?;
        reprioritize(&mut queue, now);
        queue
            .invoice(invoice_key)
            .cloned()
            .ok_or_else(|| CollectionsError::InvoiceNotFound(invoice_key.to_string()))?
    };

    let (drafts, source) = compose_drafts(&invoice, state.generator.as_deref()).await;
    tracing::info!(queue_id = %queue_id, invoice_key = %invoice_key, source = ?source, "Drafts composed");
    Ok(DraftsResponse {
        invoice_key: invoice.invoice_key,
        drafts,
        source,
    })
}

pub fn log_action(
    state: &AppState,
    payload: LogActionPayload,
    now: DateTime<Utc>,
) -> Result<LogActionResponse> {
    let missing: Vec<&str> = [
        ("queueId", payload.queue_id.trim()),
        ("invoiceKey", payload.invoice_key.trim()),
        ("actionType", payload.action_type.trim()),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(CollectionsError::MissingRequiredFields(missing.join(", ")));
    }

    let action_type: ActionType = payload.action_type.parse()?;
    let handle = state.queue(&payload.queue_id)?;
    let mut queue = lock_queue(&handle)?;

    actions::log_action(&mut queue, &payload.invoice_key, action_type, payload.details, now)?;

    let invoice = queue
        .invoice(&payload.invoice_key)
        .cloned()
        .ok_or_else(|| CollectionsError::InvoiceNotFound(payload.invoice_key.clone()))?;
    Ok(LogActionResponse {
        invoice,
        summary: summarize(&queue),
        prioritized_invoices: queue.prioritized_invoices.clone(),
        recent_actions: recent_actions(&queue),
    })
}
