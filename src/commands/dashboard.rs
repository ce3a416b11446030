use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::QueueView;
use crate::services::queue::{recent_actions, reprioritize, summarize};
use crate::services::state::{lock_queue, AppState};

/// Re-ranks at `now` before reading; days overdue move with the clock.
pub fn get_queue(state: &AppState, queue_id: &str, now: DateTime<Utc>) -> Result<QueueView> {
    let handle = state.queue(queue_id)?;
    let mut queue = lock_queue(&handle)?;
    reprioritize(&mut queue, now);

    Ok(QueueView {
        queue_id: queue.id.clone(),
        summary: summarize(&queue),
        prioritized_invoices: queue.prioritized_invoices.clone(),
        recent_actions: recent_actions(&queue),
    })
}

pub fn list_queues(state: &AppState) -> Result<Vec<String>> {
    state.repository.ids()
}
