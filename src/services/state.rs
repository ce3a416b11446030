use std::sync::{Arc, MutexGuard};

use anyhow::Result;

use crate::config::Settings;
use crate::db::{MemoryRepository, QueueHandle, QueueRepository};
use crate::error::{CollectionsError, Result as CollectionsResult};
use crate::models::Queue;
use crate::services::openai::{OpenAiClient, TextGenerator};
use crate::services::tabular::{CalamineReader, WorkbookReader};

/// Collaborators shared by every operation.
pub struct AppState {
    pub repository: Arc<dyn QueueRepository>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub workbook_reader: Arc<dyn WorkbookReader>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn QueueRepository>,
        generator: Option<Arc<dyn TextGenerator>>,
        workbook_reader: Arc<dyn WorkbookReader>,
    ) -> Self {
        AppState {
            repository,
            generator,
            workbook_reader,
        }
    }

    /// In-memory store, calamine workbooks and an OpenAI client when a key is set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let generator = OpenAiClient::from_settings(settings)?
            .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);
        if generator.is_none() {
            tracing::info!("No OpenAI API key configured, drafts will use templates");
        }
        Ok(Self::new(
            Arc::new(MemoryRepository::new()),
            generator,
            Arc::new(CalamineReader),
        ))
    }

    pub fn queue(&self, queue_id: &str) -> CollectionsResult<QueueHandle> {
        self.repository
            .get(queue_id)?
            .ok_or_else(|| CollectionsError::QueueNotFound(queue_id.to_string()))
    }
}

pub fn lock_queue(handle: &QueueHandle) -> CollectionsResult<MutexGuard<'_, Queue>> {
    handle.lock().map_err(|_| CollectionsError::LockPoisoned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_follows_api_key() {
        let state = AppState::from_settings(&Settings::default()).unwrap();
        assert!(state.generator.is_none());

        let keyed = Settings {
            openai_api_key: Some("sk-test".into()),
            ..Settings::default()
        };
        assert!(AppState::from_settings(&keyed).unwrap().generator.is_some());
    }

    #[test]
    fn unknown_queue_is_typed() {
        let state = AppState::from_settings(&Settings::default()).unwrap();
        assert!(matches!(state.queue("missing"), Err(CollectionsError::QueueNotFound(_))));
    }
}
