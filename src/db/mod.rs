use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{CollectionsError, Result};
use crate::models::Queue;

/// Shared handle to one queue. Holding the lock serializes every read and
/// mutation of that queue.
pub type QueueHandle = Arc<Mutex<Queue>>;

/// Keyed queue store. Persistence stays behind this trait.
pub trait QueueRepository: Send + Sync {
    fn get(&self, queue_id: &str) -> Result<Option<QueueHandle>>;
    fn put(&self, queue: Queue) -> Result<QueueHandle>;
    fn ids(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryRepository {
    queues: Mutex<HashMap<String, QueueHandle>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueRepository for MemoryRepository {
    fn get(&self, queue_id: &str) -> Result<Option<QueueHandle>> {
        let queues = self.queues.lock().map_err(|_| CollectionsError::LockPoisoned)?;
        Ok(queues.get(queue_id).cloned())
    }

    fn put(&self, queue: Queue) -> Result<QueueHandle> {
        let id = queue.id.clone();
        let handle = Arc::new(Mutex::new(queue));
        let mut queues = self.queues.lock().map_err(|_| CollectionsError::LockPoisoned)?;
        queues.insert(id, handle.clone());
        Ok(handle)
    }

    fn ids(&self) -> Result<Vec<String>> {
        let queues = self.queues.lock().map_err(|_| CollectionsError::LockPoisoned)?;
        let mut ids: Vec<String> = queues.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn queue(id: &str) -> Queue {
        Queue {
            id: id.to_string(),
            source_file_name: "ar.csv".into(),
            source_hash: String::new(),
            created_at: Utc::now(),
            invoices: Vec::new(),
            prioritized_invoices: Vec::new(),
            actions: Vec::new(),
            last_prioritized_at: None,
        }
    }

    #[test]
    fn put_then_get_shares_the_handle() {
        let repo = MemoryRepository::new();
        let handle = repo.put(queue("q1")).unwrap();
        handle.lock().unwrap().source_file_name = "renamed.csv".into();

        let fetched = repo.get("q1").unwrap().unwrap();
        assert_eq!(fetched.lock().unwrap().source_file_name, "renamed.csv");
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[test]
    fn ids_are_sorted() {
        let repo = MemoryRepository::new();
        repo.put(queue("b")).unwrap();
        repo.put(queue("a")).unwrap();
        assert_eq!(repo.ids().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
