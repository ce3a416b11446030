pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use commands::dashboard::{get_queue, list_queues};
pub use commands::invoices::{get_drafts, ingest, log_action, LogActionPayload};
pub use config::Settings;
pub use db::{MemoryRepository, QueueHandle, QueueRepository};
pub use error::{CollectionsError, ErrorKind, Result};
pub use services::openai::{OpenAiClient, TextGenerator};
pub use services::state::AppState;
pub use services::tabular::{CalamineReader, WorkbookReader};
