use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionsError {
    #[error("Uploaded file is empty or contains no invoice rows")]
    EmptyFile,

    #[error("Uploaded file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not read file: {0}")]
    CorruptFile(String),

    #[error("No actionable invoices found (need open, overdue or partial invoices with a positive balance past their due date)")]
    NoActionableInvoices,

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Invalid action type: {0}")]
    InvalidActionType(String),

    #[error("Missing required fields: {0}")]
    MissingRequiredFields(String),

    #[error("Queue lock poisoned")]
    LockPoisoned,
}

/// Coarse grouping used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputFormat,
    EmptyResult,
    NotFound,
    Validation,
    Internal,
}

impl CollectionsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileTooLarge { .. } | Self::UnsupportedFormat(_) | Self::CorruptFile(_) => {
                ErrorKind::InputFormat
            }
            Self::EmptyFile | Self::NoActionableInvoices => ErrorKind::EmptyResult,
            Self::QueueNotFound(_) | Self::InvoiceNotFound(_) => ErrorKind::NotFound,
            Self::InvalidActionType(_) | Self::MissingRequiredFields(_) => ErrorKind::Validation,
            Self::LockPoisoned => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectionsError>;
