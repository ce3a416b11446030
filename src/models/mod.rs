use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollectionsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Overdue,
    Partial,
    Paid,
    Inactive,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Overdue => "overdue",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Inactive => "inactive",
        }
    }

    /// Statuses that still warrant a follow-up.
    pub fn is_collectible(&self) -> bool {
        matches!(self, Self::Open | Self::Overdue | Self::Partial)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::High
        } else if score >= 40 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Copied,
    Sent,
    Paid,
    PromiseToPay,
    PromiseBroken,
    Note,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        Self::Copied,
        Self::Sent,
        Self::Paid,
        Self::PromiseToPay,
        Self::PromiseBroken,
        Self::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copied => "copied",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::PromiseToPay => "promise_to_pay",
            Self::PromiseBroken => "promise_broken",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = CollectionsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| CollectionsError::InvalidActionType(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub invoice_key: String,
    pub action_type: ActionType,
    pub tone: Option<String>,
    pub channel: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied details for a logged follow-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionPayload {
    pub tone: Option<String>,
    pub channel: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_id: String,
    pub invoice_key: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub amount_due: f64,
    pub currency: String,
    pub due_date: NaiveDate,
    pub issue_date: Option<NaiveDate>,
    pub status: InvoiceStatus,
    pub last_contact_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub history: Vec<Action>,
    pub days_overdue: i64,
    pub priority_score: u8,
    pub risk_tier: RiskTier,
    pub risk_reasons: Vec<String>,
    pub next_action: String,
}

impl Invoice {
    pub fn make_key(invoice_id: &str, customer_name: &str) -> String {
        format!("{}::{}", invoice_id, customer_name)
    }

    /// Uses the cached `days_overdue`, so only meaningful right after a scoring pass.
    pub fn is_active(&self) -> bool {
        self.status.is_collectible() && self.amount_due > 0.0 && self.days_overdue > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: String,
    pub source_file_name: String,
    pub source_hash: String,
    pub created_at: DateTime<Utc>,
    pub invoices: Vec<Invoice>,
    pub prioritized_invoices: Vec<Invoice>,
    pub actions: Vec<Action>,
    pub last_prioritized_at: Option<DateTime<Utc>>,
}

impl Queue {
    pub fn invoice(&self, invoice_key: &str) -> Option<&Invoice> {
        self.invoices.iter().find(|inv| inv.invoice_key == invoice_key)
    }

    pub fn invoice_mut(&mut self, invoice_key: &str) -> Option<&mut Invoice> {
        self.invoices.iter_mut().find(|inv| inv.invoice_key == invoice_key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub active_count: usize,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
    pub total_amount_due: f64,
    pub amount_by_currency: BTreeMap<String, f64>,
    pub paid_count: usize,
    pub last_prioritized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drafts {
    pub friendly: Draft,
    pub firm: Draft,
    #[serde(rename = "final")]
    pub final_notice: Draft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftSource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub queue_id: String,
    pub source_file_name: String,
    pub summary: QueueSummary,
    pub prioritized_invoices: Vec<Invoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftsResponse {
    pub invoice_key: String,
    pub drafts: Drafts,
    pub source: DraftSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActionResponse {
    pub invoice: Invoice,
    pub summary: QueueSummary,
    pub prioritized_invoices: Vec<Invoice>,
    pub recent_actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueView {
    pub queue_id: String,
    pub summary: QueueSummary,
    pub prioritized_invoices: Vec<Invoice>,
    pub recent_actions: Vec<Action>,
}
