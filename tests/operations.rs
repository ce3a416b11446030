use std::io::Write;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use collections_engine::models::{ActionPayload, DraftSource, InvoiceStatus, RiskTier};
use collections_engine::{
    get_drafts, get_queue, ingest, list_queues, log_action, AppState, CalamineReader,
    CollectionsError, ErrorKind, LogActionPayload, MemoryRepository, TextGenerator,
};

struct StubGenerator(Result<String, String>);

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
        self.0.clone().map_err(|e| anyhow!(e))
    }
}

fn state_with(generator: Option<Arc<dyn TextGenerator>>) -> AppState {
    AppState::new(
        Arc::new(MemoryRepository::new()),
        generator,
        Arc::new(CalamineReader),
    )
}

fn state() -> AppState {
    state_with(None)
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn action(queue_id: &str, invoice_key: &str, action_type: &str) -> LogActionPayload {
    LogActionPayload {
        queue_id: queue_id.to_string(),
        invoice_key: invoice_key.to_string(),
        action_type: action_type.to_string(),
        details: ActionPayload::default(),
    }
}

const SCENARIO_CSV: &str = "invoiceId,customerName,customerEmail,amountDue,dueDate,status\n\
INV-1,Acme,billing@acme.com,1500,2024-01-01,overdue\n";

#[test]
fn csv_row_becomes_one_active_invoice() {
    let state = state();
    let response = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, at(2024, 2, 1)).unwrap();

    assert_eq!(response.prioritized_invoices.len(), 1);
    let inv = &response.prioritized_invoices[0];
    assert_eq!(inv.invoice_key, "INV-1::Acme");
    assert_eq!(inv.days_overdue, 31);
    // 31 * 0.6 + 6 + 5 rounds to 30.
    assert_eq!(inv.priority_score, 30);
    assert_eq!(inv.risk_tier, RiskTier::Low);
    assert_eq!(response.summary.active_count, 1);
    assert_eq!(response.summary.total_amount_due, 1500.0);
}

#[test]
fn json_row_without_email_scores_amount_and_email_bonus() {
    let state = state();
    let json = r#"[{"invoiceId":"A1","customerName":"X","amountDue":20000,"dueDate":"2024-01-01"}]"#;
    let response = ingest(&state, json.as_bytes(), "ar.json", None, at(2024, 1, 10)).unwrap();

    let inv = &response.prioritized_invoices[0];
    assert_eq!(inv.days_overdue, 9);
    // 9 * 0.6 + 20 (amount tier) + 10 (no email) + 5 (never contacted)
    assert_eq!(inv.priority_score, 40);
    assert!(inv.risk_reasons.iter().any(|r| r == "No email on file"));
    assert!(inv.risk_reasons.iter().any(|r| r == "Balance of 5,000 or more"));
}

#[test]
fn broken_promise_shows_on_next_read() {
    let state = state();
    let now = at(2024, 2, 1);
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, now)
        .unwrap()
        .queue_id;

    log_action(&state, action(&queue_id, "INV-1::Acme", "promise_to_pay"), now).unwrap();
    log_action(&state, action(&queue_id, "INV-1::Acme", "promise_broken"), now + Duration::days(5))
        .unwrap();

    let view = get_queue(&state, &queue_id, now + Duration::days(6)).unwrap();
    let inv = &view.prioritized_invoices[0];
    assert_eq!(inv.status, InvoiceStatus::Overdue);
    assert!(inv.risk_reasons.iter().any(|r| r == "Broken payment promise"));
    assert_eq!(view.recent_actions.len(), 2);
    assert_eq!(view.recent_actions[0].action_type.as_str(), "promise_broken");
}

#[tokio::test]
async fn invalid_generator_output_still_yields_three_drafts() {
    let generator: Arc<dyn TextGenerator> = Arc::new(StubGenerator(Ok("{\"friendly\": oops".into())));
    let state = state_with(Some(generator));
    let now = at(2024, 2, 1);
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, now)
        .unwrap()
        .queue_id;

    let response = get_drafts(&state, &queue_id, "INV-1::Acme", now).await.unwrap();
    assert_eq!(response.source, DraftSource::Fallback);
    let drafts = response.drafts;
    let all = [&drafts.friendly, &drafts.firm, &drafts.final_notice];
    assert!(all.iter().all(|d| !d.subject.is_empty() && !d.body.is_empty()));
    assert_ne!(drafts.friendly, drafts.firm);
    assert_ne!(drafts.firm, drafts.final_notice);
    assert!(drafts.friendly.body.contains("INV-1"));
}

#[tokio::test]
async fn generator_failure_is_absorbed() {
    let generator: Arc<dyn TextGenerator> = Arc::new(StubGenerator(Err("timeout".into())));
    let state = state_with(Some(generator));
    let now = at(2024, 2, 1);
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, now)
        .unwrap()
        .queue_id;
    let response = get_drafts(&state, &queue_id, "INV-1::Acme", now).await.unwrap();
    assert_eq!(response.source, DraftSource::Fallback);
}

#[tokio::test]
async fn drafts_report_missing_targets() {
    let state = state();
    let now = at(2024, 2, 1);
    assert!(matches!(
        get_drafts(&state, "nope", "INV-1::Acme", now).await,
        Err(CollectionsError::QueueNotFound(_))
    ));
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, now)
        .unwrap()
        .queue_id;
    assert!(matches!(
        get_drafts(&state, &queue_id, "INV-2::Acme", now).await,
        Err(CollectionsError::InvoiceNotFound(_))
    ));
}

#[test]
fn paid_invoice_leaves_the_queue_view() {
    let state = state();
    let now = at(2024, 2, 1);
    let csv = "Invoice #,Client,Balance,Due Date,Status\n\
               A-1,Acme,\"12,000.00\",2023-11-15,overdue\n\
               B-2,Globex,250,2024-01-20,open\n";
    let queue_id = ingest(&state, csv.as_bytes(), "ar.csv", None, now).unwrap().queue_id;

    let response = log_action(&state, action(&queue_id, "A-1::Acme", "paid"), now).unwrap();
    assert_eq!(response.invoice.status, InvoiceStatus::Paid);
    assert_eq!(response.invoice.amount_due, 0.0);
    assert_eq!(response.prioritized_invoices.len(), 1);
    assert_eq!(response.prioritized_invoices[0].invoice_key, "B-2::Globex");
    assert_eq!(response.summary.paid_count, 1);
    assert_eq!(response.summary.total_amount_due, 250.0);
}

#[test]
fn log_action_validation_errors() {
    let state = state();
    let now = at(2024, 2, 1);
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, now)
        .unwrap()
        .queue_id;

    let err = log_action(&state, action("", "INV-1::Acme", ""), now).unwrap_err();
    match err {
        CollectionsError::MissingRequiredFields(fields) => {
            assert_eq!(fields, "queueId, actionType");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = log_action(&state, action(&queue_id, "INV-1::Acme", "called"), now).unwrap_err();
    assert!(matches!(err, CollectionsError::InvalidActionType(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = log_action(&state, action("missing", "INV-1::Acme", "sent"), now).unwrap_err();
    assert!(matches!(err, CollectionsError::QueueNotFound(_)));

    let err = log_action(&state, action(&queue_id, "INV-9::Acme", "sent"), now).unwrap_err();
    assert!(matches!(err, CollectionsError::InvoiceNotFound(_)));

    // Nothing was recorded by the failed calls.
    assert!(get_queue(&state, &queue_id, now).unwrap().recent_actions.is_empty());
}

#[test]
fn ingest_errors_are_typed() {
    let state = state();
    let now = at(2024, 2, 1);

    let err = ingest(&state, b"", "ar.csv", None, now).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyResult);

    let err = ingest(&state, b"hello", "notes.docx", None, now).unwrap_err();
    assert!(matches!(err, CollectionsError::UnsupportedFormat(_)));
    assert_eq!(err.kind(), ErrorKind::InputFormat);

    let paid_only = "invoice,customer,amount,due,status\nP-1,Acme,100,2024-01-01,paid in full\n";
    let err = ingest(&state, paid_only.as_bytes(), "ar.csv", None, now).unwrap_err();
    assert!(matches!(err, CollectionsError::NoActionableInvoices));

    assert!(list_queues(&state).unwrap().is_empty());
}

#[test]
fn queue_view_moves_with_the_clock() {
    let state = state();
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, at(2024, 2, 1))
        .unwrap()
        .queue_id;

    let later = get_queue(&state, &queue_id, at(2024, 3, 15)).unwrap();
    let inv = &later.prioritized_invoices[0];
    assert_eq!(inv.days_overdue, 74);
    assert_eq!(later.summary.last_prioritized_at, Some(at(2024, 3, 15)));

    let again = get_queue(&state, &queue_id, at(2024, 3, 15)).unwrap();
    assert_eq!(again.prioritized_invoices, later.prioritized_invoices);
    assert_eq!(again.summary, later.summary);
}

#[test]
fn concurrent_actions_on_one_queue_are_serialized() {
    let state = Arc::new(state());
    let now = at(2024, 2, 1);
    let queue_id = ingest(&state, SCENARIO_CSV.as_bytes(), "ar.csv", None, now)
        .unwrap()
        .queue_id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let state = state.clone();
            let queue_id = queue_id.clone();
            std::thread::spawn(move || {
                log_action(&state, action(&queue_id, "INV-1::Acme", "note"), now).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let view = get_queue(&state, &queue_id, now).unwrap();
    assert_eq!(view.recent_actions.len(), 8);
    assert_eq!(view.prioritized_invoices[0].history.len(), 8);
}

#[test]
fn workbook_dates_drive_days_overdue() {
    let state = state();
    let bytes = include_bytes!("fixtures/receivables.xlsx");
    let response = ingest(&state, bytes, "receivables.xlsx", None, at(2024, 2, 1)).unwrap();

    let inv = &response.prioritized_invoices[0];
    assert_eq!(inv.invoice_key, "X-1::Acme");
    assert_eq!(inv.amount_due, 1500.0);
    assert_eq!(inv.due_date, chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(inv.days_overdue, 31);
}

fn flate_pdf(content: &str) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.5\n4 0 obj\n<< /Length ");
    pdf.extend_from_slice(compressed.len().to_string().as_bytes());
    pdf.extend_from_slice(b" /Filter /FlateDecode >>\nstream\r\n");
    pdf.extend_from_slice(&compressed);
    pdf.extend_from_slice(b"\r\nendstream\nendobj\n%%EOF\n");
    pdf
}

#[test]
fn compressed_pdf_invoice_is_ingested() {
    let content = "BT\n\
        (Invoice Number: 2024-0042) Tj\n\
        (Invoice Date: 12/01/2023) Tj\n\
        (Due Date: 12/31/2023) Tj\n\
        (Bill To: Stark Industries) Tj\n\
        (ap@stark.example.com) Tj\n\
        (Subtotal: $9,000.00) Tj\n\
        (Amount Due: $9,450.00) Tj\n\
        ET";
    let state = state();
    let response = ingest(&state, &flate_pdf(content), "stark-dec.pdf", None, at(2024, 2, 1)).unwrap();

    assert_eq!(response.prioritized_invoices.len(), 1);
    let inv = &response.prioritized_invoices[0];
    assert_eq!(inv.invoice_id, "2024-0042");
    assert_eq!(inv.customer_name, "Stark Industries");
    assert_eq!(inv.customer_email.as_deref(), Some("ap@stark.example.com"));
    assert_eq!(inv.amount_due, 9450.0);
    assert_eq!(inv.currency, "USD");
    assert_eq!(inv.days_overdue, 32);
    assert_eq!(inv.status, InvoiceStatus::Overdue);
}

#[test]
fn paid_pdf_is_not_actionable() {
    let content = "BT (Invoice Number: 77) Tj (Amount Due: $100.00) Tj (Due Date: 01/01/2024) Tj (PAID IN FULL) Tj ET";
    let state = state();
    let err = ingest(&state, &flate_pdf(content), "paid.pdf", None, at(2024, 2, 1)).unwrap_err();
    assert!(matches!(err, CollectionsError::NoActionableInvoices));
}
