//! Follow-up message drafting.
//!
//! The generator is asked for three tone variants as one JSON object. Anything
//! short of a schema-valid answer falls back to fixed templates, so callers
//! always get three drafts.

use jsonschema::JSONSchema;
use serde_json::{json, Value};

use crate::models::{Draft, DraftSource, Drafts, Invoice};
use crate::services::openai::TextGenerator;
use crate::utils::format_amount;

pub const HISTORY_PROMPT_LIMIT: usize = 5;

fn system_prompt() -> String {
    r#"You write accounts-receivable follow-up emails. Return JSON only, shaped exactly as:
{"friendly": {"subject": "...", "body": "..."},
 "firm": {"subject": "...", "body": "..."},
 "final": {"subject": "...", "body": "..."}}
- friendly: polite reminder, assume an oversight
- firm: clear request with a specific pay-by expectation
- final: final notice before the account is escalated to collections
Keep each body under 160 words. Do not invent facts that are not in the invoice details.
"#
    .to_string()
}

pub fn build_prompt(invoice: &Invoice) -> String {
    let mut prompt = format!(
        "Invoice details:\n\
         - Invoice ID: {}\n\
         - Customer: {}\n\
         - Email: {}\n\
         - Amount due: {} {}\n\
         - Days overdue: {}\n\
         - Risk tier: {}\n\
         - Suggested next action: {}\n",
        invoice.invoice_id,
        invoice.customer_name,
        invoice.customer_email.as_deref().unwrap_or("Not provided"),
        format_amount(invoice.amount_due),
        invoice.currency,
        invoice.days_overdue,
        invoice.risk_tier,
        invoice.next_action,
    );

    let skip = invoice.history.len().saturating_sub(HISTORY_PROMPT_LIMIT);
    let recent = &invoice.history[skip..];
    if recent.is_empty() {
        prompt.push_str("Follow-up history: none\n");
    } else {
        prompt.push_str("Follow-up history (oldest first):\n");
        for action in recent {
            prompt.push_str(&format!(
                "- {} {}",
                action.timestamp.format("%Y-%m-%d"),
                action.action_type
            ));
            if let Some(tone) = &action.tone {
                prompt.push_str(&format!(" ({} tone)", tone));
            }
            if let Some(notes) = &action.notes {
                prompt.push_str(&format!(": {}", notes));
            }
            prompt.push('\n');
        }
    }
    prompt
}

fn drafts_schema() -> Option<JSONSchema> {
    let draft = json!({
        "type": "object",
        "required": ["subject", "body"],
        "properties": {
            "subject": {"type": "string", "pattern": "\\S"},
            "body": {"type": "string", "pattern": "\\S"}
        }
    });
    let schema = json!({
        "type": "object",
        "required": ["friendly", "firm", "final"],
        "properties": {
            "friendly": draft,
            "firm": draft,
            "final": draft
        }
    });

    match JSONSchema::compile(&schema) {
        Ok(compiled) => Some(compiled),
        Err(e) => {
            tracing::error!(error = %e, "Draft schema failed to compile");
            None
        }
    }
}

/// Models sometimes wrap JSON in a markdown fence despite the response format.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// `None` unless every tone has a non-blank string subject and body.
pub fn parse_drafts(raw: &str) -> Option<Drafts> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let schema = drafts_schema()?;
    if !schema.is_valid(&value) {
        return None;
    }
    let drafts: Drafts = serde_json::from_value(value).ok()?;
    Some(Drafts {
        friendly: trimmed(drafts.friendly),
        firm: trimmed(drafts.firm),
        final_notice: trimmed(drafts.final_notice),
    })
}

fn trimmed(draft: Draft) -> Draft {
    Draft {
        subject: draft.subject.trim().to_string(),
        body: draft.body.trim().to_string(),
    }
}

pub fn fallback_drafts(invoice: &Invoice) -> Drafts {
    let id = &invoice.invoice_id;
    let customer = &invoice.customer_name;
    let amount = format!("{} {}", format_amount(invoice.amount_due), invoice.currency);
    let days = invoice.days_overdue;

    Drafts {
        friendly: Draft {
            subject: format!("Friendly reminder: invoice {} is past due", id),
            body: format!(
                "Hi {customer},\n\n\
                 I hope all is well. This is a quick reminder that invoice {id} for {amount} \
                 is now {days} days past due. If payment is already on its way, please \
                 disregard this note. Otherwise, could you let us know when we can expect it?\n\n\
                 Thank you!"
            ),
        },
        firm: Draft {
            subject: format!("Payment required: invoice {} ({} days overdue)", id, days),
            body: format!(
                "Hello {customer},\n\n\
                 Invoice {id} for {amount} is {days} days overdue and remains unpaid despite \
                 earlier reminders. Please arrange payment within the next 7 days, or reply \
                 with a firm payment date so we can update our records.\n\n\
                 Regards"
            ),
        },
        final_notice: Draft {
            subject: format!("Final notice: invoice {} before collections", id),
            body: format!(
                "Dear {customer},\n\n\
                 This is a final notice regarding invoice {id} for {amount}, now {days} days \
                 past due. Unless payment is received or an arrangement is agreed promptly, \
                 the account will be referred for collections without further notice.\n\n\
                 Sincerely"
            ),
        },
    }
}

/// Never fails: generator errors and malformed answers both end in the
/// template drafts.
pub async fn compose_drafts(
    invoice: &Invoice,
    generator: Option<&dyn TextGenerator>,
) -> (Drafts, DraftSource) {
    let Some(generator) = generator else {
        tracing::debug!(invoice_key = %invoice.invoice_key, "No text generator configured, using templates");
        return (fallback_drafts(invoice), DraftSource::Fallback);
    };

    match generator.generate(&system_prompt(), &build_prompt(invoice)).await {
        Ok(raw) => match parse_drafts(&raw) {
            Some(drafts) => (drafts, DraftSource::Generated),
            None => {
                tracing::warn!(invoice_key = %invoice.invoice_key, "Generated drafts failed validation, using templates");
                (fallback_drafts(invoice), DraftSource::Fallback)
            }
        },
        Err(e) => {
            tracing::warn!(invoice_key = %invoice.invoice_key, error = %e, "Draft generation failed, using templates");
            (fallback_drafts(invoice), DraftSource::Fallback)
        }
    }
}
