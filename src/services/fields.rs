use std::collections::HashSet;

use crate::services::tabular::RawRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    InvoiceId,
    CustomerName,
    CustomerEmail,
    AmountDue,
    Currency,
    DueDate,
    IssueDate,
    Status,
    LastContactDate,
    Notes,
}

impl CanonicalField {
    /// Resolution order. Dates and email go before the broad name/id aliases so
    /// a column like "Invoice Date" is claimed by a date field first.
    pub const ALL: [CanonicalField; 10] = [
        Self::DueDate,
        Self::IssueDate,
        Self::LastContactDate,
        Self::CustomerEmail,
        Self::AmountDue,
        Self::Currency,
        Self::Status,
        Self::Notes,
        Self::CustomerName,
        Self::InvoiceId,
    ];

    /// Normalized (lower-case alphanumeric) header aliases, most specific first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::InvoiceId => &[
                "invoiceid", "invoicenumber", "invoiceno", "invoicenum", "invoice", "invnumber",
                "invno", "inv", "documentnumber", "docnumber", "reference", "refno", "ref", "number",
                "id",
            ],
            Self::CustomerName => &[
                "customername", "customer", "clientname", "client", "companyname", "company",
                "accountname", "account", "billto", "debtor", "payer", "name",
            ],
            Self::CustomerEmail => &[
                "customeremail", "email", "emailaddress", "billingemail", "contactemail",
                "clientemail", "mail",
            ],
            Self::AmountDue => &[
                "amountdue", "balancedue", "balance", "outstandingamount", "amountoutstanding",
                "outstanding", "openamount", "totaldue", "amount", "totalamount", "total",
            ],
            Self::Currency => &["currency", "currencycode", "ccy", "curr"],
            Self::DueDate => &["duedate", "paymentduedate", "datedue", "dueon", "dueby", "due"],
            Self::IssueDate => &[
                "issuedate", "invoicedate", "issued", "dateissued", "billdate", "documentdate",
                "date",
            ],
            Self::Status => &["status", "invoicestatus", "paymentstatus", "state"],
            Self::LastContactDate => &[
                "lastcontactdate", "lastcontact", "lastcontacted", "lastfollowup",
                "lastreminder", "lastreminderdate",
            ],
            Self::Notes => &["notes", "note", "comments", "comment", "memo", "remarks"],
        }
    }
}

/// Canonical values pulled from one row. Raw headers stop here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFields {
    pub invoice_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub amount_due: Option<String>,
    pub currency: Option<String>,
    pub due_date: Option<String>,
    pub issue_date: Option<String>,
    pub status: Option<String>,
    pub last_contact_date: Option<String>,
    pub notes: Option<String>,
}

impl ResolvedFields {
    fn slot(&mut self, field: CanonicalField) -> &mut Option<String> {
        match field {
            CanonicalField::InvoiceId => &mut self.invoice_id,
            CanonicalField::CustomerName => &mut self.customer_name,
            CanonicalField::CustomerEmail => &mut self.customer_email,
            CanonicalField::AmountDue => &mut self.amount_due,
            CanonicalField::Currency => &mut self.currency,
            CanonicalField::DueDate => &mut self.due_date,
            CanonicalField::IssueDate => &mut self.issue_date,
            CanonicalField::Status => &mut self.status,
            CanonicalField::LastContactDate => &mut self.last_contact_date,
            CanonicalField::Notes => &mut self.notes,
        }
    }
}

pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub struct FieldResolver;

impl FieldResolver {
    /// Exact alias matches are claimed for every field before any fuzzy
    /// substring match runs; a column feeds at most one field.
    pub fn resolve(row: &RawRow) -> ResolvedFields {
        let cells: Vec<(String, &str)> = row
            .iter()
            .map(|(key, value)| (normalize_header(key), value.trim()))
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .collect();

        let mut resolved = ResolvedFields::default();
        let mut claimed: HashSet<usize> = HashSet::new();

        for field in CanonicalField::ALL {
            let exact = field.aliases().iter().find_map(|alias| {
                cells
                    .iter()
                    .position(|(key, _)| key == alias)
                    .filter(|idx| !claimed.contains(idx))
            });
            if let Some(idx) = exact {
                claimed.insert(idx);
                *resolved.slot(field) = Some(cells[idx].1.to_string());
            }
        }

        for field in CanonicalField::ALL {
            if resolved.slot(field).is_some() {
                continue;
            }
            let fuzzy = field.aliases().iter().find_map(|alias| {
                cells.iter().enumerate().position(|(idx, (key, _))| {
                    !claimed.contains(&idx) && fuzzy_match(key, alias)
                })
            });
            if let Some(idx) = fuzzy {
                claimed.insert(idx);
                *resolved.slot(field) = Some(cells[idx].1.to_string());
            }
        }

        resolved
    }
}

fn fuzzy_match(key: &str, alias: &str) -> bool {
    key.contains(alias) || (key.len() >= 3 && alias.contains(key))
}
