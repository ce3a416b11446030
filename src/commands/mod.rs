pub mod dashboard;
pub mod invoices;
