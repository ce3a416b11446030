pub mod actions;
pub mod drafts;
pub mod fields;
pub mod normalizer;
pub mod openai;
pub mod pdf_fields;
pub mod processor;
pub mod queue;
pub mod scoring;
pub mod state;
pub mod tabular;
pub mod text_extraction;
