pub mod layout;
pub mod patterns;
pub mod task;
pub mod transaction;

use crate::config::ParsingConfig;
use crate::types::{DocumentType, OcrLine, Record};

pub use layout::LayoutParser;
pub use task::TaskParser;
pub use transaction::TransactionParser;

/// Turns reconstructed OCR lines of one image into typed records.
pub trait RecordParser {
    fn document_type(&self) -> DocumentType;

    fn parse(&self, lines: &[OcrLine], source_image: &str) -> Vec<Record>;
}

pub fn parser_for(doc_type: DocumentType, parsing: &ParsingConfig) -> Box<dyn RecordParser> {
    match doc_type {
        DocumentType::Financial => Box::new(TransactionParser),
        DocumentType::Task => Box::new(TaskParser::new(parsing.moving_day)),
        DocumentType::Layout => Box::new(LayoutParser),
    }
}

#[cfg(test)]
pub(crate) fn lines(texts: &[&str]) -> Vec<OcrLine> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| OcrLine {
            key: crate::types::LineKey {
                page: 1,
                block: 1,
                paragraph: 1,
                line: i as u32 + 1,
            },
            text: t.to_string(),
            confidence: 90.0,
        })
        .collect()
}
