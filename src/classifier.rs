use crate::types::DocumentType;
use std::collections::BTreeMap;

/// Name-driven document classification. No content inspection, no fuzzy matching.
#[derive(Debug, Clone, Default)]
pub struct DocumentClassifier {
    mappings: BTreeMap<String, DocumentType>,
    forced: Option<DocumentType>,
}

impl DocumentClassifier {
    pub fn new(mappings: BTreeMap<String, DocumentType>) -> Self {
        Self {
            mappings,
            forced: None,
        }
    }

    /// Classify every image as `doc_type`, ignoring the table.
    pub fn with_override(mut self, doc_type: Option<DocumentType>) -> Self {
        self.forced = doc_type;
        self
    }

    /// `None` means the file name has no mapping.
    pub fn classify(&self, file_name: &str) -> Option<DocumentType> {
        self.forced.or_else(|| self.mappings.get(file_name).copied())
    }

    pub fn mapped_names(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> DocumentClassifier {
        let mut map = BTreeMap::new();
        map.insert("financial_notes.jpg".to_string(), DocumentType::Financial);
        map.insert("task_checklist.jpg".to_string(), DocumentType::Task);
        DocumentClassifier::new(map)
    }

    #[test]
    fn table_lookup_is_exact() {
        let c = classifier();
        assert_eq!(c.classify("financial_notes.jpg"), Some(DocumentType::Financial));
        assert_eq!(c.classify("Financial_Notes.JPG"), None);
        assert_eq!(c.classify("unknown.jpg"), None);
        assert_eq!(c.mapped_names().count(), 2);
    }

    #[test]
    fn override_wins() {
        let c = classifier().with_override(Some(DocumentType::Layout));
        assert_eq!(c.classify("financial_notes.jpg"), Some(DocumentType::Layout));
        assert_eq!(c.classify("unknown.jpg"), Some(DocumentType::Layout));
    }
}
