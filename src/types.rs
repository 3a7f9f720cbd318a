use serde::{Deserialize, Serialize};
use std::fmt;

/// One word recognised by the OCR engine, with its place in the page hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub page: u32,
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
    pub word: u32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// 0-100; -1 marks non-text regions.
    pub confidence: f32,
    pub text: String,
}

impl Detection {
    pub fn line_key(&self) -> LineKey {
        LineKey {
            page: self.page,
            block: self.block,
            paragraph: self.paragraph,
            line: self.line,
        }
    }
}

/// (page, block, paragraph, line). Ordering is document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub page: u32,
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

/// A reconstructed text line: words of one LineKey joined left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub key: LineKey,
    pub text: String,
    /// Mean confidence of the words on the line.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[serde(alias = "transactions", alias = "budget")]
    Financial,
    #[serde(alias = "tasks", alias = "checklist")]
    Task,
    #[serde(alias = "property_layout")]
    Layout,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [DocumentType::Financial, DocumentType::Task, DocumentType::Layout];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Financial => "financial",
            DocumentType::Task => "task",
            DocumentType::Layout => "layout",
        }
    }

    /// Worksheet used when the configuration does not name one.
    pub fn default_worksheet(&self) -> &'static str {
        match self {
            DocumentType::Financial => "Budget & Expenses",
            DocumentType::Task => "Task Tracker",
            DocumentType::Layout => "Property Layout",
        }
    }

    /// Column headers of a record row, without the upload timestamp column.
    pub fn record_headers(&self) -> &'static [&'static str] {
        match self {
            DocumentType::Financial => &[
                "Source File",
                "Transaction Date",
                "Description",
                "Amount",
                "Category",
                "Payment Method",
                "Vendor",
                "Status",
                "OCR Confidence",
            ],
            DocumentType::Task => &[
                "Source File",
                "Task",
                "Status",
                "Priority",
                "Due Date",
                "Category",
                "Notes",
                "OCR Confidence",
            ],
            DocumentType::Layout => &[
                "Source File",
                "Room/Area Name",
                "Dimensions",
                "Notes",
                "OCR Confidence",
            ],
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "financial" | "transactions" | "budget" => Ok(DocumentType::Financial),
            "task" | "tasks" | "checklist" => Ok(DocumentType::Task),
            "layout" | "property_layout" => Ok(DocumentType::Layout),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    #[default]
    Append,
    Replace,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Append => f.write_str("append"),
            UploadMode::Replace => f.write_str("replace"),
        }
    }
}

impl std::str::FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(UploadMode::Append),
            "replace" => Ok(UploadMode::Replace),
            other => Err(format!("unknown upload mode '{}' (append or replace)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: Option<String>,
    pub description: String,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub vendor: Option<String>,
    /// Paid / Pending / Reimbursed / Disputed when written on the line.
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_name: String,
    pub status: TaskStatus,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub category: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutNote {
    pub room_name: String,
    pub dimensions: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordBody {
    Transaction(Transaction),
    Task(Task),
    Layout(LayoutNote),
}

/// One parsed output row plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source_image: String,
    /// Mean OCR confidence of the source line.
    pub confidence: f64,
    pub body: RecordBody,
}

impl Record {
    pub fn document_type(&self) -> DocumentType {
        match self.body {
            RecordBody::Transaction(_) => DocumentType::Financial,
            RecordBody::Task(_) => DocumentType::Task,
            RecordBody::Layout(_) => DocumentType::Layout,
        }
    }

    /// Cell values in the order of `DocumentType::record_headers`.
    pub fn cells(&self) -> Vec<String> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let confidence = format!("{:.1}", self.confidence);
        let mut cells = vec![self.source_image.clone()];
        match &self.body {
            RecordBody::Transaction(t) => {
                cells.push(opt(&t.date));
                cells.push(t.description.clone());
                cells.push(t.amount.map(|a| format!("{:.2}", a)).unwrap_or_default());
                cells.push(opt(&t.category));
                cells.push(opt(&t.payment_method));
                cells.push(opt(&t.vendor));
                cells.push(opt(&t.status));
            }
            RecordBody::Task(t) => {
                cells.push(t.task_name.clone());
                cells.push(t.status.as_str().to_string());
                cells.push(t.priority.map(|p| p.as_str().to_string()).unwrap_or_default());
                cells.push(opt(&t.due_date));
                cells.push(opt(&t.category));
                cells.push(t.notes.clone());
            }
            RecordBody::Layout(l) => {
                cells.push(l.room_name.clone());
                cells.push(opt(&l.dimensions));
                cells.push(l.notes.clone());
            }
        }
        cells.push(confidence);
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_line_up_with_headers() {
        let records = [
            Record {
                source_image: "a.jpg".into(),
                confidence: 91.3,
                body: RecordBody::Transaction(Transaction {
                    date: Some("03/15/2024".into()),
                    description: "Paint supplies".into(),
                    amount: Some(45.99),
                    category: Some("Materials".into()),
                    payment_method: None,
                    vendor: None,
                    status: None,
                }),
            },
            Record {
                source_image: "b.jpg".into(),
                confidence: 80.0,
                body: RecordBody::Task(Task {
                    task_name: "Buy lumber".into(),
                    status: TaskStatus::Done,
                    priority: Some(Priority::High),
                    due_date: None,
                    category: None,
                    notes: String::new(),
                }),
            },
            Record {
                source_image: "c.jpg".into(),
                confidence: 70.0,
                body: RecordBody::Layout(LayoutNote {
                    room_name: "Kitchen".into(),
                    dimensions: Some("12x15 ft".into()),
                    notes: String::new(),
                }),
            },
        ];
        for record in &records {
            assert_eq!(record.cells().len(), record.document_type().record_headers().len());
        }
        assert_eq!(records[0].cells()[3], "45.99");
        assert_eq!(records[0].cells()[8], "91.3");
    }

    #[test]
    fn document_type_parses_aliases() {
        assert_eq!("Budget".parse::<DocumentType>(), Ok(DocumentType::Financial));
        assert_eq!("tasks".parse::<DocumentType>(), Ok(DocumentType::Task));
        assert!("receipt".parse::<DocumentType>().is_err());
        assert_eq!("Replace".parse::<UploadMode>(), Ok(UploadMode::Replace));
        assert!("overwrite".parse::<UploadMode>().is_err());
    }
}
