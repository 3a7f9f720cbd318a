use super::patterns::{find_date, find_keyword, lookup, tidy};
use super::RecordParser;
use crate::types::{DocumentType, OcrLine, Priority, Record, RecordBody, Task, TaskStatus};
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

const ROOMS: &[(&str, &[&str])] = &[
    ("Kitchen", &["kitchen", "cabinets", "countertop", "countertops", "sink", "stove", "oven", "dishwasher"]),
    ("Dining Room", &["dining room", "dining"]),
    ("Florida Room", &["florida room", "sunroom"]),
    ("Living Room", &["living room", "family room", "living"]),
    ("Laundry Room", &["laundry", "washer", "dryer"]),
    ("Master Bedroom", &["master bedroom", "master"]),
    ("Bedroom", &["bedroom", "mattress", "bed frame"]),
    ("Bathroom", &["bathroom", "toilet", "shower", "bathtub", "vanity"]),
    ("Garage", &["garage", "driveway"]),
    ("Closet", &["closet"]),
    ("Pantry", &["pantry"]),
];

const HIGH_KEYWORDS: &[&str] = &["urgent", "asap", "critical", "important"];
const LOW_KEYWORDS: &[&str] = &["optional", "later", "eventually", "nice to have"];

/// Section headers of a moving checklist and their offset in days before moving day.
const TIMELINE: &[(&str, i64)] = &[
    ("two months before", 60),
    ("one month before", 30),
    ("three weeks before", 21),
    ("two weeks before", 14),
    ("one week before", 7),
    ("few days before", 3),
    ("last few days", 3),
    ("moving day", 0),
    ("few days after", -7),
    ("after moving", -7),
];

/// Words allowed after a timeline phrase on a header line.
const HEADER_FILLER: &[&str] = &["your", "the", "move", "moving", "home", "day", "days", "before", "after", "to", "of"];

const LIST_HEADERS: &[&str] = &["checklist", "to-do list", "to do list", "todo list", "todo", "to-do", "tasks", "task list"];

static DONE_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();
static PRIORITY_RE: OnceLock<Regex> = OnceLock::new();
static DUE_PREFIX_RE: OnceLock<Regex> = OnceLock::new();

fn done_re() -> &'static Regex {
    DONE_RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:\[\s*[x✓✔]\s*\]|\(\s*[x✓✔]\s*\)|[✓✔☑✅]|(?:done|completed?)\b\s*[:\-]?)\s*")
            .expect("done marker regex")
    })
}

fn bullet_re() -> &'static Regex {
    BULLET_RE.get_or_init(|| Regex::new(r"^\s*(?:\[\s*\]|\(\s*\)|☐|[-*•])\s*").expect("bullet regex"))
}

fn priority_re() -> &'static Regex {
    PRIORITY_RE.get_or_init(|| {
        Regex::new(r"(?i)\bpriority\s*[:=]?\s*(high|medium|med|low)\b|\b(high|medium|med|low)\s+priority\b")
            .expect("priority regex")
    })
}

fn due_prefix_re() -> &'static Regex {
    DUE_PREFIX_RE.get_or_init(|| Regex::new(r"(?i)\b(?:due\s+by|due|by)\s*:?\s*$").expect("due prefix regex"))
}

/// Checklists and to-do notes: one task per non-empty line.
pub struct TaskParser {
    moving_day: Option<NaiveDate>,
}

impl TaskParser {
    pub fn new(moving_day: Option<NaiveDate>) -> Self {
        Self { moving_day }
    }
}

struct Section {
    header: String,
    offset_days: i64,
}

impl RecordParser for TaskParser {
    fn document_type(&self) -> DocumentType {
        DocumentType::Task
    }

    fn parse(&self, lines: &[OcrLine], source_image: &str) -> Vec<Record> {
        let mut records = Vec::new();
        let mut section: Option<Section> = None;

        for line in lines {
            let text = line.text.trim();
            if text.is_empty() || is_list_header(text) {
                continue;
            }
            if let Some(s) = timeline_header(text) {
                section = Some(s);
                continue;
            }
            if let Some(mut task) = parse_line(text) {
                if let Some(s) = &section {
                    task.notes = format!("Timeline: {}", s.header);
                    if task.due_date.is_none() {
                        task.due_date = self
                            .moving_day
                            .map(|day| (day - Duration::days(s.offset_days)).format("%Y-%m-%d").to_string());
                    }
                }
                records.push(Record {
                    source_image: source_image.to_string(),
                    confidence: line.confidence,
                    body: RecordBody::Task(task),
                });
            }
        }
        records
    }
}

fn is_list_header(text: &str) -> bool {
    let cleaned = tidy(text).to_lowercase();
    LIST_HEADERS.contains(&cleaned.as_str())
        || (cleaned.ends_with("checklist") && cleaned.split_whitespace().count() <= 3)
}

fn timeline_header(text: &str) -> Option<Section> {
    if done_re().is_match(text) || bullet_re().is_match(text) || find_date(text).is_some() {
        return None;
    }
    let header = tidy(text);
    let lower = header.to_lowercase();
    TIMELINE.iter().find_map(|(phrase, offset)| {
        let rest = lower.strip_prefix(phrase)?;
        let only_filler = rest
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .all(|w| HEADER_FILLER.contains(&w));
        only_filler.then(|| Section {
            header: header.clone(),
            offset_days: *offset,
        })
    })
}

fn parse_line(raw: &str) -> Option<Task> {
    let (status, mut text) = match done_re().find(raw) {
        Some(m) => (TaskStatus::Done, raw[m.end()..].to_string()),
        None => {
            let rest = bullet_re().find(raw).map_or(raw, |m| &raw[m.end()..]);
            (TaskStatus::Pending, rest.to_string())
        }
    };

    let mut due_date = None;
    if let Some(found) = find_date(&text) {
        let start = due_prefix_re()
            .find(&text[..found.range.start])
            .map_or(found.range.start, |m| m.start());
        text.replace_range(start..found.range.end, " ");
        due_date = Some(found.value);
    }

    let mut priority = None;
    let explicit = priority_re().captures(&text).and_then(|caps| {
        let whole = caps.get(0)?.range();
        let level = caps.get(1).or_else(|| caps.get(2))?.as_str().to_lowercase();
        Some((whole, level))
    });
    if let Some((range, level)) = explicit {
        priority = Some(match level.as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        });
        text.replace_range(range, " ");
    }
    for (level, keywords) in [(Priority::High, HIGH_KEYWORDS), (Priority::Low, LOW_KEYWORDS)] {
        for k in keywords {
            while let Some(range) = find_keyword(&text, k) {
                priority.get_or_insert(level);
                text.replace_range(range, " ");
            }
        }
    }

    let task_name = tidy(&text);
    if task_name.is_empty() {
        return None;
    }
    let category = lookup(&task_name, ROOMS).map(str::to_string);

    Some(Task {
        task_name,
        status,
        priority,
        due_date,
        category,
        notes: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::lines;

    fn parse_with(moving_day: Option<NaiveDate>, texts: &[&str]) -> Vec<Task> {
        TaskParser::new(moving_day)
            .parse(&lines(texts), "task_checklist.jpg")
            .into_iter()
            .map(|r| match r.body {
                RecordBody::Task(t) => t,
                other => panic!("unexpected record {:?}", other),
            })
            .collect()
    }

    fn parse(texts: &[&str]) -> Vec<Task> {
        parse_with(None, texts)
    }

    #[test]
    fn checked_task_with_priority_and_due_date() {
        let tasks = parse(&["[x] Buy lumber - high priority due 04/01/2024"]);
        assert_eq!(tasks.len(), 1);
        let t = &tasks[0];
        assert_eq!(t.task_name, "Buy lumber");
        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.priority, Some(Priority::High));
        assert_eq!(t.due_date.as_deref(), Some("04/01/2024"));
    }

    #[test]
    fn pending_by_default_and_priority_unset() {
        let tasks = parse(&["[ ] Paint kitchen walls", "- Call electrician by 5/2/24", "done: fix toilet"]);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].task_name, "Paint kitchen walls");
        assert_eq!(tasks[0].priority, None);
        assert_eq!(tasks[0].category.as_deref(), Some("Kitchen"));

        assert_eq!(tasks[1].task_name, "Call electrician");
        assert_eq!(tasks[1].due_date.as_deref(), Some("5/2/24"));
        assert_eq!(tasks[1].category, None);

        assert_eq!(tasks[2].status, TaskStatus::Done);
        assert_eq!(tasks[2].task_name, "fix toilet");
        assert_eq!(tasks[2].category.as_deref(), Some("Bathroom"));
    }

    #[test]
    fn priority_keywords() {
        let tasks = parse(&["Replace garage door ASAP", "Hang shelves eventually", "priority: med seal grout"]);
        assert_eq!(tasks[0].priority, Some(Priority::High));
        assert_eq!(tasks[0].task_name, "Replace garage door");
        assert_eq!(tasks[1].priority, Some(Priority::Low));
        assert_eq!(tasks[2].priority, Some(Priority::Medium));
        assert_eq!(tasks[2].task_name, "seal grout");
    }

    #[test]
    fn keyword_only_lines_are_discarded() {
        let tasks = parse(&["[x] urgent", "✓", "high priority", "Checklist", "Fix sink"]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_name, "Fix sink");
    }

    #[test]
    fn timeline_headers_set_notes_and_due_dates() {
        let moving_day = NaiveDate::from_ymd_opt(2025, 11, 15);
        let tasks = parse_with(
            moving_day,
            &[
                "One Week Before Your Move:",
                "Pack bedroom closet",
                "Confirm movers due 11/10/2025",
                "Moving Day",
                "Walk through living room",
            ],
        );
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].notes, "Timeline: One Week Before Your Move");
        assert_eq!(tasks[0].due_date.as_deref(), Some("2025-11-08"));
        assert_eq!(tasks[1].due_date.as_deref(), Some("11/10/2025"));
        assert_eq!(tasks[2].notes, "Timeline: Moving Day");
        assert_eq!(tasks[2].due_date.as_deref(), Some("2025-11-15"));
    }

    #[test]
    fn timeline_phrase_inside_a_task_is_still_a_task() {
        let tasks = parse(&["Moving day: pick up keys from agent"]);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].notes, "");
        assert!(tasks[0].task_name.contains("pick up keys"));
    }
}
