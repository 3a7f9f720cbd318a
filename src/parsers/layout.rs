use super::patterns::{contains_keyword, find_dimensions, strip_label, tidy};
use super::RecordParser;
use crate::types::{DocumentType, LayoutNote, OcrLine, Record, RecordBody};

const ROOM_LABELS: &[&str] = &["room", "area"];
const DIMENSION_LABELS: &[&str] = &["dimensions", "dimension", "measurements", "measurement", "size"];
/// Labels whose value is added to the current room's notes.
const DETAIL_LABELS: &[&str] = &[
    "layout changes",
    "changes",
    "features",
    "feature",
    "updates",
    "update",
    "adjacent",
    "status",
    "condition",
    "notes",
    "note",
    "comments",
    "comment",
];
/// Page titles, never rooms.
const TITLES: &[&str] = &["property layout", "layout notes", "floor plan"];

/// Floor-plan notes: `<room> <dimensions> <notes>` per line, with label lines
/// (`Dimensions:`, `Status:`, `Notes:`, ...) and bullets attached to the room above.
pub struct LayoutParser;

impl RecordParser for LayoutParser {
    fn document_type(&self) -> DocumentType {
        DocumentType::Layout
    }

    fn parse(&self, lines: &[OcrLine], source_image: &str) -> Vec<Record> {
        let mut records: Vec<Record> = Vec::new();
        for line in lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }

            if let Some(value) = strip_label(text, DIMENSION_LABELS) {
                if let Some(room) = current_room(&mut records) {
                    match find_dimensions(value) {
                        Some(found) if room.dimensions.is_none() => room.dimensions = Some(found.value),
                        _ => add_note(room, format!("{}: {}", label_of(text), tidy(value))),
                    }
                }
                continue;
            }
            if let Some(value) = strip_label(text, DETAIL_LABELS) {
                let value = tidy(value);
                if let Some(room) = current_room(&mut records) {
                    if !value.is_empty() {
                        add_note(room, format!("{}: {}", label_of(text), value));
                    }
                }
                continue;
            }
            if is_bullet(text) && find_dimensions(text).is_none() {
                if let Some(room) = current_room(&mut records) {
                    add_note(room, tidy(text));
                    continue;
                }
            }
            if is_title(text) {
                continue;
            }

            if let Some(note) = parse_line(text) {
                records.push(Record {
                    source_image: source_image.to_string(),
                    confidence: line.confidence,
                    body: RecordBody::Layout(note),
                });
            }
        }
        records
    }
}

fn current_room(records: &mut [Record]) -> Option<&mut LayoutNote> {
    match records.last_mut() {
        Some(Record {
            body: RecordBody::Layout(note),
            ..
        }) => Some(note),
        _ => None,
    }
}

fn add_note(room: &mut LayoutNote, note: String) {
    if note.is_empty() {
        return;
    }
    if !room.notes.is_empty() {
        room.notes.push_str("; ");
    }
    room.notes.push_str(&note);
}

/// The label as written, e.g. `Status` from `Status: In progress`.
fn label_of(text: &str) -> &str {
    let head = text.trim_start();
    let end = head.find(|c| c == ':' || c == '=').unwrap_or(head.len());
    head[..end].trim()
}

fn is_bullet(text: &str) -> bool {
    text.starts_with(|c| matches!(c, '-' | '*' | '•'))
}

fn is_title(text: &str) -> bool {
    find_dimensions(text).is_none()
        && strip_label(text, ROOM_LABELS).is_none()
        && TITLES.iter().any(|t| contains_keyword(text, t))
}

fn parse_line(raw: &str) -> Option<LayoutNote> {
    let text = strip_label(raw, ROOM_LABELS).unwrap_or(raw).trim();

    let (room_name, dimensions, notes) = match find_dimensions(text) {
        Some(found) => (
            tidy(&text[..found.range.start]),
            Some(found.value),
            tidy(&text[found.range.end..]),
        ),
        None => (tidy(text), None, String::new()),
    };

    // leading token must look like a name, not a stray number or mark
    if !room_name.chars().next().is_some_and(char::is_alphabetic) {
        return None;
    }

    Some(LayoutNote {
        room_name,
        dimensions,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::lines;

    fn parse(texts: &[&str]) -> Vec<LayoutNote> {
        LayoutParser
            .parse(&lines(texts), "property_layout.jpg")
            .into_iter()
            .map(|r| match r.body {
                RecordBody::Layout(n) => n,
                other => panic!("unexpected record {:?}", other),
            })
            .collect()
    }

    #[test]
    fn room_dimensions_and_notes() {
        let notes = parse(&["Kitchen 12x15 ft needs new flooring"]);
        assert_eq!(
            notes,
            vec![LayoutNote {
                room_name: "Kitchen".into(),
                dimensions: Some("12x15 ft".into()),
                notes: "needs new flooring".into(),
            }]
        );
    }

    #[test]
    fn line_without_dimensions_is_a_room() {
        let notes = parse(&["Room: Florida Room - sliding doors"]);
        assert_eq!(notes[0].room_name, "Florida Room - sliding doors");
        assert_eq!(notes[0].dimensions, None);
        assert_eq!(notes[0].notes, "");
    }

    #[test]
    fn lines_without_leading_name_are_dropped() {
        let notes = parse(&["12x15", "--- ", "", "Master Bedroom 14' x 16', walk-in closet"]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].room_name, "Master Bedroom");
        assert_eq!(notes[0].dimensions.as_deref(), Some("14' x 16'"));
        assert_eq!(notes[0].notes, "walk-in closet");
    }

    #[test]
    fn label_lines_attach_to_the_room_above() {
        let notes = parse(&["Room: Kitchen", "Dimensions: 12' x 15'", "Status: In progress", "Notes: replace tile"]);
        assert_eq!(
            notes,
            vec![LayoutNote {
                room_name: "Kitchen".into(),
                dimensions: Some("12' x 15'".into()),
                notes: "Status: In progress; Notes: replace tile".into(),
            }]
        );
    }

    #[test]
    fn sectioned_layout_notes() {
        let notes = parse(&[
            "Property Layout Notes",
            "Room: Kitchen",
            "Dimensions: 12' x 15'",
            "Layout Changes:",
            "- Move sink to island",
            "- Extend counter on east wall",
            "Room: Master Bathroom",
            "Dimensions: 8' x 10'",
            "Updates:",
            "- Replace tub with walk-in shower",
            "- Heated floors",
            "Adjacent: Master Bedroom",
            "Status: In progress",
        ]);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].room_name, "Kitchen");
        assert_eq!(notes[0].dimensions.as_deref(), Some("12' x 15'"));
        assert_eq!(notes[0].notes, "Move sink to island; Extend counter on east wall");
        assert_eq!(notes[1].room_name, "Master Bathroom");
        assert_eq!(notes[1].dimensions.as_deref(), Some("8' x 10'"));
        assert_eq!(
            notes[1].notes,
            "Replace tub with walk-in shower; Heated floors; Adjacent: Master Bedroom; Status: In progress"
        );
    }

    #[test]
    fn labels_before_any_room_are_dropped() {
        let notes = parse(&["Status: draft", "Size: 10x12", "Garage 20x20 ft"]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].room_name, "Garage");
        assert_eq!(notes[0].notes, "");
    }
}
