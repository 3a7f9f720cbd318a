//! Shared regexes and keyword helpers for the line parsers.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

static DATE_RE: OnceLock<Regex> = OnceLock::new();
static AMOUNT_RE: OnceLock<Regex> = OnceLock::new();
static DIMENSION_RE: OnceLock<Regex> = OnceLock::new();

const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

const UNIT: &str = r#"(?:\s?(?:sq\.?\s?ft|ft|feet|foot|inches|inch|cm|mm|m)\b\.?|'|")"#;

fn date_re() -> &'static Regex {
    DATE_RE.get_or_init(|| {
        let pattern = format!(
            r"(?i)\b(?:\d{{4}}-\d{{1,2}}-\d{{1,2}}|\d{{1,2}}[/-]\d{{1,2}}[/-](?:\d{{4}}|\d{{2}})|(?:{})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}})\b",
            MONTHS
        );
        Regex::new(&pattern).expect("date regex")
    })
}

fn amount_re() -> &'static Regex {
    AMOUNT_RE.get_or_init(|| {
        Regex::new(
            r"[$€£]\s?\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|[$€£]\s?\d+(?:\.\d{1,2})?|\b\d{1,3}(?:,\d{3})+\.\d{2}\b|\b\d+\.\d{2}\b",
        )
        .expect("amount regex")
    })
}

fn dimension_re() -> &'static Regex {
    DIMENSION_RE.get_or_init(|| {
        let num = r"\d+(?:\.\d+)?";
        let pattern = format!(
            r"(?i)\b{num}{unit}?\s*[x×]\s*{num}{unit}?(?:\s*[x×]\s*{num}{unit}?)?",
            num = num,
            unit = UNIT
        );
        Regex::new(&pattern).expect("dimension regex")
    })
}

/// A matched substring and its byte range in the searched text.
#[derive(Debug, Clone, PartialEq)]
pub struct Found<T> {
    pub range: Range<usize>,
    pub value: T,
}

/// First date in the text, kept as written.
pub fn find_date(text: &str) -> Option<Found<String>> {
    date_re().find(text).map(|m| Found {
        range: m.range(),
        value: m.as_str().to_string(),
    })
}

/// Leftmost money amount, parsed after stripping symbol, commas and spaces.
pub fn find_amount(text: &str) -> Option<Found<f64>> {
    amount_re().find_iter(text).find_map(|m| {
        parse_amount(m.as_str()).map(|value| Found {
            range: m.range(),
            value,
        })
    })
}

pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

/// Room dimensions such as `12x15 ft`, `10' x 12'` or `3 x 4 x 2.5 m`, kept as written.
pub fn find_dimensions(text: &str) -> Option<Found<String>> {
    dimension_re().find(text).map(|m| Found {
        range: m.range(),
        value: m.as_str().trim_end().to_string(),
    })
}

/// Byte range of the first case-insensitive whole-word occurrence of `keyword`.
pub fn find_keyword(text: &str, keyword: &str) -> Option<Range<usize>> {
    if keyword.is_empty() {
        return None;
    }
    let lower = text.to_ascii_lowercase();
    let needle = keyword.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = lower[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = lower[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some(start..end);
        }
        from = start + lower[start..].chars().next().map_or(1, |c| c.len_utf8());
    }
    None
}

pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    find_keyword(text, keyword).is_some()
}

/// First table entry with any keyword present in the text.
pub fn lookup<'a>(text: &str, table: &[(&'a str, &[&str])]) -> Option<&'a str> {
    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_keyword(text, k)))
        .map(|(label, _)| *label)
}

/// Remove every whole-word occurrence of each keyword.
pub fn remove_keywords(text: &str, keywords: &[&str]) -> String {
    let mut out = text.to_string();
    for k in keywords {
        while let Some(range) = find_keyword(&out, k) {
            out.replace_range(range, " ");
        }
    }
    out
}

pub fn cut(text: &str, range: Range<usize>) -> String {
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..range.start]);
    out.push(' ');
    out.push_str(&text[range.end..]);
    out
}

/// Collapse whitespace and trim separators left behind by removed fields.
pub fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || "-–—:;,|".contains(c))
        .to_string()
}

/// Strip a leading `Label:` (case-insensitive) and return the rest.
pub fn strip_label<'a>(text: &'a str, labels: &[&str]) -> Option<&'a str> {
    let trimmed = text.trim_start();
    for label in labels {
        let n = label.len();
        if trimmed.len() > n
            && trimmed.is_char_boundary(n)
            && trimmed[..n].eq_ignore_ascii_case(label)
        {
            let rest = trimmed[n..].trim_start();
            if let Some(rest) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('=')) {
                return Some(rest.trim());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_date_formats() {
        for (line, expected) in [
            ("bought 2024-03-15 at store", "2024-03-15"),
            ("03/15/2024 paint", "03/15/2024"),
            ("3-5-2024", "3-5-2024"),
            ("due 4/1/24", "4/1/24"),
            ("March 15th, 2024 tile", "March 15th, 2024"),
            ("Sept. 3 2024", "Sept. 3 2024"),
        ] {
            assert_eq!(find_date(line).map(|f| f.value).as_deref(), Some(expected), "{line}");
        }
        assert!(find_date("March 15").is_none());
        assert!(find_date("12/5/202").is_none());
        assert!(find_date("room 12x15").is_none());
    }

    #[test]
    fn amounts_leftmost_wins() {
        let found = find_amount("tile $120.50 and grout $30").unwrap();
        assert_eq!(found.value, 120.50);
        assert_eq!(&"tile $120.50 and grout $30"[found.range], "$120.50");

        assert_eq!(find_amount("labor $3,500.00").unwrap().value, 3500.0);
        assert_eq!(find_amount("deposit $ 45").unwrap().value, 45.0);
        assert_eq!(find_amount("permit 1,200.00").unwrap().value, 1200.0);
        assert_eq!(find_amount("paint 45.99").unwrap().value, 45.99);
        assert_eq!(find_amount("€12.5 fee").unwrap().value, 12.5);
        assert!(find_amount("bought 12 boxes").is_none());
    }

    #[test]
    fn dimensions_with_units() {
        let cases = [
            ("Kitchen 12x15 ft needs new flooring", "12x15 ft"),
            ("Bedroom 10' x 12' carpet", "10' x 12'"),
            ("Closet 3 X 4", "3 X 4"),
            ("Tub 1.5 x 0.8 x 0.6 m", "1.5 x 0.8 x 0.6 m"),
            ("Den 11×13 sq ft", "11×13 sq ft"),
        ];
        for (line, expected) in cases {
            assert_eq!(find_dimensions(line).map(|f| f.value).as_deref(), Some(expected), "{line}");
        }
        assert!(find_dimensions("Kitchen needs paint").is_none());
        // "m" only counts as a unit on its own
        assert_eq!(find_dimensions("Den 12x15 moving").unwrap().value, "12x15");
    }

    #[test]
    fn keywords_match_whole_words() {
        assert!(contains_keyword("Paid with CASH", "cash"));
        assert!(!contains_keyword("cashier note", "cash"));
        assert!(contains_keyword("from Lowe's today", "lowe's"));
        assert!(contains_keyword("nice to have: shelves", "nice to have"));
        assert_eq!(remove_keywords("Paid cash for tile", &["paid", "cash"]).split_whitespace().collect::<Vec<_>>(), vec!["for", "tile"]);
    }

    #[test]
    fn labels_and_tidy() {
        assert_eq!(strip_label("Vendor: Home Depot", &["vendor", "store"]), Some("Home Depot"));
        assert_eq!(strip_label("store = Ace", &["vendor", "store"]), Some("Ace"));
        assert_eq!(strip_label("Vendors are great", &["vendor"]), None);
        assert_eq!(tidy("  Buy lumber -   "), "Buy lumber");
        assert_eq!(tidy(": Tile ,"), "Tile");
    }
}
