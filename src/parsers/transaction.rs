use super::patterns::{cut, find_amount, find_date, lookup, remove_keywords, strip_label, tidy};
use super::RecordParser;
use crate::types::{DocumentType, OcrLine, Record, RecordBody, Transaction};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

const CATEGORIES: &[(&str, &[&str])] = &[
    ("Materials", &["cabinets", "flooring", "tile", "paint", "supplies", "materials", "lumber", "hardware"]),
    ("Labor", &["labor", "contractor", "installation", "plumber", "electrician", "worker"]),
    ("Utilities", &["electric", "water", "gas", "utility", "utilities"]),
    ("Property Tax", &["property tax", "tax"]),
    ("Insurance", &["insurance"]),
    ("Permits", &["permit", "permits", "license"]),
    ("Equipment Rental", &["rental", "rent", "equipment"]),
];

const PAYMENT_METHODS: &[(&str, &[&str])] = &[
    ("Cash", &["cash"]),
    ("Card", &["card", "credit", "debit", "visa", "mastercard", "amex"]),
    ("Check", &["check", "cheque"]),
    ("Transfer", &["venmo", "paypal", "zelle", "transfer"]),
];

const STATUSES: &[(&str, &[&str])] = &[
    ("Paid", &["paid"]),
    ("Pending", &["pending", "outstanding", "unpaid"]),
    ("Reimbursed", &["reimbursed", "refunded"]),
    ("Disputed", &["disputed"]),
];

const VENDORS: &[(&str, &[&str])] = &[
    ("Home Depot", &["home depot"]),
    ("Lowe's", &["lowe's", "lowes"]),
    ("Menards", &["menards"]),
    ("Ace Hardware", &["ace hardware"]),
    ("Sherwin-Williams", &["sherwin williams", "sherwin-williams"]),
    ("Amazon", &["amazon"]),
    ("Walmart", &["walmart"]),
    ("IKEA", &["ikea"]),
];

const DESCRIPTION_LABELS: &[&str] = &["item", "description"];
const VENDOR_LABELS: &[&str] = &["vendor", "store", "from"];
const STATUS_LABELS: &[&str] = &["status"];
const PAYMENT_LABELS: &[&str] = &["paid with", "payment method", "payment", "method"];
const DATE_LABELS: &[&str] = &["date"];

/// Connector phrases dropped from descriptions along with payment/status keywords.
const FILLER: &[&str] = &["paid with", "paid by", "paid via", "via"];

static FIELD_LABEL_RE: OnceLock<Regex> = OnceLock::new();
static INLINE_VENDOR_RE: OnceLock<Regex> = OnceLock::new();

fn field_label_re() -> &'static Regex {
    FIELD_LABEL_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:item|description|cost|amount|price|total|date)\s*:").expect("field label regex")
    })
}

fn inline_vendor_re() -> &'static Regex {
    INLINE_VENDOR_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:vendor|store|from)\s*:\s*(.*)$").expect("inline vendor regex")
    })
}

/// Budget and expense notes: one transaction per line with an amount or a date.
pub struct TransactionParser;

/// Values from label-only lines waiting for the next transaction.
#[derive(Default)]
struct Pending {
    description: Option<String>,
    vendor: Option<String>,
    status: Option<String>,
    payment_method: Option<String>,
}

impl RecordParser for TransactionParser {
    fn document_type(&self) -> DocumentType {
        DocumentType::Financial
    }

    fn parse(&self, lines: &[OcrLine], source_image: &str) -> Vec<Record> {
        let mut records: Vec<Record> = Vec::new();
        let mut pending = Pending::default();
        // `Date: <date>` on its own line dates every following undated transaction
        let mut header_date: Option<String> = None;

        for line in lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(date) = header_date_of(text) {
                header_date = Some(date);
                continue;
            }
            let has_fields = find_date(text).is_some() || find_amount(text).is_some();

            if !has_fields {
                if let Some(desc) = strip_label(text, DESCRIPTION_LABELS) {
                    let desc = tidy(desc);
                    if !desc.is_empty() {
                        pending.description = Some(desc);
                    }
                    continue;
                }
                if let Some(value) = strip_label(text, VENDOR_LABELS) {
                    let vendor = lookup(value, VENDORS)
                        .map(str::to_string)
                        .unwrap_or_else(|| tidy(value));
                    fill_or_hold(&mut records, &mut pending.vendor, vendor, |t| &mut t.vendor);
                    continue;
                }
                if let Some(value) = strip_label(text, STATUS_LABELS) {
                    let status = lookup(value, STATUSES)
                        .map(str::to_string)
                        .unwrap_or_else(|| tidy(value));
                    fill_or_hold(&mut records, &mut pending.status, status, |t| &mut t.status);
                    continue;
                }
                if let Some(value) = strip_label(text, PAYMENT_LABELS) {
                    let method = lookup(value, PAYMENT_METHODS)
                        .map(str::to_string)
                        .unwrap_or_else(|| tidy(value));
                    fill_or_hold(&mut records, &mut pending.payment_method, method, |t| {
                        &mut t.payment_method
                    });
                    continue;
                }
                debug!(source = source_image, line = text, "no amount or date, skipping");
                continue;
            }

            if let Some(mut tx) = parse_line(text, &mut pending) {
                if tx.date.is_none() {
                    tx.date = header_date.clone();
                }
                records.push(Record {
                    source_image: source_image.to_string(),
                    confidence: line.confidence,
                    body: RecordBody::Transaction(tx),
                });
            }
        }
        records
    }
}

/// Put a label value on the previous transaction when that field is still empty, else keep it for the next one.
fn fill_or_hold<F>(records: &mut [Record], held: &mut Option<String>, value: String, field: F)
where
    F: Fn(&mut Transaction) -> &mut Option<String>,
{
    if value.is_empty() {
        return;
    }
    if let Some(Record {
        body: RecordBody::Transaction(tx),
        ..
    }) = records.last_mut()
    {
        let slot = field(tx);
        if slot.is_none() {
            *slot = Some(value);
            return;
        }
    }
    *held = Some(value);
}

fn header_date_of(text: &str) -> Option<String> {
    let value = strip_label(text, DATE_LABELS)?;
    let found = find_date(value)?;
    if find_amount(value).is_some() || !tidy(&cut(value, found.range)).is_empty() {
        return None;
    }
    Some(found.value)
}

fn parse_line(raw: &str, pending: &mut Pending) -> Option<Transaction> {
    let mut text = field_label_re().replace_all(raw, " ").into_owned();

    let mut labelled_vendor = None;
    let vendor_label = inline_vendor_re().captures(&text).and_then(|caps| {
        let start = caps.get(0)?.start();
        let value = caps.get(1)?.as_str();
        let value = find_date(value).map_or(value.to_string(), |d| cut(value, d.range));
        let value = find_amount(&value).map_or(value.clone(), |a| cut(&value, a.range));
        Some((start, tidy(&value)))
    });
    if let Some((start, vendor)) = vendor_label {
        // amount and date stay with the rest of the line
        let tail = text[start..].to_string();
        text.truncate(start);
        if let Some(d) = find_date(&tail) {
            text.push(' ');
            text.push_str(&d.value);
        }
        if let Some(a) = find_amount(&tail) {
            text.push(' ');
            text.push_str(&tail[a.range]);
        }
        if !vendor.is_empty() {
            labelled_vendor = Some(vendor);
        }
    }

    let date = find_date(&text).map(|found| {
        text = cut(&text, found.range);
        found.value
    });
    let amount = find_amount(&text).map(|found| {
        text = cut(&text, found.range);
        found.value
    });
    if date.is_none() && amount.is_none() {
        return None;
    }

    let mut removable: Vec<&str> = FILLER.to_vec();
    for (_, keywords) in PAYMENT_METHODS.iter().chain(STATUSES.iter()) {
        removable.extend_from_slice(keywords);
    }
    let mut description = tidy(&remove_keywords(&text, &removable));
    if description.is_empty() {
        description = pending.description.take().unwrap_or_default();
    } else {
        pending.description = None;
    }

    let category = lookup(raw, CATEGORIES)
        .or_else(|| lookup(&description, CATEGORIES))
        .map(str::to_string);
    let vendor = labelled_vendor
        .or_else(|| lookup(raw, VENDORS).map(str::to_string))
        .or_else(|| pending.vendor.take());
    let payment_method = lookup(raw, PAYMENT_METHODS)
        .map(str::to_string)
        .or_else(|| pending.payment_method.take());
    let status = lookup(raw, STATUSES)
        .map(str::to_string)
        .or_else(|| pending.status.take());

    Some(Transaction {
        date,
        description,
        amount,
        category,
        payment_method,
        vendor,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::lines;

    fn parse(texts: &[&str]) -> Vec<Transaction> {
        TransactionParser
            .parse(&lines(texts), "financial_notes.jpg")
            .into_iter()
            .map(|r| match r.body {
                RecordBody::Transaction(t) => t,
                other => panic!("unexpected record {:?}", other),
            })
            .collect()
    }

    #[test]
    fn description_amount_and_date() {
        let txs = parse(&["Paint supplies $45.99 03/15/2024"]);
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(tx.description, "Paint supplies");
        assert_eq!(tx.amount, Some(45.99));
        assert_eq!(tx.date.as_deref(), Some("03/15/2024"));
        assert_eq!(tx.category.as_deref(), Some("Materials"));
        assert_eq!(tx.payment_method, None);
    }

    #[test]
    fn lines_without_amount_or_date_are_noise() {
        let txs = parse(&["Renovation budget", "Tile for bathroom $120", "notes below"]);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "Tile for bathroom");
        assert_eq!(txs[0].date, None);
    }

    #[test]
    fn keywords_fill_payment_status_and_vendor() {
        let txs = parse(&["Plumber paid with cash $350.00 2024-04-02 Home Depot"]);
        let tx = &txs[0];
        assert_eq!(tx.payment_method.as_deref(), Some("Cash"));
        assert_eq!(tx.status.as_deref(), Some("Paid"));
        assert_eq!(tx.vendor.as_deref(), Some("Home Depot"));
        assert_eq!(tx.category.as_deref(), Some("Labor"));
        assert_eq!(tx.description, "Plumber Home Depot");
    }

    #[test]
    fn unknown_category_stays_blank() {
        let txs = parse(&["Pizza for crew 25.00"]);
        assert_eq!(txs[0].category, None);
        assert_eq!(txs[0].amount, Some(25.0));
    }

    #[test]
    fn leftmost_amount_wins() {
        let txs = parse(&["Cabinets $2,400.00 deposit $500"]);
        assert_eq!(txs[0].amount, Some(2400.0));
        assert_eq!(txs[0].description, "Cabinets deposit $500");
    }

    #[test]
    fn label_lines_attach_to_neighbours() {
        let txs = parse(&[
            "Item: Kitchen cabinets",
            "Cost: $4,200.00",
            "Vendor: Lowes",
            "Status: pending",
            "Date: 05/01/2024 $75",
            "Store: Corner Hardware",
        ]);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "Kitchen cabinets");
        assert_eq!(txs[0].amount, Some(4200.0));
        assert_eq!(txs[0].vendor.as_deref(), Some("Lowe's"));
        assert_eq!(txs[0].status.as_deref(), Some("Pending"));
        assert_eq!(txs[0].category, Some("Materials".to_string()));

        assert_eq!(txs[1].date.as_deref(), Some("05/01/2024"));
        assert_eq!(txs[1].amount, Some(75.0));
        assert_eq!(txs[1].description, "");
        assert_eq!(txs[1].vendor.as_deref(), Some("Corner Hardware"));
    }

    #[test]
    fn inline_vendor_label() {
        let txs = parse(&["Grout $18.50 Store: Ace Hardware"]);
        assert_eq!(txs[0].vendor.as_deref(), Some("Ace Hardware"));
        assert_eq!(txs[0].description, "Grout");
    }

    #[test]
    fn labelled_header_date_carries_to_items() {
        let txs = parse(&[
            "Budget & Expenses",
            "Date: October 24, 2025",
            "Item: Kitchen Cabinets",
            "Cost: $3,500.00",
            "Vendor: Home Depot",
            "Status: Paid",
            "Item: Tile Flooring",
            "Cost: $1,200.00",
            "Vendor: Lowe's",
            "Status: Pending",
            "Item: Paint Supplies",
            "Cost: $450.00 03/02/2025",
            "Vendor: Sherwin Williams",
            "Status: Paid",
        ]);
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].description, "Kitchen Cabinets");
        assert_eq!(txs[0].amount, Some(3500.0));
        assert_eq!(txs[0].date.as_deref(), Some("October 24, 2025"));
        assert_eq!(txs[0].vendor.as_deref(), Some("Home Depot"));
        assert_eq!(txs[1].date.as_deref(), Some("October 24, 2025"));
        assert_eq!(txs[1].status.as_deref(), Some("Pending"));
        // an explicit date wins over the header
        assert_eq!(txs[2].date.as_deref(), Some("03/02/2025"));
        assert_eq!(txs[2].vendor.as_deref(), Some("Sherwin-Williams"));
    }
}
