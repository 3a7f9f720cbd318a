use calamine::{open_workbook_auto, DataType, Reader};
use std::path::{Path, PathBuf};

use crate::error::WriteError;
use crate::types::{Detection, DocumentType, OcrLine, Record};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};

const DETECTION_HEADERS: &[&str] = &[
    "Image",
    "Page",
    "Block",
    "Paragraph",
    "Line",
    "Word",
    "Left",
    "Top",
    "Width",
    "Height",
    "Confidence",
    "Text",
];

const SUMMARY_HEADERS: &[&str] = &[
    "Image",
    "Document Type",
    "Worksheet",
    "Final State",
    "Records",
    "Words",
    "Average Confidence",
    "Error",
];

/// Columns written as numbers instead of text.
const NUMERIC_HEADERS: &[&str] = &["Amount", "OCR Confidence", "Records", "Words", "Average Confidence"];

/// Column index to Excel letter (0→A, 1→B, 25→Z, 26→AA).
pub fn col_index_to_letter(index: u32) -> String {
    let mut n = index;
    let mut s = String::new();
    loop {
        let r = (n % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// `<output>/<stem>_ocr.<ext>` for an image file name.
pub fn backup_path(output_dir: &Path, image_name: &str, ext: &str) -> PathBuf {
    let stem = Path::new(image_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(image_name);
    output_dir.join(format!("{}_ocr.{}", stem, ext))
}

/// Plain-text dump: one reconstructed line per row, document order. Overwrites.
pub fn write_text_dump(output_dir: &Path, image_name: &str, lines: &[OcrLine]) -> Result<PathBuf, WriteError> {
    let path = backup_path(output_dir, image_name, "txt");
    let mut body = lines.iter().map(|l| l.text.as_str()).collect::<Vec<_>>().join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    std::fs::write(&path, body).map_err(|source| WriteError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Per-image backup workbook with a `Detections` sheet and a `Records` sheet. Overwrites.
pub fn write_backup_workbook(
    output_dir: &Path,
    image_name: &str,
    doc_type: DocumentType,
    detections: &[Detection],
    records: &[Record],
    saved_at: &str,
) -> Result<PathBuf, WriteError> {
    let path = backup_path(output_dir, image_name, "xlsx");
    build_backup(image_name, doc_type, detections, records, saved_at, &path).map_err(|source| {
        WriteError::Xlsx {
            path: path.clone(),
            source,
        }
    })?;
    Ok(path)
}

fn build_backup(
    image_name: &str,
    doc_type: DocumentType,
    detections: &[Detection],
    records: &[Record],
    saved_at: &str,
    path: &Path,
) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = header_format();
    let text_format = Format::new();
    let number_format = Format::new().set_num_format("0.0").set_align(FormatAlign::Right);

    let det_rows: Vec<Vec<String>> = detections
        .iter()
        .map(|d| {
            vec![
                image_name.to_string(),
                d.page.to_string(),
                d.block.to_string(),
                d.paragraph.to_string(),
                d.line.to_string(),
                d.word.to_string(),
                d.left.to_string(),
                d.top.to_string(),
                d.width.to_string(),
                d.height.to_string(),
                format!("{:.1}", d.confidence),
                d.text.clone(),
            ]
        })
        .collect();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Detections")?;
    write_table(sheet, DETECTION_HEADERS, &det_rows, &header_format, &text_format, &number_format, &[])?;

    let mut record_headers: Vec<&str> = doc_type.record_headers().to_vec();
    record_headers.push("Saved At");
    let record_rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            let mut cells = r.cells();
            cells.push(saved_at.to_string());
            cells
        })
        .collect();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Records")?;
    write_table(
        sheet,
        &record_headers,
        &record_rows,
        &header_format,
        &text_format,
        &number_format,
        NUMERIC_HEADERS,
    )?;

    workbook.save(path)
}

/// One line of the run summary workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub image: String,
    pub document_type: String,
    pub worksheet: String,
    pub final_state: String,
    pub records: usize,
    pub words: usize,
    pub average_confidence: f64,
    pub error: String,
}

/// `ocr_summary_<timestamp>.xlsx` with one row per image.
pub fn write_summary_workbook(output_dir: &Path, rows: &[SummaryRow], timestamp: &str) -> Result<PathBuf, WriteError> {
    let path = output_dir.join(format!("ocr_summary_{}.xlsx", timestamp));
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.image.clone(),
                r.document_type.clone(),
                r.worksheet.clone(),
                r.final_state.clone(),
                r.records.to_string(),
                r.words.to_string(),
                format!("{:.1}", r.average_confidence),
                r.error.clone(),
            ]
        })
        .collect();

    let build = || -> Result<(), XlsxError> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        let number_format = Format::new().set_num_format("General").set_align(FormatAlign::Right);
        write_table(
            sheet,
            SUMMARY_HEADERS,
            &cells,
            &header_format(),
            &Format::new().set_text_wrap(),
            &number_format,
            NUMERIC_HEADERS,
        )?;
        workbook.save(&path)
    };
    build().map_err(|source| WriteError::Xlsx {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Write a plain multi-sheet workbook: first row of each sheet is a bold header. Used by the local upload target.
pub fn save_sheets(path: &Path, sheets: &[(String, Vec<Vec<String>>)]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let plain = Format::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        for (r, row) in rows.iter().enumerate() {
            let format = if r == 0 { &bold } else { &plain };
            for (c, value) in row.iter().enumerate() {
                write_text_cell_safe(sheet, r as u32, c as u16, value, format)?;
            }
        }
    }
    workbook.save(path)
}

/// All sheets of a workbook as string grids, in workbook order.
pub fn read_sheets(path: &Path) -> Result<Vec<(String, Vec<Vec<String>>)>, calamine::Error> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_vec();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| {
                let mut cells: Vec<String> = row.iter().map(|c| c.as_string().unwrap_or_default()).collect();
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();
        out.push((name, rows));
    }
    Ok(out)
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF))
}

fn write_table(
    sheet: &mut Worksheet,
    headers: &[&str],
    rows: &[Vec<String>],
    header_format: &Format,
    text_format: &Format,
    number_format: &Format,
    numeric_headers: &[&str],
) -> Result<(), XlsxError> {
    let mut widths: Vec<f64> = headers.iter().map(|h| estimate_text_width(h)).collect();
    for (col, header) in headers.iter().enumerate() {
        write_text_cell_safe(sheet, 0, col as u16, header, header_format)?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let numeric = headers.get(col).is_some_and(|h| numeric_headers.contains(h));
            if numeric && !value.is_empty() {
                write_number_cell_safe(sheet, r, col as u16, value, number_format, text_format)?;
            } else {
                write_text_cell_safe(sheet, r, col as u16, value, text_format)?;
            }
            if let Some(w) = widths.get_mut(col) {
                *w = w.max(estimate_text_width(value));
            }
        }
    }
    for (col, w) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *w)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Remove characters that corrupt the sheet XML. Drops control chars except tab, newline, CR.
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

fn write_text_cell_safe(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    format: &Format,
) -> Result<(), XlsxError> {
    let cleaned = sanitize_cell(text);
    worksheet.write_string_with_format(row, col, &cleaned, format).map(|_| ())
}

/// Write a number, or the sanitized text when the value does not parse.
fn write_number_cell_safe(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &str,
    number_format: &Format,
    text_format: &Format,
) -> Result<(), XlsxError> {
    let cleaned = value.replace(',', "").replace(' ', "");
    match cleaned.trim().parse::<f64>() {
        Ok(num) => worksheet.write_number_with_format(row, col, num, number_format).map(|_| ()),
        Err(_) => write_text_cell_safe(worksheet, row, col, value, text_format),
    }
}

/// Estimate column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}
