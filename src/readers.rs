//! Format readers: turn a document's bytes into `(content, summary)`.
//!
//! Reading never fails from the caller's point of view. Every parse error
//! is logged and converted into a degraded placeholder that still names the
//! file, so one corrupt upload cannot block the rest of an extraction.

use std::io::{Cursor, Read};

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::summary::truncate_chars;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_JSON: &str = "application/json";
pub const MIME_CSV: &str = "text/csv";

const TEXT_SUMMARY_CHARS: usize = 500;
const PREVIEW_CHARS: usize = 400;
const CSV_HEADER_CHARS: usize = 200;
/// Data rows kept per sheet (after the header row).
const XLSX_ROWS_PER_SHEET: usize = 10;
/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracted body plus a bounded human-readable preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutput {
    pub content: String,
    pub summary: String,
    /// Set when the output is a placeholder rather than parsed content.
    pub degraded: bool,
}

impl ReadOutput {
    fn parsed(content: String, summary: String) -> Self {
        Self {
            content,
            summary,
            degraded: false,
        }
    }

    fn degraded(text: String) -> Self {
        Self {
            content: text.clone(),
            summary: text,
            degraded: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.summary.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Json,
    Csv,
    Pdf,
    Docx,
    Xlsx,
    Unsupported,
}

#[derive(Debug, Error)]
enum ReadError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),
}

/// Picks a reader from the MIME type, falling back to the file extension.
pub fn detect_format(mime_type: Option<&str>, filename: &str) -> DocumentFormat {
    let mime = mime_type
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        MIME_PDF => return DocumentFormat::Pdf,
        MIME_DOCX => return DocumentFormat::Docx,
        MIME_XLSX => return DocumentFormat::Xlsx,
        MIME_JSON => return DocumentFormat::Json,
        MIME_CSV => return DocumentFormat::Csv,
        _ => {}
    }

    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => DocumentFormat::Pdf,
        "docx" => DocumentFormat::Docx,
        "xlsx" => DocumentFormat::Xlsx,
        "json" => DocumentFormat::Json,
        "csv" => DocumentFormat::Csv,
        "txt" | "md" | "markdown" => DocumentFormat::Text,
        _ if mime.starts_with("text/") => DocumentFormat::Text,
        _ => DocumentFormat::Unsupported,
    }
}

/// Reads a document with the reader matching its type.
pub fn read_document(bytes: &[u8], mime_type: Option<&str>, filename: &str) -> ReadOutput {
    match detect_format(mime_type, filename) {
        DocumentFormat::Text => read_text(&String::from_utf8_lossy(bytes)),
        DocumentFormat::Json => read_json(&String::from_utf8_lossy(bytes)),
        DocumentFormat::Csv => read_csv(&String::from_utf8_lossy(bytes)),
        DocumentFormat::Pdf => read_pdf(bytes, filename),
        DocumentFormat::Docx => read_docx(bytes, filename),
        DocumentFormat::Xlsx => read_xlsx(bytes, filename),
        DocumentFormat::Unsupported => placeholder(filename, mime_type),
    }
}

/// Metadata-only stand-in used when content cannot be fetched or parsed.
pub fn placeholder(filename: &str, mime_type: Option<&str>) -> ReadOutput {
    ReadOutput::degraded(format!(
        "Document: {} ({})",
        filename,
        mime_type.unwrap_or("unknown")
    ))
}

pub fn read_text(text: &str) -> ReadOutput {
    ReadOutput::parsed(
        text.to_string(),
        truncate_chars(text, TEXT_SUMMARY_CHARS).to_string(),
    )
}

pub fn read_json(text: &str) -> ReadOutput {
    let pretty = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok());
    match pretty {
        Some(content) => ReadOutput::parsed(
            content,
            "JSON document containing structured data".to_string(),
        ),
        None => read_text(text),
    }
}

pub fn read_csv(text: &str) -> ReadOutput {
    let trimmed = text.trim_end();
    let lines: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('\n').collect()
    };
    let row_count = lines.len().saturating_sub(1);
    let header = lines
        .first()
        .map(|h| truncate_chars(h.trim_end_matches('\r'), CSV_HEADER_CHARS))
        .unwrap_or("");
    ReadOutput::parsed(
        text.to_string(),
        format!("CSV data with {} rows. Headers: {}", row_count, header),
    )
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn preview(text: &str) -> &str {
    truncate_chars(text.trim(), PREVIEW_CHARS)
}

pub fn read_pdf(bytes: &[u8], filename: &str) -> ReadOutput {
    match extract_pdf(bytes) {
        Ok((pages, text)) => {
            let summary = format!(
                "PDF document with {} pages, ~{} words. Preview: {}",
                pages,
                word_count(&text),
                preview(&text)
            );
            ReadOutput::parsed(text, summary)
        }
        Err(e) => {
            warn!(file = filename, error = %e, "falling back to filename-only PDF summary");
            ReadOutput::degraded(format!("PDF document: {} (extraction failed)", filename))
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<(usize, String), ReadError> {
    let pages = lopdf::Document::load_mem(bytes)
        .map_err(|e| ReadError::Pdf(e.to_string()))?
        .get_pages()
        .len();
    // pdf-extract can panic on malformed streams.
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ReadError::Pdf("parser panicked".to_string()))?
        .map_err(|e| ReadError::Pdf(e.to_string()))?;
    Ok((pages, text))
}

pub fn read_docx(bytes: &[u8], filename: &str) -> ReadOutput {
    match extract_docx(bytes) {
        Ok(text) => {
            let summary = format!(
                "Word document with ~{} words. Preview: {}",
                word_count(&text),
                preview(&text)
            );
            ReadOutput::parsed(text, summary)
        }
        Err(e) => {
            warn!(file = filename, error = %e, "falling back to filename-only DOCX summary");
            ReadOutput::degraded(format!("Word document: {} (extraction failed)", filename))
        }
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ReadError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ReadError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ReadError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ReadError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ReadError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ReadError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    paragraph_text(&xml)
}

/// Collects `<w:t>` runs, one line per `<w:p>` paragraph.
fn paragraph_text(xml: &[u8]) -> Result<String, ReadError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ReadError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ReadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

pub fn read_xlsx(bytes: &[u8], filename: &str) -> ReadOutput {
    match extract_xlsx(bytes) {
        Ok(sheets) => {
            let total_rows: usize = sheets.iter().map(|s| s.data_rows).sum();
            let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
            let content = sheets
                .iter()
                .map(SheetPreview::render)
                .collect::<Vec<_>>()
                .join("\n");
            let summary = format!(
                "Excel spreadsheet with {} sheet(s), ~{} total rows. Sheets: {}",
                sheets.len(),
                total_rows,
                names.join(", ")
            );
            ReadOutput::parsed(content, summary)
        }
        Err(e) => {
            warn!(file = filename, error = %e, "falling back to filename-only XLSX summary");
            ReadOutput::degraded(format!("Excel spreadsheet: {} (extraction failed)", filename))
        }
    }
}

struct SheetPreview {
    name: String,
    headers: Vec<String>,
    rows: Vec<Value>,
    data_rows: usize,
}

impl SheetPreview {
    fn render(&self) -> String {
        let rows = serde_json::to_string_pretty(&self.rows).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Sheet: {}\nHeaders: {}\n{}\n",
            self.name,
            self.headers.join(", "),
            rows
        )
    }
}

fn extract_xlsx(bytes: &[u8]) -> Result<Vec<SheetPreview>, ReadError> {
    use calamine::{Reader, Xlsx};

    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| ReadError::Spreadsheet(e.to_string()))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ReadError::Spreadsheet(e.to_string()))?;
        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(i, cell)| match cell_to_json(cell) {
                        Value::Null => format!("column_{}", i + 1),
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let preview_rows = rows
            .take(XLSX_ROWS_PER_SHEET)
            .map(|row| {
                let obj: serde_json::Map<String, Value> = headers
                    .iter()
                    .cloned()
                    .zip(row.iter().map(cell_to_json))
                    .collect();
                Value::Object(obj)
            })
            .collect();
        sheets.push(SheetPreview {
            data_rows: range.height().saturating_sub(1),
            name,
            headers,
            rows: preview_rows,
        });
    }
    Ok(sheets)
}

fn cell_to_json(cell: &calamine::Data) -> Value {
    use calamine::Data;

    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_mime_then_extension() {
        assert_eq!(detect_format(Some(MIME_PDF), "x.bin"), DocumentFormat::Pdf);
        assert_eq!(
            detect_format(Some("application/octet-stream"), "Sheet.XLSX"),
            DocumentFormat::Xlsx
        );
        assert_eq!(
            detect_format(Some("text/markdown"), "notes"),
            DocumentFormat::Text
        );
        assert_eq!(
            detect_format(Some("text/csv; charset=utf-8"), "data"),
            DocumentFormat::Csv
        );
        assert_eq!(detect_format(None, "logo.png"), DocumentFormat::Unsupported);
    }

    #[test]
    fn csv_summary_counts_data_rows() {
        let out = read_csv("a,b,c\n1,2,3\n4,5,6");
        assert_eq!(out.summary, "CSV data with 2 rows. Headers: a,b,c");
        assert_eq!(out.content, "a,b,c\n1,2,3\n4,5,6");
    }

    #[test]
    fn csv_trailing_newline_is_not_a_row() {
        let out = read_csv("a,b\r\n1,2\r\n");
        assert_eq!(out.summary, "CSV data with 1 rows. Headers: a,b");
    }

    #[test]
    fn json_is_pretty_printed() {
        let out = read_json(r#"{"a":1}"#);
        assert_eq!(out.content, "{\n  \"a\": 1\n}");
        assert_eq!(out.summary, "JSON document containing structured data");
        assert!(!out.degraded);
    }

    #[test]
    fn invalid_json_falls_back_to_text() {
        let out = read_json("{not json");
        assert_eq!(out.content, "{not json");
        assert_eq!(out.summary, "{not json");
    }

    #[test]
    fn text_summary_is_bounded() {
        let text = "w".repeat(800);
        let out = read_text(&text);
        assert_eq!(out.summary.len(), 500);
        assert_eq!(out.content.len(), 800);
    }

    #[test]
    fn corrupt_binaries_degrade_to_filename() {
        let pdf = read_document(b"not a pdf", Some(MIME_PDF), "scope.pdf");
        assert_eq!(pdf.summary, "PDF document: scope.pdf (extraction failed)");
        assert_eq!(pdf.content, pdf.summary);
        assert!(pdf.degraded);

        let docx = read_document(b"not a zip", Some(MIME_DOCX), "brief.docx");
        assert_eq!(docx.summary, "Word document: brief.docx (extraction failed)");

        let xlsx = read_document(b"\x00\x01garbage", None, "budget.xlsx");
        assert_eq!(
            xlsx.summary,
            "Excel spreadsheet: budget.xlsx (extraction failed)"
        );
    }

    #[test]
    fn unsupported_types_get_placeholder() {
        let out = read_document(b"\x89PNG", Some("image/png"), "logo.png");
        assert_eq!(out.summary, "Document: logo.png (image/png)");
    }

    /// A PDF with one line of text per page.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let media_box: Vec<Object> = [0, 0, 612, 792].into_iter().map(Object::Integer).collect();
        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => media_box.clone(),
            });
            kids.push(Object::Reference(page_id));
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => media_box.clone(),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn pdf_summary_counts_pages_and_words() {
        let bytes = pdf_with_pages(&["Homepage redesign brief", "Launch before March"]);
        let out = read_pdf(&bytes, "brief.pdf");
        assert!(!out.degraded);
        assert!(out.content.contains("Homepage redesign brief"));
        assert!(out.content.contains("Launch before March"));

        let words = out.content.split_whitespace().count();
        let expected = format!(
            "PDF document with 2 pages, ~{} words. Preview: Homepage",
            words
        );
        assert!(
            out.summary.starts_with(&expected),
            "unexpected summary: {}",
            out.summary
        );
    }

    fn inline_cell(cell_ref: &str, text: &str) -> String {
        format!(
            r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
            cell_ref, text
        )
    }

    fn sheet_xml(rows: &[(String, String)]) -> String {
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                let r = i + 1;
                let second = match b.parse::<f64>() {
                    Ok(_) => format!(r#"<c r="B{}"><v>{}</v></c>"#, r, b),
                    Err(_) => inline_cell(&format!("B{}", r), b),
                };
                format!(
                    r#"<row r="{}">{}{}</row>"#,
                    r,
                    inline_cell(&format!("A{}", r), a),
                    second
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            body
        )
    }

    /// A workbook with one sheet per `(name, rows)`; the first row of each
    /// sheet is its header.
    fn xlsx_with_sheets(sheets: &[(&str, Vec<(String, String)>)]) -> Vec<u8> {
        use std::io::Write;

        let ns = "http://schemas.openxmlformats.org";
        let mut workbook_sheets = String::new();
        let mut rels = String::new();
        let mut overrides = String::new();
        for (i, (name, _)) in sheets.iter().enumerate() {
            let n = i + 1;
            workbook_sheets.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name, n, n
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                n, ns, n
            ));
            overrides.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                n
            ));
        }

        let mut parts = vec![
            (
                "[Content_Types].xml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="{}/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>{}</Types>"#,
                    ns, overrides
                ),
            ),
            (
                "_rels/.rels".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}/package/2006/relationships"><Relationship Id="rId1" Type="{}/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
                    ns, ns
                ),
            ),
            (
                "xl/workbook.xml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{}/spreadsheetml/2006/main" xmlns:r="{}/officeDocument/2006/relationships"><sheets>{}</sheets></workbook>"#,
                    ns, ns, workbook_sheets
                ),
            ),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}/package/2006/relationships">{}</Relationships>"#,
                    ns, rels
                ),
            ),
        ];
        for (i, (_, rows)) in sheets.iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(rows)));
        }

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, xml) in parts {
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(xml.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn row(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn xlsx_summary_lists_sheets_and_caps_preview_rows() {
        let mut pages = vec![row("Page", "Words")];
        pages.extend((1..=12).map(|i| row(&format!("Row {}", i), &(i * 100).to_string())));
        let budget = vec![row("Item", "Cost"), row("Design", "Pending")];
        let bytes = xlsx_with_sheets(&[("Pages", pages), ("Budget", budget)]);

        let out = read_xlsx(&bytes, "plan.xlsx");
        assert!(!out.degraded);
        assert_eq!(
            out.summary,
            "Excel spreadsheet with 2 sheet(s), ~13 total rows. Sheets: Pages, Budget"
        );
        assert!(out.content.starts_with("Sheet: Pages\nHeaders: Page, Words\n"));
        assert!(out.content.contains("Sheet: Budget\nHeaders: Item, Cost\n"));
        assert!(out.content.contains("\"Row 10\""));
        assert!(!out.content.contains("\"Row 11\""));
        assert!(out.content.contains("\"Cost\": \"Pending\""));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = br#"<w:document xmlns:w="w"><w:body><w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(paragraph_text(xml).unwrap(), "Hello world\nSecond");
    }
}
