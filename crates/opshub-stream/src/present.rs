//! Read-only views over accumulated rows: search, pagination and export.

use std::borrow::Borrow;

use opshub_protocol::Row;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("writing csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("flushing csv: {0}")]
    Flush(String),
    #[error("csv output is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Display form of a cell: strings as-is, everything else as JSON text.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Export form of a cell; null becomes empty.
fn export_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => cell_text(v),
    }
}

/// Rows where any column's text contains `term`, ignoring case.
pub fn search<'a>(rows: &'a [Row], term: &str) -> Vec<&'a Row> {
    if term.is_empty() {
        return rows.iter().collect();
    }
    let needle = term.to_lowercase();
    rows.iter()
        .filter(|row| {
            row.values()
                .any(|v| cell_text(v).to_lowercase().contains(&needle))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-indexed, after clamping.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice out one page. `page` is 1-indexed and clamped into range; there is
/// always at least one (possibly empty) page.
pub fn paginate<T>(items: &[T], page_size: usize, page: usize) -> Page<'_, T> {
    let size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(size).max(1);
    let page = page.clamp(1, total_pages);
    let start = ((page - 1) * size).min(total_items);
    let end = (start + size).min(total_items);
    Page {
        items: &items[start..end],
        page,
        total_pages,
        total_items,
    }
}

/// Column order taken from the first row.
pub fn columns<R: Borrow<Row>>(rows: &[R]) -> Vec<String> {
    rows.first()
        .map(|r| r.borrow().keys().cloned().collect())
        .unwrap_or_default()
}

/// CSV with every field quoted and embedded quotes doubled. Empty input
/// yields an empty string.
pub fn export_csv<R: Borrow<Row>>(rows: &[R]) -> Result<String, ExportError> {
    let headers = columns(rows);
    if headers.is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in rows {
        let row = row.borrow();
        writer.write_record(headers.iter().map(|h| export_text(row.get(h))))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    let mut out = String::from_utf8(bytes)?;
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

/// Tab-separated header and rows for pasting into a spreadsheet.
pub fn copy_tsv<R: Borrow<Row>>(rows: &[R]) -> String {
    let headers = columns(rows);
    if headers.is_empty() {
        return String::new();
    }
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join("\t"));
    for row in rows {
        let row = row.borrow();
        let cells: Vec<String> = headers.iter().map(|h| export_text(row.get(h))).collect();
        lines.push(cells.join("\t"));
    }
    lines.join("\n")
}
