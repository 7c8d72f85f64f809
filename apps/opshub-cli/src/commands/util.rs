use anyhow::Result;
use opshub_protocol::{QueryHistoryEntry, Row};
use opshub_stream::{cell_text, HistoryStats};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Widest a table cell may render before it is ellipsized.
pub(crate) const MAX_CELL_CHARS: usize = 32;

pub(crate) fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

/// Truncate a string to `max_chars`, appending an ellipsis where appropriate.
pub(crate) fn ellipsize_str(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let total = input.chars().count();
    if total <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let mut out = String::with_capacity(max_chars);
    for ch in input.chars().take(max_chars - 3) {
        out.push(ch);
    }
    out.push_str("...");
    out
}

/// One-line rendering of an arbitrary JSON item: strings as-is, the rest compact.
pub(crate) fn format_item(value: &JsonValue, width: usize) -> String {
    let raw = match value {
        JsonValue::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    };
    let cleaned = raw.replace(['\n', '\r'], " ");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "-".to_string()
    } else {
        ellipsize_str(trimmed, width)
    }
}

pub(crate) fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) => format!("{:.2}s", s),
        None => "-".to_string(),
    }
}

/// Fixed-width text table; columns are padded to their widest cell.
pub(crate) fn render_table(columns: &[String], rows: &[&Row]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| {
                    let text = row.get(c).map(cell_text).unwrap_or_default();
                    ellipsize_str(&text.replace(['\n', '\r', '\t'], " "), MAX_CELL_CHARS)
                })
                .collect()
        })
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(ellipsize_str(c, MAX_CELL_CHARS).chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();
    let line = |values: Vec<String>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<w$}", v, w = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = String::new();
    out.push_str(&line(
        columns
            .iter()
            .map(|c| ellipsize_str(c, MAX_CELL_CHARS))
            .collect(),
    ));
    out.push('\n');
    out.push_str(&line(widths.iter().map(|w| "-".repeat(*w)).collect()));
    out.push('\n');
    for row in cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

pub(crate) fn history_line(entry: &QueryHistoryEntry) -> String {
    format!(
        "{}  {:<7}  {:>7}  {}",
        entry.timestamp,
        entry.status.as_str(),
        format_seconds(entry.execution_time),
        ellipsize_str(&entry.question, 60)
    )
}

pub(crate) fn stats_lines(stats: &HistoryStats) -> Vec<String> {
    let times = stats
        .response_times
        .iter()
        .map(|t| format!("{:.2}", t))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        format!("last {} queries", stats.considered),
        format!(
            "success rate: {:.0}% ({} ok, {} failed)",
            stats.success_rate, stats.success_count, stats.failure_count
        ),
        format!(
            "response times (s): {}",
            if times.is_empty() { "-".to_string() } else { times }
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        match value {
            JsonValue::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn ellipsize_str_enforces_max_width() {
        assert_eq!(ellipsize_str("hello", 0), "");
        assert_eq!(ellipsize_str("hello", 2), "..");
        assert_eq!(ellipsize_str("hello", 5), "hello");
        assert_eq!(ellipsize_str("hello world", 8), "hello...");
    }

    #[test]
    fn render_table_pads_columns() {
        let rows = [row(json!({"user": "alice", "n": 10})), row(json!({"user": "bo", "n": null}))];
        let refs: Vec<&Row> = rows.iter().collect();
        let text = render_table(&["user".to_string(), "n".to_string()], &refs);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "user   n");
        assert_eq!(lines[1], "-----  ----");
        assert_eq!(lines[2], "alice  10");
        assert_eq!(lines[3], "bo     null");
    }

    #[test]
    fn format_item_flattens_json() {
        assert_eq!(format_item(&json!("prod-east"), 20), "prod-east");
        assert_eq!(format_item(&json!({"name": "a"}), 40), r#"{"name":"a"}"#);
        assert_eq!(format_item(&json!(""), 10), "-");
    }

    #[test]
    fn stats_lines_render_rates() {
        let stats = HistoryStats {
            considered: 4,
            success_count: 3,
            failure_count: 1,
            success_rate: 75.0,
            response_times: vec![0.5, 1.25],
        };
        let lines = stats_lines(&stats);
        assert_eq!(lines[1], "success rate: 75% (3 ok, 1 failed)");
        assert_eq!(lines[2], "response times (s): 0.50 1.25");
    }
}
