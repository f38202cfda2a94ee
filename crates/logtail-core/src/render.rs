// ── Request-log rendering ──
//
// Pure functions from a request-log payload to terminal text. Nothing in
// here writes output; the dispatcher decides where lines go.

use owo_colors::OwoColorize;
use serde::Deserialize;
use serde_json::{Map, Value};

/// The fields of a request-log payload shown in human mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventPayload {
    pub created_at: String,
    pub method: String,
    pub request_id: String,
    pub status: i64,
    pub url: String,
}

impl EventPayload {
    /// Strict decode. Missing fields default, mistyped fields fail.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Field-by-field extraction for payloads `parse` rejects.
    ///
    /// A field of the wrong JSON type keeps its zero value, so `"500"` as a
    /// status renders as `0`.
    pub fn salvage(raw: &str) -> Self {
        let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(raw) else {
            return Self::default();
        };

        Self {
            created_at: text_field(&fields, "created_at"),
            method: text_field(&fields, "method"),
            request_id: text_field(&fields, "request_id"),
            status: fields.get("status").and_then(Value::as_i64).unwrap_or(0),
            url: text_field(&fields, "url"),
        }
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

// ── Status coloring ──────────────────────────────────────────────────

/// Color class of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

/// `>= 500` is red, `300..500` yellow, anything else green.
pub fn status_color(status: i64) -> StatusColor {
    match status {
        500.. => StatusColor::Red,
        300..=499 => StatusColor::Yellow,
        _ => StatusColor::Green,
    }
}

/// The status code as text, bold and colored when `color` is set.
pub fn paint_status(status: i64, color: bool) -> String {
    if !color {
        return status.to_string();
    }
    match status_color(status) {
        StatusColor::Red => status.red().bold().to_string(),
        StatusColor::Yellow => status.yellow().bold().to_string(),
        StatusColor::Green => status.green().bold().to_string(),
    }
}

/// `<created_at> [<status>] <method> <url> <request_id>`
pub fn human_line(payload: &EventPayload, color: bool) -> String {
    format!(
        "{} [{}] {} {} {}",
        payload.created_at,
        paint_status(payload.status, color),
        payload.method,
        payload.url,
        payload.request_id,
    )
}

// ── JSON pretty-printing ─────────────────────────────────────────────

/// Pretty-print a JSON document with two-space indentation.
///
/// Key order and number literals are kept as received. Fails only when `raw`
/// is not JSON.
pub fn pretty_json(raw: &str, color: bool) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    if !color {
        return serde_json::to_string_pretty(&value);
    }
    let mut out = String::with_capacity(raw.len() * 2);
    write_value(&mut out, &value, 0);
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            out.push_str("{\n");
            for (i, (key, item)) in fields.iter().enumerate() {
                indent(out, depth + 1);
                let key = Value::from(key.as_str()).to_string();
                out.push_str(&key.blue().to_string());
                out.push_str(": ");
                write_value(out, item, depth + 1);
                if i + 1 < fields.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
        Value::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                indent(out, depth + 1);
                write_value(out, item, depth + 1);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push(']');
        }
        scalar => {
            let text = scalar.to_string();
            let painted = match scalar {
                Value::String(_) => text.green().to_string(),
                Value::Number(_) => text.cyan().to_string(),
                Value::Bool(_) => text.yellow().to_string(),
                Value::Null => text.bright_black().to_string(),
                // Empty containers print as `{}` / `[]`.
                Value::Object(_) | Value::Array(_) => text,
            };
            out.push_str(&painted);
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
