//! Text rendering of query results and table schemas
//!
//! Output is meant to be read by a language model, so rows are printed
//! vertically (one `column: value` per line) and long results are cut off at a
//! character budget.

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use chrono::{NaiveTime, Timelike};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use std::fmt::Write as _;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::database::{CellValue, ColumnInfo, ForeignKey};

/// Where clients fetch saved full result sets from
pub const LOCAL_FILES_URL_BASE: &str = "https://cdn.jsdelivr.net/pyodide/claude-local-files";

/// Render a single value for display
pub fn format_value(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Bool(true) => "True".to_string(),
        CellValue::Bool(false) => "False".to_string(),
        CellValue::Int(v) => v.to_string(),
        CellValue::UInt(v) => v.to_string(),
        CellValue::Float(v) => format_float(*v),
        CellValue::Decimal(v) => v.to_string(),
        CellValue::Text(v) => v.clone(),
        CellValue::Bytes(bytes) => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("0x");
            for byte in bytes {
                let _ = write!(out, "{:02x}", byte);
            }
            out
        }
        CellValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        CellValue::Time(time) => format_time(time),
        CellValue::TimeTz(time, offset) => format!("{}{}", format_time(time), offset),
        CellValue::DateTime(dt) => {
            if dt.nanosecond() == 0 {
                dt.format("%Y-%m-%dT%H:%M:%S").to_string()
            } else {
                dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
            }
        }
        CellValue::DateTimeTz(dt) => {
            if dt.nanosecond() == 0 {
                dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
            } else {
                dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
            }
        }
        CellValue::Interval {
            months,
            days,
            microseconds,
        } => format_interval(*months, *days, *microseconds),
        CellValue::Money(cents) => format_money(*cents),
        CellValue::Json(json) => json.to_string(),
        CellValue::Uuid(uuid) => uuid.to_string(),
        CellValue::Array(items) => {
            let items: Vec<String> = items.iter().map(format_array_item).collect();
            format!("[{}]", items.join(", "))
        }
        CellValue::Unsupported(type_name) => format!("<unsupported {} value>", type_name),
    }
}

fn format_time(time: &NaiveTime) -> String {
    if time.nanosecond() == 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        time.format("%H:%M:%S%.6f").to_string()
    }
}

/// Floats render like Python's `repr`: shortest round-trip digits, `.0` on
/// integral values, and exponent form below 1e-4 or from 1e16 up
fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{:e}", value);
    if let Some((mantissa, exponent)) = scientific.split_once('e') {
        if let Ok(exponent) = exponent.parse::<i32>() {
            if !(-4..16).contains(&exponent) {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
            }
        }
    }

    let fixed = value.to_string();
    if fixed.contains('.') {
        fixed
    } else {
        fixed + ".0"
    }
}

const MICROS_PER_DAY: i128 = 86_400_000_000;

/// Render an interval like a Python `timedelta`, counting a year as 365
/// days and a month as 30
fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    let days = i128::from(months / 12) * 365 + i128::from(months % 12) * 30 + i128::from(days);
    let total = days * MICROS_PER_DAY + i128::from(microseconds);

    let days = total.div_euclid(MICROS_PER_DAY);
    let rest = total.rem_euclid(MICROS_PER_DAY);
    let seconds = rest / 1_000_000;
    let micros = rest % 1_000_000;

    let mut out = String::new();
    if days != 0 {
        let plural = if days.abs() == 1 { "" } else { "s" };
        let _ = write!(out, "{} day{}, ", days, plural);
    }
    let _ = write!(
        out,
        "{}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    );
    if micros != 0 {
        let _ = write!(out, ".{:06}", micros);
    }
    out
}

/// `MONEY` in the C locale: `$1,234.56`
fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Array elements read like a Python list: `None` for nulls and quoted
/// strings
fn format_array_item(value: &CellValue) -> String {
    match value {
        CellValue::Null => "None".to_string(),
        CellValue::Text(text) => quote_text(text),
        other => format_value(other),
    }
}

fn quote_text(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Render rows vertically until `max_chars` would be exceeded.
///
/// Returns the number of rows rendered and the text.
pub fn format_results(
    columns: &[String],
    rows: &[Vec<CellValue>],
    max_chars: usize,
) -> (usize, String) {
    let mut output = String::new();
    let mut size = 0;
    let mut displayed = 0;

    for (i, row) in rows.iter().enumerate() {
        let mut block = format!("{}. row\n", i + 1);
        for (column, value) in columns.iter().zip(row) {
            let _ = writeln!(block, "{}: {}", column, format_value(value));
        }
        block.push('\n');

        size += block.chars().count();
        if size > max_chars {
            break;
        }
        output.push_str(&block);
        displayed = i + 1;
    }

    (displayed, output)
}

/// Render one table's columns and relationships
pub fn format_table_schema(
    table_name: &str,
    columns: &[ColumnInfo],
    primary_key: &[String],
    foreign_keys: &[ForeignKey],
) -> String {
    let primary_key: HashSet<&str> = primary_key.iter().map(String::as_str).collect();
    let mut lines = vec![format!("{}:", table_name)];

    for column in columns {
        let mut parts = Vec::new();
        if primary_key.contains(column.name.as_str()) {
            parts.push("primary key".to_string());
        }
        parts.push(column.data_type.clone());
        if column.nullable {
            parts.push("nullable".to_string());
        }
        if let Some(default) = column.default.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("default={}", default));
        }
        if column.autoincrement {
            parts.push("autoincrement".to_string());
        }
        lines.push(format!("    {}: {}", column.name, parts.join(", ")));
    }

    if !foreign_keys.is_empty() {
        lines.push(String::new());
        lines.push("    Relationships:".to_string());
        for key in foreign_keys {
            lines.push(format!(
                "      {} -> {}.{}",
                key.constrained_columns.join(", "),
                key.referred_table,
                key.referred_columns.join(", ")
            ));
        }
    }

    lines.join("\n")
}

/// Write the complete result set as JSON to `dir` and return the text
/// pointing the client at it
pub async fn save_full_results(dir: &Path, rows: &[Vec<CellValue>]) -> Result<String> {
    let data: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(format_value).collect())
        .collect();
    let json = to_python_json(&data).context("Failed to serialize result set")?;

    let file_hash = format!("{:x}", Sha256::digest(json.as_bytes()));
    let file_name = format!("{}.json", file_hash);
    let path = dir.join(&file_name);

    tokio::fs::write(&path, json.as_bytes())
        .await
        .with_context(|| format!("Failed to write full result set: {}", path.display()))?;
    debug!("Saved full result set to {}", path.display());

    Ok(format!(
        "\nFull result set url: {}/{} \
         (format: [[row1_value1, row1_value2, ...], [row2_value1, row2_value2, ...], ...]]) \
         (ALWAYS prefer fetching this url in artifacts instead of hardcoding the values if at all possible)",
        LOCAL_FILES_URL_BASE, file_name
    ))
}

/// `serde_json` formatter matching Python's `json.dumps` defaults: `", "`
/// and `": "` separators and non-ASCII escaped as `\uXXXX`
struct PythonJsonFormatter;

impl Formatter for PythonJsonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

fn to_python_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PythonJsonFormatter);
    value.serialize(&mut serializer)?;
    // Only ASCII is ever written
    Ok(String::from_utf8_lossy(&out).into_owned())
}
