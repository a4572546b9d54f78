//! Named bind parameters
//!
//! Queries arrive with `:name` placeholders and a JSON object of values. Each
//! backend binds positionally, so the query text is rewritten to the
//! dialect's placeholder syntax and the values are ordered to match.

#[cfg(test)]
mod tests;

use anyhow::{Result, bail};
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

use super::connection::PlaceholderStyle;

/// Parameter values keyed by name
pub type Params = Map<String, Value>;

/// A parameter value ready to be bound
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&Value> for BindValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Text(n.to_string())),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
        }
    }
}

/// Query text rewritten for positional binding
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub values: Vec<BindValue>,
    /// Parameter name behind each entry of `values`
    pub names: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
    Backtick,
    LineComment,
    BlockComment,
}

/// Rewrite `:name` placeholders into positional ones
pub fn bind_named(query: &str, params: &Params, style: PlaceholderStyle) -> Result<BoundQuery> {
    let chars: Vec<char> = query.chars().collect();
    let mut sql = String::with_capacity(query.len());
    let mut values = Vec::new();
    let mut names = Vec::new();
    // Names in first-use order, for `$n` reuse
    let mut numbered: Vec<String> = Vec::new();
    let mut quote: Option<Quote> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if let Some(q) = quote {
            sql.push(c);
            let closed = match q {
                Quote::Single => c == '\'',
                Quote::Double => c == '"',
                Quote::Backtick => c == '`',
                Quote::LineComment => c == '\n',
                Quote::BlockComment => {
                    if c == '*' && next == Some('/') {
                        sql.push('/');
                        i += 1;
                        true
                    } else {
                        false
                    }
                }
            };
            if closed {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => quote = Some(Quote::Single),
            '"' => quote = Some(Quote::Double),
            '`' => quote = Some(Quote::Backtick),
            '-' if next == Some('-') => quote = Some(Quote::LineComment),
            '/' if next == Some('*') => {
                sql.push_str("/*");
                quote = Some(Quote::BlockComment);
                i += 2;
                continue;
            }
            '\\' if next == Some(':') => {
                sql.push(':');
                i += 2;
                continue;
            }
            ':' => {
                if let Some((name, end)) = placeholder_at(&chars, i) {
                    let Some(value) = params.get(&name) else {
                        bail!("A value is required for bind parameter '{}'", name);
                    };

                    match style {
                        PlaceholderStyle::Question => {
                            sql.push('?');
                            values.push(BindValue::from(value));
                            names.push(name);
                        }
                        PlaceholderStyle::Numbered => {
                            let index = match numbered.iter().position(|n| *n == name) {
                                Some(pos) => pos + 1,
                                None => {
                                    values.push(BindValue::from(value));
                                    names.push(name.clone());
                                    numbered.push(name);
                                    numbered.len()
                                }
                            };
                            sql.push('$');
                            sql.push_str(&index.to_string());
                        }
                    }

                    i = end;
                    continue;
                }
            }
            _ => {}
        }

        sql.push(c);
        i += 1;
    }

    Ok(BoundQuery { sql, values, names })
}

/// Attach values to a query in order
pub fn bind_values<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    values: &[BindValue],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for value in values {
        query = match value {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Float(f) => query.bind(*f),
            BindValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// If `chars[start]` (a colon) opens a placeholder, return its name and the
/// index just past it
fn placeholder_at(chars: &[char], start: usize) -> Option<(String, usize)> {
    if start > 0 {
        let prev = chars[start - 1];
        if prev == ':' || prev == '\\' || is_word(prev) {
            return None;
        }
    }

    let mut end = start + 1;
    while end < chars.len() && is_word(chars[end]) {
        end += 1;
    }
    if end == start + 1 {
        return None;
    }
    // `:name:` is not a placeholder
    if chars.get(end) == Some(&':') {
        return None;
    }

    Some((chars[start + 1..end].iter().collect(), end))
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
