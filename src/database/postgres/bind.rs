//! Parameters typed after their placeholders
//!
//! sqlx declares a type for every bound value, and Postgres will not coerce a
//! declared `text` into an `integer` column or compare it with a `date`. Values
//! are therefore converted to whatever type Postgres inferred for each
//! placeholder when the statement was prepared, and bound under that type.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgHasArrayType, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::types::ipnet::IpNet;
use sqlx::types::{Decimal, Json};
use sqlx::{Postgres, Type, TypeInfo};
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

type List<T> = Option<Vec<Option<T>>>;

/// A parameter value converted for one placeholder type
#[derive(Debug, Clone, PartialEq)]
pub enum PgParam {
    Bool(Option<bool>),
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Float4(Option<f32>),
    Float8(Option<f64>),
    Numeric(Option<Decimal>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    Timestamp(Option<NaiveDateTime>),
    Timestamptz(Option<DateTime<Utc>>),
    Uuid(Option<Uuid>),
    Json(Option<Value>),
    Bytea(Option<Vec<u8>>),
    Inet(Option<IpNet>),
    Text(Option<String>),
    BoolArray(List<bool>),
    Int2Array(List<i16>),
    Int4Array(List<i32>),
    Int8Array(List<i64>),
    Float4Array(List<f32>),
    Float8Array(List<f64>),
    NumericArray(List<Decimal>),
    DateArray(List<NaiveDate>),
    UuidArray(List<Uuid>),
    TextArray(List<String>),
    /// Text sent under the placeholder's own type (enums, `citext`)
    Other(Option<String>),
}

impl PgParam {
    /// Convert `value` for a placeholder of the named type
    #[inline]
    pub fn convert(value: &Value, type_name: &str) -> Result<Self> {
        Ok(match type_name {
            "BOOL" => Self::Bool(scalar(value, "a boolean", to_bool)?),
            "INT2" => Self::Int2(scalar(value, "an integer", to_int::<i16>)?),
            "INT4" => Self::Int4(scalar(value, "an integer", to_int::<i32>)?),
            "INT8" => Self::Int8(scalar(value, "an integer", to_int::<i64>)?),
            "FLOAT4" => Self::Float4(scalar(value, "a number", to_f32)?),
            "FLOAT8" => Self::Float8(scalar(value, "a number", to_f64)?),
            "NUMERIC" => Self::Numeric(scalar(value, "a number", to_decimal)?),
            "DATE" => Self::Date(scalar(value, "a date", to_date)?),
            "TIME" => Self::Time(scalar(value, "a time", to_time)?),
            "TIMESTAMP" => Self::Timestamp(scalar(value, "a timestamp", to_timestamp)?),
            "TIMESTAMPTZ" => Self::Timestamptz(scalar(value, "a timestamp", to_timestamptz)?),
            "UUID" => Self::Uuid(scalar(value, "a UUID", to_uuid)?),
            "JSON" | "JSONB" => Self::Json(scalar(value, "JSON", to_json)?),
            "BYTEA" => Self::Bytea(scalar(value, "a string", to_bytes)?),
            "INET" | "CIDR" => Self::Inet(scalar(value, "an IP address", to_inet)?),
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "UNKNOWN" => {
                Self::Text(scalar(value, "text", to_text)?)
            }
            "BOOL[]" => Self::BoolArray(list(value, "a boolean", to_bool)?),
            "INT2[]" => Self::Int2Array(list(value, "an integer", to_int::<i16>)?),
            "INT4[]" => Self::Int4Array(list(value, "an integer", to_int::<i32>)?),
            "INT8[]" => Self::Int8Array(list(value, "an integer", to_int::<i64>)?),
            "FLOAT4[]" => Self::Float4Array(list(value, "a number", to_f32)?),
            "FLOAT8[]" => Self::Float8Array(list(value, "a number", to_f64)?),
            "NUMERIC[]" => Self::NumericArray(list(value, "a number", to_decimal)?),
            "DATE[]" => Self::DateArray(list(value, "a date", to_date)?),
            "UUID[]" => Self::UuidArray(list(value, "a UUID", to_uuid)?),
            "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "NAME[]" => {
                Self::TextArray(list(value, "text", to_text)?)
            }
            _ => Self::Other(scalar(value, "text", to_text)?),
        })
    }

    /// Attach to `query`, declaring `type_info` for the placeholder
    #[inline]
    pub fn bind<'q>(self, query: PgQuery<'q>, type_info: &PgTypeInfo) -> PgQuery<'q> {
        let ty = type_info.clone();
        match self {
            Self::Bool(v) => query.bind(Inferred::new(v, ty)),
            Self::Int2(v) => query.bind(Inferred::new(v, ty)),
            Self::Int4(v) => query.bind(Inferred::new(v, ty)),
            Self::Int8(v) => query.bind(Inferred::new(v, ty)),
            Self::Float4(v) => query.bind(Inferred::new(v, ty)),
            Self::Float8(v) => query.bind(Inferred::new(v, ty)),
            Self::Numeric(v) => query.bind(Inferred::new(v, ty)),
            Self::Date(v) => query.bind(Inferred::new(v, ty)),
            Self::Time(v) => query.bind(Inferred::new(v, ty)),
            Self::Timestamp(v) => query.bind(Inferred::new(v, ty)),
            Self::Timestamptz(v) => query.bind(Inferred::new(v, ty)),
            Self::Uuid(v) => query.bind(Inferred::new(v, ty)),
            Self::Json(v) => query.bind(Inferred::new(v.map(Json), ty)),
            Self::Bytea(v) => query.bind(Inferred::new(v, ty)),
            Self::Inet(v) => query.bind(Inferred::new(v, ty)),
            Self::Text(v) | Self::Other(v) => query.bind(Inferred::new(v, ty)),
            Self::BoolArray(v) => query.bind(inferred_list(v, ty)),
            Self::Int2Array(v) => query.bind(inferred_list(v, ty)),
            Self::Int4Array(v) => query.bind(inferred_list(v, ty)),
            Self::Int8Array(v) => query.bind(inferred_list(v, ty)),
            Self::Float4Array(v) => query.bind(inferred_list(v, ty)),
            Self::Float8Array(v) => query.bind(inferred_list(v, ty)),
            Self::NumericArray(v) => query.bind(inferred_list(v, ty)),
            Self::DateArray(v) => query.bind(inferred_list(v, ty)),
            Self::UuidArray(v) => query.bind(inferred_list(v, ty)),
            Self::TextArray(v) => query.bind(inferred_list(v, ty)),
        }
    }
}

/// The type name values are converted for; domains convert as their base
/// type
#[inline]
pub fn conversion_type_name(type_info: &PgTypeInfo) -> &str {
    match type_info.kind() {
        PgTypeKind::Domain(base) => base.name(),
        _ => type_info.name(),
    }
}

/// Encodes as `T` but declares the placeholder's own type, so a statement
/// prepared fresh for these arguments agrees with the one Postgres inferred
#[derive(Debug)]
struct Inferred<T> {
    value: T,
    type_info: PgTypeInfo,
}

impl<T> Inferred<T> {
    fn new(value: T, type_info: PgTypeInfo) -> Self {
        Self { value, type_info }
    }
}

impl<T: Type<Postgres>> Type<Postgres> for Inferred<T> {
    fn type_info() -> PgTypeInfo {
        T::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        T::compatible(ty)
    }
}

impl<T: PgHasArrayType> PgHasArrayType for Inferred<T> {
    fn array_type_info() -> PgTypeInfo {
        T::array_type_info()
    }
}

impl<'q, T: Encode<'q, Postgres>> Encode<'q, Postgres> for Inferred<T> {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        self.value.encode_by_ref(buf)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }

    fn size_hint(&self) -> usize {
        self.value.size_hint()
    }
}

/// Arrays carry their element type in the payload, so elements declare the
/// inferred element type too
fn inferred_list<T>(values: List<T>, type_info: PgTypeInfo) -> Inferred<Option<Vec<Inferred<Option<T>>>>>
where
    T: Type<Postgres>,
{
    let element = match type_info.kind() {
        PgTypeKind::Array(element) => element.clone(),
        _ => T::type_info(),
    };
    let values = values.map(|items| {
        items
            .into_iter()
            .map(|item| Inferred::new(item, element.clone()))
            .collect()
    });
    Inferred::new(values, type_info)
}

fn scalar<T>(value: &Value, expected: &str, convert: impl Fn(&Value) -> Option<T>) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    convert(value)
        .map(Some)
        .ok_or_else(|| anyhow!("expected {}, got {}", expected, value))
}

fn list<T>(value: &Value, expected: &str, convert: impl Fn(&Value) -> Option<T>) -> Result<List<T>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => items
            .iter()
            .map(|item| scalar(item, expected, &convert))
            .collect::<Result<Vec<_>>>()
            .map(Some),
        other => bail!("expected an array, got {}", other),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_int<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    let wide = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18)
                .map(|f| f as i64)
        })?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    T::try_from(wide).ok()
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_f32(value: &Value) -> Option<f32> {
    to_f64(value).map(|f| f as f32)
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.as_str()?.trim(), "%Y-%m-%d").ok()
}

fn to_time(value: &Value) -> Option<NaiveTime> {
    let text = value.as_str()?.trim();
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
}

fn to_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    .or_else(|| to_date(value)?.and_hms_opt(0, 0, 0))
}

/// Offsets are honoured; a timestamp without one is taken as UTC
fn to_timestamptz(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| Some(Utc.from_utc_datetime(&to_timestamp(value)?)))
}

fn to_uuid(value: &Value) -> Option<Uuid> {
    Uuid::parse_str(value.as_str()?.trim()).ok()
}

/// Strings holding JSON documents are parsed; anything else is the document
fn to_json(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(serde_json::from_str(s).unwrap_or_else(|_| value.clone())),
        other => Some(other.clone()),
    }
}

fn to_bytes(value: &Value) -> Option<Vec<u8>> {
    value.as_str().map(|s| s.as_bytes().to_vec())
}

fn to_inet(value: &Value) -> Option<IpNet> {
    let text = value.as_str()?.trim();
    IpNet::from_str(text)
        .ok()
        .or_else(|| IpAddr::from_str(text).ok().map(IpNet::from))
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
