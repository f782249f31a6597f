//! Runtime values and literal conversion.
//!
//! [`Value`] is what a record hands out for one of its fields at evaluation time;
//! it borrows from the record wherever it can. [`Scalar`] is an owned constant
//! produced by converting a filter literal against a field's declared type.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FieldType, Record};

/// Runtime field value, borrowed from the source record.
#[derive(Clone)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Cow<'a, str>),
    DateTime(DateTime<Utc>),
    List(Vec<Value<'a>>),
    Record(&'a dyn Record),
}

impl<'a> Value<'a> {
    pub fn str(s: &'a str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }

    /// Wraps a slice of records as a list value.
    pub fn records<R: Record>(items: &'a [R]) -> Self {
        Value::List(items.iter().map(|r| Value::Record(r as &dyn Record)).collect())
    }

    /// Wraps a slice of plain values as a list value.
    pub fn list<T>(items: &'a [T]) -> Self
    where
        &'a T: Into<Value<'a>>,
    {
        Value::List(items.iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&'a dyn Record> {
        match self {
            Value::Record(r) => Some(*r),
            _ => None,
        }
    }

    /// Owned copy of a scalar value. Lists and records have no scalar form.
    pub fn to_scalar(&self) -> Option<Scalar> {
        let scalar = match self {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Int(i) => Scalar::Int(*i),
            Value::Float(f) => Scalar::Float(*f),
            Value::Str(s) => Scalar::String(s.to_string()),
            Value::DateTime(d) => Scalar::DateTime(*d),
            Value::List(_) | Value::Record(_) => return None,
        };
        Some(scalar)
    }
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::DateTime(d) => write!(f, "DateTime({d})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Record(_) => f.write_str("Record(..)"),
        }
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }
}

impl<'a> From<&'a String> for Value<'a> {
    fn from(s: &'a String) -> Self {
        Value::Str(Cow::Borrowed(s.as_str()))
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value<'_> {
                fn from(n: $t) -> Self {
                    Value::Int(n as i64)
                }
            }

            impl<'a> From<&'a $t> for Value<'a> {
                fn from(n: &'a $t) -> Self {
                    Value::Int(*n as i64)
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value<'_> {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<'a> From<&'a f64> for Value<'a> {
    fn from(x: &'a f64) -> Self {
        Value::Float(*x)
    }
}

impl From<DateTime<Utc>> for Value<'_> {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

impl<'a, T> From<Option<T>> for Value<'a>
where
    T: Into<Value<'a>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Owned constant produced from a filter literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_value(&self) -> Value<'_> {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Int(*i),
            Scalar::Float(x) => Value::Float(*x),
            Scalar::String(s) => Value::str(s),
            Scalar::DateTime(d) => Value::DateTime(*d),
        }
    }

    /// Lower-cases string constants; other variants are returned unchanged.
    pub fn fold_case(self) -> Self {
        match self {
            Scalar::String(s) => Scalar::String(s.to_lowercase()),
            other => other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Scalar::DateTime(d) => write!(f, "'{}'", d.to_rfc3339()),
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident: $($t:ty),*) => {
        $(
            impl From<$t> for Scalar {
                fn from(v: $t) -> Self {
                    Scalar::$variant(v.into())
                }
            }
        )*
    };
}

scalar_from!(Int: i8, i16, i32, i64, u8, u16, u32);
scalar_from!(Float: f32, f64);
scalar_from!(String: String, &str);

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(d: DateTime<Utc>) -> Self {
        Scalar::DateTime(d)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

/// Compares a runtime value with a constant.
///
/// Returns `None` when the two cannot be ordered (type mismatch, null, NaN).
pub fn compare_to_scalar(value: &Value<'_>, scalar: &Scalar) -> Option<Ordering> {
    match (value, scalar) {
        (Value::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Scalar::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Scalar::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Scalar::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Scalar::String(b)) => Some((**a).cmp(b.as_str())),
        (Value::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Scalar::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality between a runtime value and a constant; `null == null` holds.
pub fn equals_scalar(value: &Value<'_>, scalar: &Scalar) -> bool {
    match (value, scalar) {
        (Value::Null, Scalar::Null) => true,
        (Value::Null, _) | (_, Scalar::Null) => false,
        _ => compare_to_scalar(value, scalar) == Some(Ordering::Equal),
    }
}

/// Total order used for sorting.
///
/// Kinds are ranked `Bool < numbers < Str < DateTime < List < Record < NaN < Null`,
/// so nulls sort after every other value. Values within a kind compare by value;
/// lists and records compare equal to their own kind.
pub fn sort_compare(a: &Value<'_>, b: &Value<'_>) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(x), Value::Float(y)) if !y.is_nan() => {
            (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Value::Float(x), Value::Int(y)) if !x.is_nan() => {
            x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal)
        }
        (Value::Float(x), Value::Float(y)) if !x.is_nan() && !y.is_nan() => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        _ => sort_rank(a).cmp(&sort_rank(b)),
    }
}

fn sort_rank(value: &Value<'_>) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Float(f) if f.is_nan() => 6,
        Value::Int(_) | Value::Float(_) => 1,
        Value::Str(_) => 2,
        Value::DateTime(_) => 3,
        Value::List(_) => 4,
        Value::Record(_) => 5,
        Value::Null => 7,
    }
}

/// Converts a literal to a constant of the given declared type.
///
/// `None` (the `null` literal) converts to [`Scalar::Null`] for every type.
pub fn convert_literal(raw: Option<&str>, ty: &FieldType) -> Result<Scalar, String> {
    let Some(raw) = raw else {
        return Ok(Scalar::Null);
    };
    match ty {
        FieldType::Bool => parse_bool(raw).map(Scalar::Bool),
        FieldType::Int => raw
            .parse::<i64>()
            .map(Scalar::Int)
            .map_err(|e| e.to_string()),
        FieldType::Float => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .map_err(|e| e.to_string()),
        FieldType::String => Ok(Scalar::String(raw.to_string())),
        FieldType::DateTime => parse_datetime(raw).map(Scalar::DateTime),
        FieldType::List(element) => convert_literal(Some(raw), element),
        FieldType::Model(_) => Err("records cannot be compared with a literal".to_string()),
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err("expected true or false".to_string())
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC) and `YYYY-MM-DD` (midnight UTC).
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Ok(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(d.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| "expected an RFC 3339 timestamp or YYYY-MM-DD date".to_string())
}

/// Typed conversion of raw literals, used by custom filter delegates.
pub trait FromLiteral: Sized {
    fn from_literal(raw: Option<&str>) -> Result<Self, String>;

    /// Name of the target type, for error messages.
    fn type_name() -> &'static str;
}

fn require(raw: Option<&str>) -> Result<&str, String> {
    raw.ok_or_else(|| "null is not allowed here".to_string())
}

macro_rules! from_literal_parse {
    ($($t:ty),*) => {
        $(
            impl FromLiteral for $t {
                fn from_literal(raw: Option<&str>) -> Result<Self, String> {
                    require(raw)?.parse::<$t>().map_err(|e| e.to_string())
                }

                fn type_name() -> &'static str {
                    stringify!($t)
                }
            }
        )*
    };
}

from_literal_parse!(i32, i64, u32, u64, f64);

impl FromLiteral for bool {
    fn from_literal(raw: Option<&str>) -> Result<Self, String> {
        parse_bool(require(raw)?)
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

impl FromLiteral for String {
    fn from_literal(raw: Option<&str>) -> Result<Self, String> {
        require(raw).map(str::to_string)
    }

    fn type_name() -> &'static str {
        "string"
    }
}

impl FromLiteral for DateTime<Utc> {
    fn from_literal(raw: Option<&str>) -> Result<Self, String> {
        parse_datetime(require(raw)?)
    }

    fn type_name() -> &'static str {
        "datetime"
    }
}

impl<T: FromLiteral> FromLiteral for Option<T> {
    fn from_literal(raw: Option<&str>) -> Result<Self, String> {
        raw.map(|r| T::from_literal(Some(r))).transpose()
    }

    fn type_name() -> &'static str {
        T::type_name()
    }
}
