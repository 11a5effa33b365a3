//! Driver-neutral values.
//!
//! [`Value`] is what flows between the binder, result streams and entities.
//! [`ToValue`] lifts Rust values into it; [`FromValue`] converts back with
//! change-type semantics: numeric widening, checked narrowing and parsing of
//! text. A conversion that would lose information returns `None`.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

/// A single column or parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Char(char),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Guid(Uuid),
}

impl Value {
    /// `true` for the database-null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Byte(_) => "BYTE",
            Value::Char(_) => "CHAR",
            Value::Int16(_) => "INT16",
            Value::Int32(_) => "INT32",
            Value::Int64(_) => "INT64",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
            Value::DateTime(_) => "DATETIME",
            Value::Guid(_) => "GUID",
        }
    }

    /// Converts into `T`, returning `None` when the value does not fit.
    pub fn convert<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::DateTime(v) => write!(f, "{v}"),
            Value::Guid(v) => write!(f, "{v}"),
        }
    }
}

/// Exact decimal number kept in its canonical text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

/// Error returned when text is not a plain decimal literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal literal: {0:?}")]
pub struct ParseDecimalError(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }

    /// The integral value, if the decimal has no fractional digits.
    pub fn to_i128(&self) -> Option<i128> {
        match self.0.split_once('.') {
            None => self.0.parse().ok(),
            Some((whole, frac)) if frac.bytes().all(|b| b == b'0') => whole.parse().ok(),
            Some(_) => None,
        }
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal("0".to_owned())
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix(['-', '+'])
            .unwrap_or(trimmed);
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let valid = !(whole.is_empty() && frac.is_empty())
            && whole.bytes().all(|b| b.is_ascii_digit())
            && frac.bytes().all(|b| b.is_ascii_digit());
        if !valid {
            return Err(ParseDecimalError(s.to_owned()));
        }
        Ok(Decimal(trimmed.trim_start_matches('+').to_owned()))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifts a Rust value into a [`Value`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

macro_rules! impl_to_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone().into())
                }
            }
        )*
    };
}

impl_to_value! {
    bool => Bool,
    u8 => Byte,
    char => Char,
    i8 => Int16,
    i16 => Int16,
    u16 => Int32,
    i32 => Int32,
    u32 => Int64,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    Uuid => Guid,
}

impl ToValue for u64 {
    fn to_value(&self) -> Value {
        i64::try_from(*self).map_or_else(|_| Value::Decimal(Decimal(self.to_string())), Value::Int64)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl ToValue for [u8] {
    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::DateTime(self.and_time(chrono::NaiveTime::default()))
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

/// Converts a [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn integral(value: &Value) -> Option<i128> {
    match value {
        Value::Bool(v) => Some(i128::from(*v)),
        Value::Byte(v) => Some(i128::from(*v)),
        Value::Char(v) => Some(i128::from(u32::from(*v))),
        Value::Int16(v) => Some(i128::from(*v)),
        Value::Int32(v) => Some(i128::from(*v)),
        Value::Int64(v) => Some(i128::from(*v)),
        Value::Float(v) => whole_float(f64::from(*v)),
        Value::Double(v) => whole_float(*v),
        Value::Decimal(v) => v.to_i128(),
        Value::Text(v) => v.trim().parse().ok(),
        _ => None,
    }
}

fn whole_float(v: f64) -> Option<i128> {
    // i64 bounds are enough for every integer target we convert into
    (v.is_finite() && v.fract() == 0.0 && v.abs() <= i64::MAX as f64).then_some(v as i128)
}

fn floating(value: &Value) -> Option<f64> {
    match value {
        Value::Float(v) => Some(f64::from(*v)),
        Value::Double(v) => Some(*v),
        Value::Decimal(v) => v.to_f64(),
        Value::Text(v) => v.trim().parse().ok(),
        Value::Bool(_) | Value::Byte(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
            integral(value).map(|n| n as f64)
        }
        _ => None,
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    integral(value).and_then(|n| <$ty>::try_from(n).ok())
                }
            }
        )*
    };
}

impl_from_value_int!(u8, i8, i16, u16, i32, u32, i64, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        floating(value)
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            other => floating(other).map(|v| v as f32),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            Value::Text(v) => {
                let v = v.trim();
                if v.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if v.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    v.parse::<i64>().ok().map(|n| n != 0)
                }
            }
            other => integral(other).map(|n| n != 0),
        }
    }
}

impl FromValue for char {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Char(v) => Some(*v),
            Value::Text(v) => {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            Value::Byte(v) => Some(char::from(*v)),
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => integral(value)
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Bytes(_) => None,
            Value::Text(v) => Some(v.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(v) => Some(v.clone()),
            Value::Text(v) => v.parse().ok(),
            Value::Float(_) | Value::Double(_) => floating(value)
                .filter(|v| v.is_finite())
                .and_then(|v| v.to_string().parse().ok()),
            other => integral(other).map(|n| Decimal(n.to_string())),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(v) => Some(v.clone()),
            Value::Guid(v) => Some(v.as_bytes().to_vec()),
            _ => None,
        }
    }
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(v) => Some(*v),
            Value::Text(v) => {
                let v = v.trim();
                DATETIME_FORMATS
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(v, format).ok())
                    .or_else(|| {
                        NaiveDate::parse_from_str(v, "%Y-%m-%d")
                            .ok()
                            .map(|d| d.and_time(chrono::NaiveTime::default()))
                    })
            }
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Option<Self> {
        NaiveDateTime::from_value(value).map(|v| v.date())
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Guid(v) => Some(*v),
            Value::Text(v) => Uuid::parse_str(v.trim()).ok(),
            Value::Bytes(v) => Uuid::from_slice(v).ok(),
            _ => None,
        }
    }
}
