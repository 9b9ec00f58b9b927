//! Tagged values and the conversion rules used when reading them back
//!
//! A [`Value`] carries its own type tag. Reads go through [`FromValue`], which
//! only performs the conversions listed here:
//!
//! - `Null` reads as the target type's default (`Option<T>` reads as `None`)
//! - integers convert between widths when the value fits, integral floats
//!   convert to integers, integers widen to floats
//! - strings parse into numbers, booleans, UUIDs, RFC 3339 timestamps and
//!   semantic versions; every value renders to a `String`
//! - enums read by case-insensitive name or by ordinal ([`ArgumentEnum`])
//! - any serde type reads through its JSON form ([`Value::to_serde`])

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};

/// A dynamically typed argument value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Version(semver::Version),
    Json(serde_json::Value),
}

impl Value {
    /// Name of the stored variant, used in error messages and descriptors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::DateTime(_) => "datetime",
            Value::Version(_) => "version",
            Value::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert to `T` using the enumerated coercion rules
    pub fn get<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }

    /// Read an enum by name or ordinal
    pub fn to_enum<E: ArgumentEnum>(&self) -> Result<E> {
        let found = match self {
            Value::Null => E::VARIANTS.first().copied(),
            Value::String(name) => {
                let name = name.trim();
                E::VARIANTS
                    .iter()
                    .find(|v| v.name().eq_ignore_ascii_case(name))
                    .copied()
                    .or_else(|| {
                        name.parse::<usize>()
                            .ok()
                            .and_then(|i| E::VARIANTS.get(i).copied())
                    })
            }
            Value::Int(i) => usize::try_from(*i)
                .ok()
                .and_then(|i| E::VARIANTS.get(i).copied()),
            Value::UInt(u) => usize::try_from(*u)
                .ok()
                .and_then(|i| E::VARIANTS.get(i).copied()),
            _ => None,
        };
        found.ok_or_else(|| WorkflowError::TypeMismatch {
            expected: std::any::type_name::<E>(),
            found: self.kind().to_string(),
        })
    }

    /// Store any serde type through its JSON form
    pub fn from_serde<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Value::from_json(serde_json::to_value(value)?))
    }

    /// Read any serde type through its JSON form
    pub fn to_serde<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    /// Flat JSON rendering used by persistence and descriptors
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::UInt(u) => serde_json::Value::from(*u),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::DateTime(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::Version(v) => serde_json::Value::String(v.to_string()),
            Value::Json(j) => j.clone(),
        }
    }

    /// Inverse of [`Value::to_json`]; strings stay strings and are coerced on read
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Json(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::DateTime(d) => f.write_str(&d.to_rfc3339()),
            Value::Version(v) => write!(f, "{v}"),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

// ============================================================================
// Conversions into Value
// ============================================================================

macro_rules! impl_into_value {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        }
    )*};
}

impl_into_value! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => UInt,
    u16 => UInt,
    u32 => UInt,
    u64 => UInt,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
    Uuid => Uuid,
    DateTime<Utc> => DateTime,
    semver::Version => Version,
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Conversions out of Value
// ============================================================================

/// Types readable from a [`Value`]
pub trait FromValue: Sized {
    /// Type name reported on conversion failure
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T: FromValue>(value: &Value) -> WorkflowError {
    WorkflowError::TypeMismatch {
        expected: T::TYPE_NAME,
        found: value.kind().to_string(),
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {$(
        impl FromValue for $t {
            const TYPE_NAME: &'static str = stringify!($t);

            fn from_value(value: &Value) -> Result<Self> {
                let converted = match value {
                    Value::Null => Some(0),
                    Value::Bool(b) => Some(<$t>::from(*b)),
                    Value::Int(i) => <$t>::try_from(*i).ok(),
                    Value::UInt(u) => <$t>::try_from(*u).ok(),
                    // `MAX as f64` rounds up for 64-bit types, so bound by MAX + 1 exactly
                    Value::Float(f)
                        if f.fract() == 0.0
                            && *f >= <$t>::MIN as f64
                            && *f < ((<$t>::MAX / 2 + 1) as f64) * 2.0 =>
                    {
                        Some(*f as $t)
                    }
                    Value::String(s) => s.trim().parse::<$t>().ok(),
                    Value::Json(j) => j
                        .as_i64()
                        .and_then(|i| <$t>::try_from(i).ok())
                        .or_else(|| j.as_u64().and_then(|u| <$t>::try_from(u).ok())),
                    _ => None,
                };
                converted.ok_or_else(|| mismatch::<Self>(value))
            }
        }
    )*};
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(0.0),
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::UInt(u) => Ok(*u as f64),
            Value::String(s) => s.trim().parse().map_err(|_| mismatch::<Self>(value)),
            Value::Json(j) => j.as_f64().ok_or_else(|| mismatch::<Self>(value)),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for f32 {
    const TYPE_NAME: &'static str = "f32";

    fn from_value(value: &Value) -> Result<Self> {
        let wide = f64::from_value(value).map_err(|_| mismatch::<Self>(value))?;
        let narrow = wide as f32;
        if f64::from(narrow) == wide || !wide.is_finite() {
            Ok(narrow)
        } else {
            Err(mismatch::<Self>(value))
        }
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::UInt(u) => Ok(*u != 0),
            Value::String(s) => match s.trim() {
                t if t.eq_ignore_ascii_case("true") => Ok(true),
                t if t.eq_ignore_ascii_case("false") => Ok(false),
                _ => Err(mismatch::<Self>(value)),
            },
            Value::Json(j) => j.as_bool().ok_or_else(|| mismatch::<Self>(value)),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(serde_json::Value::String(s)) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Uuid {
    const TYPE_NAME: &'static str = "uuid";

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Uuid::nil()),
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => Uuid::parse_str(s.trim()).map_err(|_| mismatch::<Self>(value)),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "datetime";

    fn from_value(value: &Value) -> Result<Self> {
        let converted = match value {
            Value::Null => Self::from_timestamp(0, 0),
            Value::DateTime(d) => Some(*d),
            Value::Int(ms) => Self::from_timestamp_millis(*ms),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        };
        converted.ok_or_else(|| mismatch::<Self>(value))
    }
}

impl FromValue for semver::Version {
    const TYPE_NAME: &'static str = "version";

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(semver::Version::new(0, 0, 0)),
            Value::Version(v) => Ok(v.clone()),
            Value::String(s) => parse_version(s.trim()).ok_or_else(|| mismatch::<Self>(value)),
            _ => Err(mismatch::<Self>(value)),
        }
    }
}

/// Accepts "1", "1.2" and full semantic versions
fn parse_version(s: &str) -> Option<semver::Version> {
    if let Ok(version) = semver::Version::parse(s) {
        return Some(version);
    }
    let parts: Vec<u64> = s
        .split('.')
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [major] => Some(semver::Version::new(*major, 0, 0)),
        [major, minor] => Some(semver::Version::new(*major, *minor, 0)),
        _ => None,
    }
}

impl FromValue for serde_json::Value {
    const TYPE_NAME: &'static str = "json";

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.to_json())
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Enums stored in arguments by name
///
/// ```ignore
/// #[derive(Clone, Copy, PartialEq, Debug)]
/// enum Priority { Low, High }
///
/// impl ArgumentEnum for Priority {
///     const VARIANTS: &'static [Self] = &[Priority::Low, Priority::High];
///     fn name(&self) -> &'static str {
///         match self { Priority::Low => "Low", Priority::High => "High" }
///     }
/// }
/// ```
pub trait ArgumentEnum: Sized + Copy + 'static {
    /// All variants in ordinal order
    const VARIANTS: &'static [Self];

    fn name(&self) -> &'static str;

    fn to_value(&self) -> Value {
        Value::String(self.name().to_string())
    }
}
