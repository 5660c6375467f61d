//! Dynamic SQL values.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Covers what an embedded relational store can persist: the five storage
/// classes plus booleans and JSON documents, which are encoded on bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value, stored as INTEGER 0/1
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// JSON document, stored as TEXT
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert a `u64` to `Value`, clamping to `i64::MAX` if it overflows.
    ///
    /// The store has no unsigned 64-bit storage class. A warning is logged
    /// when clamping occurs.
    ///
    /// ```
    /// use sqlkit_core::Value;
    ///
    /// assert_eq!(Value::from_u64_clamped(42), Value::BigInt(42));
    /// assert_eq!(Value::from_u64_clamped(u64::MAX), Value::BigInt(i64::MAX));
    /// ```
    #[must_use]
    pub fn from_u64_clamped(v: u64) -> Self {
        if let Ok(signed) = i64::try_from(v) {
            Value::BigInt(signed)
        } else {
            tracing::warn!(
                value = v,
                clamped_to = i64::MAX,
                "u64 value exceeds i64::MAX; clamping to i64::MAX"
            );
            Value::BigInt(i64::MAX)
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => |$v:ident| $conv:expr),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $conv
                }
            }
        )+
    };
}

impl_from_for_value! {
    bool => |v| Value::Bool(v),
    i8 => |v| Value::Int(i32::from(v)),
    i16 => |v| Value::Int(i32::from(v)),
    i32 => |v| Value::Int(v),
    i64 => |v| Value::BigInt(v),
    u8 => |v| Value::Int(i32::from(v)),
    u16 => |v| Value::Int(i32::from(v)),
    u32 => |v| Value::BigInt(i64::from(v)),
    f32 => |v| Value::Double(f64::from(v)),
    f64 => |v| Value::Double(v),
    String => |v| Value::Text(v),
    &str => |v| Value::Text(v.to_string()),
    &String => |v| Value::Text(v.clone()),
    Vec<u8> => |v| Value::Bytes(v),
    &[u8] => |v| Value::Bytes(v.to_vec()),
    serde_json::Value => |v| Value::Json(v),
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Build a `[Value; N]` parameter array from heterogeneous expressions.
///
/// ```
/// use sqlkit_core::{params, Value};
///
/// let params = params![31337, "so leet"];
/// assert_eq!(params, [Value::Int(31337), Value::Text("so leet".to_string())]);
///
/// let none: [Value; 0] = params![];
/// assert!(none.is_empty());
/// ```
#[macro_export]
macro_rules! params {
    () => {{
        let params: [$crate::Value; 0] = [];
        params
    }};
    ($($param:expr),+ $(,)?) => {
        [$($crate::Value::from($param)),+]
    };
}
