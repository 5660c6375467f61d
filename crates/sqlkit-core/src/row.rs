//! Database row representation and typed decoding.

use crate::Result;
use crate::error::{BindingError, BindingErrorKind, Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row produced by one cursor shares the same
/// names.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    ///
    /// When a name repeats (`SELECT a.id, b.id ...`), lookups by name resolve
    /// to the first occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get the name of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a query.
///
/// Values are addressable by position (the order of the select list) and by
/// column name.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a row that owns its column metadata.
    ///
    /// Drivers building many rows from one result set use
    /// [`Row::with_columns`] instead.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            values,
            columns: Arc::new(ColumnInfo::new(column_names)),
        }
    }

    /// Create a row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Get a typed value by column index.
    #[allow(clippy::result_large_err)]
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!(
                    "index {} out of bounds (row has {} columns)",
                    index,
                    self.len()
                ),
                column: None,
                index: Some(index),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.index = Some(index);
                te.column = self.columns.name_at(index).map(str::to_string);
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Get a typed value by column name.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let index = self.columns.index_of(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
                index: None,
            })
        })?;
        self.get_as(index)
    }

    /// Decode the whole row positionally.
    ///
    /// ```
    /// use sqlkit_core::{Row, Value};
    ///
    /// let row = Row::new(
    ///     vec!["id".into(), "name".into()],
    ///     vec![Value::Int(42), Value::Text("mol".into())],
    /// );
    /// let (id, name): (i64, String) = row.scan().unwrap();
    /// assert_eq!((id, name.as_str()), (42, "mol"));
    /// ```
    #[allow(clippy::result_large_err)]
    pub fn scan<T: FromRow>(&self) -> Result<T> {
        T::from_row(self)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (column_name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names().zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Conversion from a single [`Value`] into a Rust type.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_error(expected: &'static str, actual: impl Into<String>) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.into(),
        column: None,
        index: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| type_error("bool", value.type_name()))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_i64()
            .ok_or_else(|| type_error("i64", value.type_name()))
    }
}

macro_rules! impl_from_value_via_i64 {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = i64::from_value(value)
                        .map_err(|_| type_error(stringify!($ty), value.type_name()))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        type_error(stringify!($ty), format!("value {} out of range", wide))
                    })
                }
            }
        )+
    };
}

impl_from_value_via_i64!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_f64()
            .ok_or_else(|| type_error("f64", value.type_name()))
    }
}

/// Text, or the text form of a scalar.
///
/// Columns without text affinity store numeric-looking strings as numbers, so
/// numbers are rendered back: integers in decimal, floats in their shortest
/// round-trip form with an exponent outside `1e-4..1e6`. `NULL` and blobs are
/// rejected.
impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Json(j) => Ok(j.to_string()),
            Value::Int(v) => Ok(v.to_string()),
            Value::BigInt(v) => Ok(v.to_string()),
            Value::Double(v) => Ok(float_text(*v)),
            Value::Bool(v) => Ok(v.to_string()),
            Value::Null | Value::Bytes(_) => Err(type_error("String", value.type_name())),
        }
    }
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.5e-7"
    let sci = format!("{:e}", v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..6).contains(&exp) {
        v.to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| type_error("Vec<u8>", value.type_name()))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s)
                .map_err(|e| type_error("valid JSON", format!("invalid JSON: {}", e))),
            _ => Err(type_error("JSON", value.type_name())),
        }
    }
}

/// Positional decoding of a whole row into caller-chosen slots.
///
/// Implemented for tuples of up to eight [`FromValue`] types, where the
/// tuple arity must equal the row's column count, and for [`Row`] itself.
pub trait FromRow: Sized {
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

fn expect_columns(row: &Row, expected: usize) -> Result<()> {
    if row.len() == expected {
        Ok(())
    } else {
        Err(Error::Binding(BindingError {
            kind: BindingErrorKind::ColumnCount,
            expected,
            actual: row.len(),
            sql: None,
        }))
    }
}

macro_rules! impl_from_row_for_tuple {
    ($len:literal => $($idx:tt $ty:ident),+) => {
        impl<$($ty: FromValue),+> FromRow for ($($ty,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                expect_columns(row, $len)?;
                Ok(($(row.get_as::<$ty>($idx)?,)+))
            }
        }
    };
}

impl_from_row_for_tuple!(1 => 0 A);
impl_from_row_for_tuple!(2 => 0 A, 1 B);
impl_from_row_for_tuple!(3 => 0 A, 1 B, 2 C);
impl_from_row_for_tuple!(4 => 0 A, 1 B, 2 C, 3 D);
impl_from_row_for_tuple!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_from_row_for_tuple!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_from_row_for_tuple!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_from_row_for_tuple!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn foo_row(id: Value, name: &str) -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![id, Value::Text(name.to_string())],
        )
    }

    #[test]
    fn test_row_basic_access() {
        let row = foo_row(Value::Int(42), "meaning of life");

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(42)));
        assert_eq!(row.get(2), None);
        assert_eq!(
            row.get_by_name("name"),
            Some(&Value::Text("meaning of life".to_string()))
        );
        assert_eq!(row.get_by_name("missing"), None);
        assert!(row.contains_column("id"));
    }

    #[test]
    fn test_row_typed_access() {
        let row = foo_row(Value::BigInt(12_345_678), "monotonic");

        assert_eq!(row.get_as::<i64>(0).unwrap(), 12_345_678);
        assert_eq!(row.get_as::<i32>(0).unwrap(), 12_345_678);
        assert_eq!(row.get_named::<String>("name").unwrap(), "monotonic");
    }

    #[test]
    fn test_type_error_names_the_column() {
        let row = foo_row(Value::Text("not a number".to_string()), "x");

        match row.get_as::<i64>(0) {
            Err(Error::Type(te)) => {
                assert_eq!(te.index, Some(0));
                assert_eq!(te.column.as_deref(), Some("id"));
                assert_eq!(te.actual, "TEXT");
            }
            other => panic!("expected type error, got {other:?}"),
        }
        assert!(row.get_named::<i64>("missing").is_err());
        assert!(row.get_as::<i64>(99).is_err());
    }

    #[test]
    fn test_narrowing_out_of_range() {
        let row = Row::new(vec!["n".to_string()], vec![Value::BigInt(i64::MAX)]);
        let err = row.get_as::<i32>(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindingMismatch);
        assert!(err.to_string().contains("out of range"));

        let negative = Row::new(vec!["n".to_string()], vec![Value::Int(-1)]);
        assert!(negative.get_as::<u32>(0).is_err());
    }

    #[test]
    fn test_null_handling() {
        let row = Row::new(vec!["nullable".to_string()], vec![Value::Null]);

        assert_eq!(row.get_named::<Option<i32>>("nullable").unwrap(), None);
        assert!(row.get_named::<i32>("nullable").is_err());
    }

    #[test]
    fn test_scan_tuple() {
        let row = foo_row(Value::Int(31337), "so leet");
        let (id, name): (i64, String) = row.scan().unwrap();
        assert_eq!(id, 31337);
        assert_eq!(name, "so leet");

        let (id, name): (u32, Option<String>) = row.scan().unwrap();
        assert_eq!(id, 31337);
        assert_eq!(name.as_deref(), Some("so leet"));
    }

    #[test]
    fn test_scan_column_count_mismatch() {
        let row = foo_row(Value::Int(1), "a");

        match row.scan::<(i64,)>() {
            Err(Error::Binding(b)) => {
                assert_eq!(b.kind, BindingErrorKind::ColumnCount);
                assert_eq!(b.expected, 1);
                assert_eq!(b.actual, 2);
            }
            other => panic!("expected binding error, got {other:?}"),
        }
        assert!(row.scan::<(i64, String, String)>().is_err());
    }

    #[test]
    fn test_scan_type_mismatch() {
        let row = foo_row(Value::Int(1), "a");
        let err = row.scan::<(i64, i64)>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindingMismatch);
    }

    #[test]
    fn test_scan_whole_row() {
        let row = foo_row(Value::Int(1), "a");
        let copy: Row = row.scan().unwrap();
        assert_eq!(copy.values().count(), 2);
    }

    #[test]
    fn test_row_iterators() {
        let row = Row::new(
            vec!["a".to_string(), "b".to_string()],
            vec![Value::Int(1), Value::Int(2)],
        );

        let names: Vec<_> = row.column_names().collect();
        assert_eq!(names, vec!["a", "b"]);

        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(pairs, vec![("a", &Value::Int(1)), ("b", &Value::Int(2))]);

        assert_eq!(row.into_values(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_shared_columns() {
        let columns = Arc::new(ColumnInfo::new(vec!["id".to_string()]));
        let row1 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(1)]);
        let row2 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(2)]);

        assert!(Arc::ptr_eq(&row1.column_info(), &row2.column_info()));
        assert_eq!(row2.get_named::<i32>("id").unwrap(), 2);
    }

    #[test]
    fn test_duplicate_column_names_resolve_first() {
        let info = ColumnInfo::new(vec!["id".to_string(), "id".to_string()]);
        assert_eq!(info.index_of("id"), Some(0));
        assert_eq!(info.len(), 2);
        assert_eq!(info.name_at(1), Some("id"));
    }

    #[test]
    fn test_string_from_numbers() {
        assert_eq!(String::from_value(&Value::Int(42)).unwrap(), "42");
        assert_eq!(String::from_value(&Value::BigInt(-12_345_678_901)).unwrap(), "-12345678901");
        assert_eq!(String::from_value(&Value::Bool(true)).unwrap(), "true");

        let cases = [
            (3.5, "3.5"),
            (100.0, "100"),
            (0.0001, "0.0001"),
            (123_456.0, "123456"),
            (1_000_000.0, "1e+06"),
            (0.000_012_5, "1.25e-05"),
            (1e21, "1e+21"),
            (-2.5e-300, "-2.5e-300"),
            (f64::INFINITY, "+Inf"),
        ];
        for (v, text) in cases {
            assert_eq!(String::from_value(&Value::Double(v)).unwrap(), text, "{v}");
        }

        assert!(String::from_value(&Value::Null).is_err());
        assert!(String::from_value(&Value::Bytes(vec![1])).is_err());
    }

    #[test]
    fn test_json_from_text() {
        let v = serde_json::Value::from_value(&Value::Text(r#"{"a":1}"#.to_string())).unwrap();
        assert_eq!(v["a"], 1);
        assert!(serde_json::Value::from_value(&Value::Text("{".to_string())).is_err());
    }
}
