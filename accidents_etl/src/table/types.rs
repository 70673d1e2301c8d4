//! Column types, cell values and table schemas.

use std::borrow::Cow;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::temporal;

/// Semantic type of a column. Nullability is tracked per value, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Float64,
    Int32,
    Timestamp,
    Boolean,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Float64 => "float64",
            DataType::Int32 => "int32",
            DataType::Timestamp => "timestamp",
            DataType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Float64(f64),
    Timestamp(NaiveDateTime),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of a non-null value.
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::String(_) => Some(DataType::String),
        }
    }

    /// Converts a non-null value so it can live in a column of `dtype`.
    ///
    /// String columns accept any value through its text rendering; int32
    /// widens to float64. Everything else must already match.
    pub fn coerce_to(&self, dtype: DataType) -> Option<Value> {
        match (self, dtype) {
            (Value::Null, _) => None,
            (Value::String(_), DataType::String) => Some(self.clone()),
            (value, DataType::String) => Some(Value::String(value.render().into_owned())),
            (Value::Int32(v), DataType::Float64) => Some(Value::Float64(f64::from(*v))),
            (value, dtype) if value.dtype() == Some(dtype) => Some(value.clone()),
            _ => None,
        }
    }

    /// Text form written to delimited output. Null renders as an empty field.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Int32(v) => Cow::Owned(v.to_string()),
            Value::Float64(v) => Cow::Owned(render_float(*v)),
            Value::Timestamp(ts) => Cow::Owned(temporal::format_timestamp(ts)),
        }
    }
}

/// Whole floats keep one fractional digit, so `0.0` stays `0.0` in text.
fn render_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub dtype: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Ordered set of uniquely named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema, returning the first duplicated name on conflict.
    pub fn try_new(fields: Vec<Field>) -> Result<Self, String> {
        let mut schema = Schema::default();
        for field in fields {
            if schema.contains(&field.name) {
                return Err(field.name);
            }
            schema.fields.push(field);
        }
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn without(&self, names: &[String]) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .filter(|f| !names.contains(&f.name))
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn with_type(&self, name: &str, dtype: DataType) -> Schema {
        let mut schema = self.clone();
        if let Some(field) = schema.fields.iter_mut().find(|f| f.name == name) {
            field.dtype = dtype;
        }
        schema
    }

    pub(crate) fn with_appended(&self, field: Field) -> Schema {
        let mut schema = self.clone();
        schema.fields.push(field);
        schema
    }
}
