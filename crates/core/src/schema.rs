use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::record::{RawRecord, Record};
use crate::value::{parse_timestamp, timestamp_from_epoch_secs, Value};

/// Declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Int64,
    Float64,
    Bool,
    Timestamp,
    Date,
}

impl ColumnType {
    /// Whether `value` may be stored in a column of this type (nulls excluded).
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::String, Value::String(_))
                | (ColumnType::Int64, Value::Int64(_))
                | (ColumnType::Float64, Value::Float64(_))
                | (ColumnType::Bool, Value::Bool(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
                | (ColumnType::Date, Value::Date(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "STRING"),
            ColumnType::Int64 => write!(f, "INT64"),
            ColumnType::Float64 => write!(f, "FLOAT64"),
            ColumnType::Bool => write!(f, "BOOL"),
            ColumnType::Timestamp => write!(f, "TIMESTAMP"),
            ColumnType::Date => write!(f, "DATE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnMode {
    #[default]
    Nullable,
    Required,
}

/// One column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
    pub mode: ColumnMode,
}

impl Field {
    pub fn nullable(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            mode: ColumnMode::Nullable,
        }
    }

    pub fn required(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            mode: ColumnMode::Required,
        }
    }

    pub fn is_required(&self) -> bool {
        self.mode == ColumnMode::Required
    }
}

/// Ordered column schema with unique column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Invalid("schema has no columns".into()));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "duplicate column '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Column names in schema order.
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Return a copy with `columns` switched to [`ColumnMode::Required`].
    pub fn with_required(mut self, columns: &[String]) -> Self {
        for field in &mut self.fields {
            if columns.contains(&field.name) {
                field.mode = ColumnMode::Required;
            }
        }
        self
    }

    /// Check that `record` has exactly this schema's columns with matching types.
    pub fn validate(&self, record: &Record) -> Result<(), SchemaError> {
        for name in record.keys() {
            if !self.contains(name) {
                return Err(SchemaError::UnexpectedColumn(name.clone()));
            }
        }
        for field in &self.fields {
            let value = record
                .get(&field.name)
                .ok_or_else(|| SchemaError::MissingColumn(field.name.clone()))?;
            check_value(field, value)?;
        }
        Ok(())
    }

    /// Coerce a raw fetched record into a [`Record`] in schema order.
    ///
    /// Missing fields become `Null`, unknown fields are dropped, and values are
    /// converted to the declared column types.
    pub fn normalize(&self, raw: &RawRecord) -> Result<Record, SchemaError> {
        let mut record = Record::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match raw.get(&field.name) {
                Some(json) => coerce(field, json)?,
                None => Value::Null,
            };
            check_value(field, &value)?;
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }
}

fn check_value(field: &Field, value: &Value) -> Result<(), SchemaError> {
    if value.is_null() {
        if field.is_required() {
            return Err(SchemaError::NullInRequired(field.name.clone()));
        }
        return Ok(());
    }
    if !field.column_type.accepts(value) {
        return Err(mismatch(field, value.kind()));
    }
    Ok(())
}

fn mismatch(field: &Field, actual: &str) -> SchemaError {
    SchemaError::TypeMismatch {
        column: field.name.clone(),
        expected: field.column_type.to_string(),
        actual: actual.to_string(),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn coerce(field: &Field, json: &serde_json::Value) -> Result<Value, SchemaError> {
    use serde_json::Value as J;

    if json.is_null() {
        return Ok(Value::Null);
    }

    let coerced = match (field.column_type, json) {
        (ColumnType::String, J::String(s)) => Some(Value::String(s.clone())),
        (ColumnType::String, J::Number(n)) => Some(Value::String(n.to_string())),
        (ColumnType::String, J::Bool(b)) => Some(Value::String(b.to_string())),
        (ColumnType::String, other) => Some(Value::String(other.to_string())),

        (ColumnType::Int64, J::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::Int64),
        (ColumnType::Int64, J::String(s)) => s.trim().parse().ok().map(Value::Int64),

        (ColumnType::Float64, J::Number(n)) => n.as_f64().map(Value::Float64),
        (ColumnType::Float64, J::String(s)) => s.trim().parse().ok().map(Value::Float64),

        (ColumnType::Bool, J::Bool(b)) => Some(Value::Bool(*b)),
        (ColumnType::Bool, J::String(s)) => match s.to_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },

        (ColumnType::Timestamp, J::Number(n)) => {
            n.as_f64().and_then(timestamp_from_epoch_secs).map(Value::Timestamp)
        }
        (ColumnType::Timestamp, J::String(s)) => parse_timestamp(s)
            .or_else(|| s.trim().parse::<f64>().ok().and_then(timestamp_from_epoch_secs))
            .map(Value::Timestamp),

        (ColumnType::Date, J::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .or_else(|| parse_timestamp(s).map(|ts| ts.date_naive()))
            .map(Value::Date),

        _ => None,
    };

    coerced.ok_or_else(|| mismatch(field, json_kind(json)))
}
