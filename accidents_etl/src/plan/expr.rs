//! Row-local expressions used by derive nodes.

use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use polars::prelude::{Column, DataFrame, PlSmallStr};

use crate::error::{EtlError, EtlResult, PlanError, Stage};
use crate::table::{chunk, temporal};
use crate::table::{DataType, Schema, Value};

/// A derived-column expression.
///
/// Every variant reads only the current row, so evaluation order across
/// chunks and rows never changes the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeriveExpr {
    /// Hour of day, 0-23.
    Hour { column: String },
    Year { column: String },
    /// Month number, 1-12.
    Month { column: String },
    MonthName { column: String },
    /// Monday = 1 through Sunday = 7.
    Weekday { column: String },
    DayName { column: String },
    /// Whole minutes from `start` to `end`, truncated toward zero.
    MinutesBetween { start: String, end: String },
}

impl DeriveExpr {
    pub fn hour(column: impl Into<String>) -> Self {
        DeriveExpr::Hour {
            column: column.into(),
        }
    }

    pub fn year(column: impl Into<String>) -> Self {
        DeriveExpr::Year {
            column: column.into(),
        }
    }

    pub fn month(column: impl Into<String>) -> Self {
        DeriveExpr::Month {
            column: column.into(),
        }
    }

    pub fn month_name(column: impl Into<String>) -> Self {
        DeriveExpr::MonthName {
            column: column.into(),
        }
    }

    pub fn weekday(column: impl Into<String>) -> Self {
        DeriveExpr::Weekday {
            column: column.into(),
        }
    }

    pub fn day_name(column: impl Into<String>) -> Self {
        DeriveExpr::DayName {
            column: column.into(),
        }
    }

    pub fn minutes_between(start: impl Into<String>, end: impl Into<String>) -> Self {
        DeriveExpr::MinutesBetween {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Columns the expression reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DeriveExpr::Hour { column }
            | DeriveExpr::Year { column }
            | DeriveExpr::Month { column }
            | DeriveExpr::MonthName { column }
            | DeriveExpr::Weekday { column }
            | DeriveExpr::DayName { column } => vec![column.as_str()],
            DeriveExpr::MinutesBetween { start, end } => vec![start.as_str(), end.as_str()],
        }
    }

    pub fn output_type(&self) -> DataType {
        match self {
            DeriveExpr::MonthName { .. } | DeriveExpr::DayName { .. } => DataType::String,
            _ => DataType::Int32,
        }
    }

    /// Construction-time check: every input exists and is a timestamp.
    pub fn check(&self, schema: &Schema) -> Result<(), PlanError> {
        for column in self.inputs() {
            let field = schema.field(column).ok_or_else(|| PlanError::MissingColumn {
                node: "derive",
                column: column.to_string(),
            })?;
            if field.dtype != DataType::Timestamp {
                return Err(PlanError::TypeMismatch {
                    node: "derive",
                    column: column.to_string(),
                    expected: DataType::Timestamp,
                    actual: field.dtype,
                });
            }
        }
        Ok(())
    }

    /// Evaluate against every row of `chunk`, producing a column called `name`.
    pub fn evaluate(&self, name: &str, chunk: &DataFrame) -> EtlResult<Column> {
        let names = self.inputs();
        let inputs = names
            .iter()
            .map(|column| read_timestamps(chunk, column))
            .collect::<EtlResult<Vec<_>>>()?;

        let values: Vec<Value> = match self {
            DeriveExpr::MinutesBetween { .. } => inputs[0]
                .iter()
                .zip(&inputs[1])
                .map(|(start, stop)| match (start, stop) {
                    (Some(start), Some(stop)) => minutes_between(start, stop),
                    _ => Value::Null,
                })
                .collect(),
            _ => inputs[0]
                .iter()
                .map(|ts| ts.as_ref().map_or(Value::Null, |ts| self.component(ts)))
                .collect(),
        };
        Ok(into_column(name, self.output_type(), values))
    }

    fn component(&self, ts: &NaiveDateTime) -> Value {
        match self {
            DeriveExpr::Hour { .. } => Value::Int32(ts.hour() as i32),
            DeriveExpr::Year { .. } => Value::Int32(ts.year()),
            DeriveExpr::Month { .. } => Value::Int32(ts.month() as i32),
            DeriveExpr::MonthName { .. } => temporal::month_name(ts.month())
                .map_or(Value::Null, |name| Value::String(name.to_string())),
            DeriveExpr::Weekday { .. } => Value::Int32(temporal::weekday_number(ts) as i32),
            DeriveExpr::DayName { .. } => {
                Value::String(temporal::day_name(ts.weekday()).to_string())
            }
            DeriveExpr::MinutesBetween { .. } => Value::Null,
        }
    }
}

impl fmt::Display for DeriveExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeriveExpr::Hour { column } => write!(f, "hour({column})"),
            DeriveExpr::Year { column } => write!(f, "year({column})"),
            DeriveExpr::Month { column } => write!(f, "month({column})"),
            DeriveExpr::MonthName { column } => write!(f, "month_name({column})"),
            DeriveExpr::Weekday { column } => write!(f, "weekday({column})"),
            DeriveExpr::DayName { column } => write!(f, "day_name({column})"),
            DeriveExpr::MinutesBetween { start, end } => {
                write!(f, "minutes_between({start}, {end})")
            }
        }
    }
}

fn read_timestamps(frame: &DataFrame, column: &str) -> EtlResult<Vec<Option<NaiveDateTime>>> {
    let values = frame.column(column).map_err(|_| {
        EtlError::coercion(Stage::Materialize, column, "column vanished before derive")
    })?;
    if !chunk::is_timestamp(values) {
        return Err(EtlError::coercion(
            Stage::Materialize,
            column,
            format!("expected timestamp, found {}", values.dtype()),
        ));
    }
    chunk::timestamps(values)
        .map_err(|e| EtlError::coercion(Stage::Materialize, column, e.to_string()))
}

fn into_column(name: &str, dtype: DataType, values: Vec<Value>) -> Column {
    let label = PlSmallStr::from(name);
    match dtype {
        DataType::String => {
            let text: Vec<Option<String>> = values
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            Column::new(label, text)
        }
        _ => {
            let ints: Vec<Option<i32>> = values
                .into_iter()
                .map(|v| match v {
                    Value::Int32(i) => Some(i),
                    _ => None,
                })
                .collect();
            Column::new(label, ints)
        }
    }
}

fn minutes_between(start: &NaiveDateTime, end: &NaiveDateTime) -> Value {
    let minutes = (*end - *start).num_minutes();
    i32::try_from(minutes).map_or(Value::Null, Value::Int32)
}
