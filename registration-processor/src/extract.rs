//! Typed reads out of queue payloads.
//!
//! A payload is a JSON object of named sections (`patient`, `encounter`, ...), each mapping
//! dotted keys to scalars or arrays. Reads never fail eagerly: problems are recorded in the
//! run's [`ErrorAggregate`] and the read falls back to "absent".

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::errors::{ErrorAggregate, ProcessingError};

/// Location of a field inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath {
    pub section: &'static str,
    pub key: &'static str,
}

impl FieldPath {
    pub const fn new(section: &'static str, key: &'static str) -> Self {
        Self { section, key }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Bool,
    TextList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Absent,
    Text(String),
    Date(NaiveDate),
    Bool(bool),
    /// Repeated fields. A single occurrence is normalized to a one element list.
    TextList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Payload {
    sections: Map<String, Value>,
}

impl Payload {
    pub fn parse(raw: &str) -> Result<Self, ProcessingError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(sections)) => Ok(Self { sections }),
            Ok(other) => Err(ProcessingError::extraction(
                "payload",
                format!("expected a JSON object, got {}", json_type(&other)),
            )),
            Err(error) => Err(ProcessingError::extraction("payload", error.to_string())),
        }
    }

    fn raw(&self, path: FieldPath) -> Option<&Value> {
        match self.sections.get(path.section)?.get(path.key)? {
            Value::Null => None,
            value => Some(value),
        }
    }

    /// Reads `path` as `kind`.
    pub fn extract(&self, path: FieldPath, kind: FieldKind) -> Result<FieldValue, ProcessingError> {
        let Some(value) = self.raw(path) else {
            return Ok(FieldValue::Absent);
        };

        match kind {
            FieldKind::Text => scalar_text(value)
                .map(FieldValue::Text)
                .ok_or_else(|| expected(path, "a single value", value)),
            FieldKind::Date => {
                let text = scalar_text(value).ok_or_else(|| expected(path, "a date", value))?;
                parse_date(&text)
                    .map(FieldValue::Date)
                    .ok_or_else(|| ProcessingError::extraction(path, format!("'{}' is not a valid date", text)))
            }
            FieldKind::Bool => match value {
                Value::Bool(flag) => Ok(FieldValue::Bool(*flag)),
                other => scalar_text(other)
                    .and_then(|text| parse_bool(&text))
                    .map(FieldValue::Bool)
                    .ok_or_else(|| expected(path, "a boolean", other)),
            },
            FieldKind::TextList => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| scalar_text(item).ok_or_else(|| expected(path, "a list of values", item)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::TextList),
                other => scalar_text(other)
                    .map(|text| FieldValue::TextList(vec![text]))
                    .ok_or_else(|| expected(path, "a list of values", other)),
            },
        }
    }

    pub fn read_string(&self, path: FieldPath, errors: &mut ErrorAggregate) -> Option<String> {
        match self.extract(path, FieldKind::Text) {
            Ok(FieldValue::Text(text)) => Some(text),
            Ok(_) => None,
            Err(error) => {
                errors.push(error);
                None
            }
        }
    }

    /// Like [`Payload::read_string`], but blank strings read as absent.
    pub fn read_non_blank(&self, path: FieldPath, errors: &mut ErrorAggregate) -> Option<String> {
        self.read_string(path, errors)
            .filter(|text| !text.trim().is_empty())
    }

    pub fn read_date(&self, path: FieldPath, errors: &mut ErrorAggregate) -> Option<NaiveDate> {
        match self.extract(path, FieldKind::Date) {
            Ok(FieldValue::Date(date)) => Some(date),
            Ok(_) => None,
            Err(error) => {
                errors.push(error);
                None
            }
        }
    }

    /// Absent and unreadable flags both read as `false`.
    pub fn read_bool(&self, path: FieldPath, errors: &mut ErrorAggregate) -> bool {
        match self.extract(path, FieldKind::Bool) {
            Ok(FieldValue::Bool(flag)) => flag,
            Ok(_) => false,
            Err(error) => {
                errors.push(error);
                false
            }
        }
    }

    pub fn read_list(&self, path: FieldPath, errors: &mut ErrorAggregate) -> Vec<String> {
        match self.extract(path, FieldKind::TextList) {
            Ok(FieldValue::TextList(items)) => items,
            Ok(_) => Vec::new(),
            Err(error) => {
                errors.push(error);
                Vec::new()
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn expected(path: FieldPath, what: &str, got: &Value) -> ProcessingError {
    ProcessingError::extraction(path, format!("expected {}, got {}", what, json_type(got)))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|datetime| datetime.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|datetime| datetime.date_naive())
        })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
