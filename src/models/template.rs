use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format_long_date;

/// A value in a template data bag.
///
/// Deserialization tries booleans, then numbers, then RFC 3339 timestamps,
/// and falls back to plain strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Display for TemplateValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            TemplateValue::Text(s) => write!(f, "{}", s),
            TemplateValue::Number(n) if n.is_finite() && n.fract() == 0.0 => {
                write!(f, "{}", *n as i64)
            }
            TemplateValue::Number(n) => write!(f, "{}", n),
            TemplateValue::Bool(true) => write!(f, "yes"),
            TemplateValue::Bool(false) => write!(f, "no"),
            TemplateValue::Timestamp(ts) => write!(f, "{}", format_long_date(ts)),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Text(value)
    }
}

impl From<f64> for TemplateValue {
    fn from(value: f64) -> Self {
        TemplateValue::Number(value)
    }
}

impl From<u32> for TemplateValue {
    fn from(value: u32) -> Self {
        TemplateValue::Number(f64::from(value))
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        TemplateValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for TemplateValue {
    fn from(value: DateTime<Utc>) -> Self {
        TemplateValue::Timestamp(value)
    }
}

pub type TemplateData = BTreeMap<String, TemplateValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}
