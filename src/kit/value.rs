// SPDX-License-Identifier: MIT

//! Values flowing through conditions and actions

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A resolved value: a field value, a stored answer, a literal or an evaluated date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FlowValue {
    /// Absent, undefined or null
    #[default]
    Empty,
    Text(String),
    Number(f64),
    /// Calendar day; never carries a time of day
    Date(NaiveDate),
    List(Vec<String>),
}

impl FlowValue {
    /// Convert a raw JSON field value. Option-like objects collapse to their raw id.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FlowValue::Empty,
            Value::String(s) => FlowValue::Text(s.clone()),
            Value::Number(n) => n.as_f64().map(FlowValue::Number).unwrap_or_default(),
            Value::Bool(b) => FlowValue::Text(b.to_string()),
            Value::Array(items) => FlowValue::List(items.iter().map(scalar_text).collect()),
            Value::Object(_) => FlowValue::Text(scalar_text(value)),
        }
    }

    /// True for absent values, empty strings and empty lists
    pub fn is_empty(&self) -> bool {
        match self {
            FlowValue::Empty => true,
            FlowValue::Text(s) => s.is_empty(),
            FlowValue::List(items) => items.is_empty(),
            FlowValue::Number(_) | FlowValue::Date(_) => false,
        }
    }

    /// Interpret as a calendar day, truncating any time of day
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FlowValue::Date(d) => Some(*d),
            FlowValue::Text(s) => parse_calendar_date(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FlowValue::Number(n) => Some(*n),
            FlowValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Plain JSON rendering; dates become `YYYY-MM-DD`
    pub fn to_json(&self) -> Value {
        match self {
            FlowValue::Empty => Value::Null,
            FlowValue::Text(s) => Value::String(s.clone()),
            FlowValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FlowValue::Date(d) => Value::String(format_date(*d)),
            FlowValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl fmt::Display for FlowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowValue::Empty => write!(f, "<empty>"),
            FlowValue::Text(s) => write!(f, "{}", s),
            FlowValue::Number(n) => write!(f, "{}", n),
            FlowValue::Date(d) => write!(f, "{}", format_date(*d)),
            FlowValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Declared type of a record field, as reported by field metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Date,
    DateTime,
    Select,
    MultiSelect,
    Number,
    Text,
    Other,
}

/// One selectable option; `value` is the raw value stored and transmitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ChoiceOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: Some(label.into()),
        }
    }

    /// Label shown to users, falling back to the raw value
    pub fn display(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }

    /// Whether `input` names this option by raw value or by label
    pub fn matches(&self, input: &str) -> bool {
        self.value == input || self.label.as_deref() == Some(input)
    }
}

/// Format a calendar day the way record fields expect it
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a calendar day from a date or timestamp string, discarding the time of day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339, Jira's `2024-01-08T15:30:00.000+0000` and naive timestamps.
pub fn parse_calendar_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|dt| dt.date())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => ["id", "value", "name", "key", "accountId"]
            .iter()
            .find_map(|k| obj.get(*k))
            .map(scalar_text)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(FlowValue::from_json(&json!(null)), FlowValue::Empty);
        assert_eq!(FlowValue::from_json(&json!("x")), FlowValue::Text("x".into()));
        assert_eq!(FlowValue::from_json(&json!(3)), FlowValue::Number(3.0));
        assert_eq!(
            FlowValue::from_json(&json!(true)),
            FlowValue::Text("true".into())
        );
    }

    #[test]
    fn test_from_json_option_objects() {
        let select = json!({"self": "https://x", "value": "High", "id": "10001"});
        assert_eq!(
            FlowValue::from_json(&select),
            FlowValue::Text("10001".into())
        );

        let labels = json!(["a", {"value": "b"}]);
        assert_eq!(
            FlowValue::from_json(&labels),
            FlowValue::List(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(FlowValue::Empty.is_empty());
        assert!(FlowValue::Text(String::new()).is_empty());
        assert!(FlowValue::List(vec![]).is_empty());
        assert!(!FlowValue::Text(" ".into()).is_empty());
        assert!(!FlowValue::Number(0.0).is_empty());
    }

    #[test]
    fn test_parse_calendar_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(parse_calendar_date("2024-01-08"), Some(expected));
        assert_eq!(parse_calendar_date("2024-01-08T15:30:00Z"), Some(expected));
        assert_eq!(
            parse_calendar_date("2024-01-08T23:59:59.000+0000"),
            Some(expected)
        );
        assert_eq!(parse_calendar_date("2024-01-08T09:00:00"), Some(expected));
        assert_eq!(parse_calendar_date("next tuesday"), None);
    }

    #[test]
    fn test_date_renders_without_time() {
        let d = FlowValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(d.to_json(), json!("2024-02-29"));
        assert_eq!(d.to_string(), "2024-02-29");
    }

    #[test]
    fn test_choice_option_matches_value_or_label() {
        let opt = ChoiceOption::new("10001", "High");
        assert!(opt.matches("10001"));
        assert!(opt.matches("High"));
        assert!(!opt.matches("Low"));
        assert_eq!(opt.display(), "High");
    }
}
