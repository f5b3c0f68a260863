// SPDX-License-Identifier: MIT

//! Traits for the external systems a flow runs against.
//!
//! The engine never talks to a record system directly; it goes through these seams so
//! that transport concerns (timeouts, retries, auth) stay with the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use super::error::BoxError;
use super::value::{format_date, ChoiceOption, FieldKind, FlowValue};

/// Reads current field values of a record
#[async_trait]
pub trait FieldReader: Send + Sync {
    /// Returns `Ok(None)` when the field is unset
    async fn field_value(&self, record_id: &str, field_key: &str)
        -> Result<Option<Value>, BoxError>;
}

/// Describes the fields of a record
#[async_trait]
pub trait FieldMetadata: Send + Sync {
    async fn field_kind(&self, record_id: &str, field_key: &str) -> Result<FieldKind, BoxError>;

    async fn field_options(
        &self,
        record_id: &str,
        field_key: &str,
    ) -> Result<Vec<ChoiceOption>, BoxError>;
}

/// Applies side effects emitted by action nodes
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, record_id: &str, action: &ActionDescriptor) -> Result<(), BoxError>;
}

/// Kinds of side effect an action node can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    SetField,
    AddLabel,
    AddComment,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::SetField => write!(f, "setField"),
            ActionKind::AddLabel => write!(f, "addLabel"),
            ActionKind::AddComment => write!(f, "addComment"),
        }
    }
}

/// A resolved side effect, ready for an `ActionExecutor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_kind: Option<FieldKind>,
    pub value: FlowValue,
}

impl ActionDescriptor {
    /// Value as it should be transmitted for the target field.
    ///
    /// Dates are sent as `YYYY-MM-DD`; select fields receive the option's raw id.
    pub fn wire_value(&self) -> Value {
        match (self.field_kind, &self.value) {
            (Some(FieldKind::Date | FieldKind::DateTime), v) => match v.as_date() {
                Some(d) => Value::String(format_date(d)),
                None => v.to_json(),
            },
            (Some(FieldKind::Select), FlowValue::Text(raw)) => json!({ "id": raw }),
            (Some(FieldKind::MultiSelect), FlowValue::Text(raw)) => json!([{ "id": raw }]),
            (Some(FieldKind::MultiSelect), FlowValue::List(raws)) => {
                Value::Array(raws.iter().map(|raw| json!({ "id": raw })).collect())
            }
            (Some(FieldKind::Number), v) => v
                .as_number()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| v.to_json()),
            (_, v) => v.to_json(),
        }
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}({} = {})", self.kind, field, self.value),
            None => write!(f, "{}({})", self.kind, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn set_field(kind: FieldKind, value: FlowValue) -> ActionDescriptor {
        ActionDescriptor {
            kind: ActionKind::SetField,
            field: Some("target".to_string()),
            field_kind: Some(kind),
            value,
        }
    }

    #[test]
    fn test_date_wire_value() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            set_field(FieldKind::Date, FlowValue::Date(d)).wire_value(),
            json!("2024-03-05")
        );
        // answers typed as text still go out as plain dates
        assert_eq!(
            set_field(FieldKind::Date, FlowValue::Text("2024-03-05T10:00:00Z".into()))
                .wire_value(),
            json!("2024-03-05")
        );
    }

    #[test]
    fn test_select_wire_value_uses_raw_id() {
        assert_eq!(
            set_field(FieldKind::Select, FlowValue::Text("10001".into())).wire_value(),
            json!({"id": "10001"})
        );
        assert_eq!(
            set_field(
                FieldKind::MultiSelect,
                FlowValue::List(vec!["1".into(), "2".into()])
            )
            .wire_value(),
            json!([{"id": "1"}, {"id": "2"}])
        );
    }

    #[test]
    fn test_number_wire_value() {
        assert_eq!(
            set_field(FieldKind::Number, FlowValue::Text("42".into())).wire_value(),
            json!(42.0)
        );
    }

    #[test]
    fn test_action_kind_display() {
        assert_eq!(ActionKind::SetField.to_string(), "setField");
        assert_eq!(ActionKind::AddLabel.to_string(), "addLabel");
        assert_eq!(ActionKind::AddComment.to_string(), "addComment");
    }
}
