//! Resolution of subjects and value specifications
//!
//! Logic and action nodes both go through `ValueResolver`, so a literal, a date
//! expression or a question reference means the same thing wherever it appears.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::types::{Subject, ValueSpec};
use crate::forge::flow::expression;
use crate::forge::flow::state::Answer;
use crate::kit::collaborator::{FieldMetadata, FieldReader};
use crate::kit::error::ResolutionError;
use crate::kit::value::{FieldKind, FlowValue};

pub struct ValueResolver<'a> {
    record_id: &'a str,
    answers: &'a BTreeMap<String, Answer>,
    fields: &'a dyn FieldReader,
    metadata: &'a dyn FieldMetadata,
    today: NaiveDate,
}

impl<'a> ValueResolver<'a> {
    pub fn new(
        record_id: &'a str,
        answers: &'a BTreeMap<String, Answer>,
        fields: &'a dyn FieldReader,
        metadata: &'a dyn FieldMetadata,
        today: NaiveDate,
    ) -> Self {
        Self {
            record_id,
            answers,
            fields,
            metadata,
            today,
        }
    }

    /// The value a logic node compares. An unanswered question reads as empty.
    pub async fn subject(&self, subject: &Subject) -> Result<FlowValue, ResolutionError> {
        match subject {
            Subject::Field { key } => self.field(key).await,
            Subject::Question { node } => Ok(self
                .answers
                .get(node)
                .map(Answer::to_value)
                .unwrap_or_default()),
        }
    }

    /// Resolve a value specification
    pub async fn value(&self, spec: &ValueSpec) -> Result<FlowValue, ResolutionError> {
        match spec {
            ValueSpec::Literal { value } => Ok(FlowValue::from_json(value)),
            ValueSpec::Date { expression: raw } => {
                Ok(FlowValue::Date(expression::resolve(raw, self.today)?))
            }
            ValueSpec::Question { node } => self
                .answers
                .get(node)
                .map(Answer::to_value)
                .ok_or_else(|| ResolutionError::MissingAnswer(node.clone())),
            ValueSpec::Choice { value, .. } => Ok(FlowValue::Text(value.clone())),
        }
    }

    async fn field(&self, key: &str) -> Result<FlowValue, ResolutionError> {
        let raw = self
            .fields
            .field_value(self.record_id, key)
            .await
            .map_err(|e| ResolutionError::Field {
                field: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(raw.as_ref().map(FlowValue::from_json).unwrap_or_default())
    }

    /// Look up the declared type of a target field
    pub async fn field_kind(&self, field: &str) -> Result<FieldKind, ResolutionError> {
        self.metadata
            .field_kind(self.record_id, field)
            .await
            .map_err(|e| ResolutionError::Metadata {
                field: field.to_string(),
                message: e.to_string(),
            })
    }

    /// Coerce a resolved value to what `field` accepts.
    ///
    /// Dates collapse to a calendar day and select values are mapped to the option's raw
    /// value, accepting a label when no raw value matches.
    pub async fn coerce_for_field(
        &self,
        field: &str,
        kind: FieldKind,
        value: FlowValue,
    ) -> Result<FlowValue, ResolutionError> {
        if value.is_empty() {
            return Ok(value);
        }
        let invalid = |value: &FlowValue| ResolutionError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };

        match kind {
            FieldKind::Date | FieldKind::DateTime => value
                .as_date()
                .map(FlowValue::Date)
                .ok_or_else(|| invalid(&value)),
            FieldKind::Number => value
                .as_number()
                .map(FlowValue::Number)
                .ok_or_else(|| invalid(&value)),
            FieldKind::Select | FieldKind::MultiSelect => {
                let options = self
                    .metadata
                    .field_options(self.record_id, field)
                    .await
                    .map_err(|e| ResolutionError::Metadata {
                        field: field.to_string(),
                        message: e.to_string(),
                    })?;
                let raw_for = |input: &str| {
                    options
                        .iter()
                        .find(|o| o.value == input)
                        .or_else(|| options.iter().find(|o| o.matches(input)))
                        .map(|o| o.value.clone())
                };
                let mapped = match &value {
                    FlowValue::Text(s) => raw_for(s).map(FlowValue::Text),
                    FlowValue::Number(n) => raw_for(&n.to_string()).map(FlowValue::Text),
                    FlowValue::List(items) => items
                        .iter()
                        .map(|s| raw_for(s))
                        .collect::<Option<Vec<_>>>()
                        .map(FlowValue::List),
                    FlowValue::Date(_) | FlowValue::Empty => None,
                };
                mapped.ok_or_else(|| invalid(&value))
            }
            FieldKind::Text | FieldKind::Other => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::error::BoxError;
    use crate::kit::value::ChoiceOption;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    struct MockRecord {
        fields: HashMap<String, Value>,
        fail_options: bool,
    }

    #[async_trait]
    impl FieldReader for MockRecord {
        async fn field_value(&self, _: &str, key: &str) -> Result<Option<Value>, BoxError> {
            if key == "broken" {
                return Err("connection reset".into());
            }
            Ok(self.fields.get(key).cloned())
        }
    }

    #[async_trait]
    impl FieldMetadata for MockRecord {
        async fn field_kind(&self, _: &str, _: &str) -> Result<FieldKind, BoxError> {
            Ok(FieldKind::Text)
        }

        async fn field_options(&self, _: &str, _: &str) -> Result<Vec<ChoiceOption>, BoxError> {
            if self.fail_options {
                return Err("metadata unavailable".into());
            }
            Ok(vec![
                ChoiceOption::new("1", "High"),
                ChoiceOption::new("2", "Low"),
            ])
        }
    }

    fn record() -> MockRecord {
        MockRecord {
            fields: HashMap::from([("priority".to_string(), json!({"id": "1", "name": "High"}))]),
            fail_options: false,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
    }

    #[tokio::test]
    async fn test_subjects() {
        let rec = record();
        let answers = BTreeMap::from([("q".to_string(), Answer::Number(2.0))]);
        let resolver = ValueResolver::new("OPS-1", &answers, &rec, &rec, today());

        let field = Subject::Field {
            key: "priority".to_string(),
        };
        assert_eq!(
            resolver.subject(&field).await.unwrap(),
            FlowValue::Text("1".into())
        );

        let unset = Subject::Field {
            key: "duedate".to_string(),
        };
        assert_eq!(resolver.subject(&unset).await.unwrap(), FlowValue::Empty);

        let unanswered = Subject::Question {
            node: "other".to_string(),
        };
        assert_eq!(
            resolver.subject(&unanswered).await.unwrap(),
            FlowValue::Empty
        );

        let broken = Subject::Field {
            key: "broken".to_string(),
        };
        assert!(matches!(
            resolver.subject(&broken).await,
            Err(ResolutionError::Field { .. })
        ));
    }

    #[tokio::test]
    async fn test_value_specs() {
        let rec = record();
        let answers = BTreeMap::from([("q".to_string(), Answer::Number(2.0))]);
        let resolver = ValueResolver::new("OPS-1", &answers, &rec, &rec, today());

        assert_eq!(
            resolver.value(&ValueSpec::date("today() + 7d")).await.unwrap(),
            FlowValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(
            resolver.value(&ValueSpec::question("q")).await.unwrap(),
            FlowValue::Number(2.0)
        );
        assert_eq!(
            resolver.value(&ValueSpec::question("nope")).await,
            Err(ResolutionError::MissingAnswer("nope".to_string()))
        );
        assert!(matches!(
            resolver.value(&ValueSpec::date("7x")).await,
            Err(ResolutionError::Expression(_))
        ));
        assert_eq!(
            resolver
                .value(&ValueSpec::Choice {
                    value: "2".to_string(),
                    label: Some("Low".to_string()),
                })
                .await
                .unwrap(),
            FlowValue::Text("2".into())
        );
    }

    #[tokio::test]
    async fn test_select_coercion_maps_labels() {
        let rec = record();
        let answers = BTreeMap::new();
        let resolver = ValueResolver::new("OPS-1", &answers, &rec, &rec, today());

        let coerced = resolver
            .coerce_for_field("priority", FieldKind::Select, FlowValue::Text("Low".into()))
            .await
            .unwrap();
        assert_eq!(coerced, FlowValue::Text("2".into()));

        assert!(matches!(
            resolver
                .coerce_for_field("priority", FieldKind::Select, FlowValue::Text("Meh".into()))
                .await,
            Err(ResolutionError::InvalidValue { .. })
        ));

        let failing = MockRecord {
            fail_options: true,
            ..record()
        };
        let resolver = ValueResolver::new("OPS-1", &answers, &failing, &failing, today());
        assert!(matches!(
            resolver
                .coerce_for_field("priority", FieldKind::Select, FlowValue::Text("1".into()))
                .await,
            Err(ResolutionError::Metadata { .. })
        ));
    }

    #[tokio::test]
    async fn test_date_coercion() {
        let rec = record();
        let answers = BTreeMap::new();
        let resolver = ValueResolver::new("OPS-1", &answers, &rec, &rec, today());

        assert_eq!(
            resolver
                .coerce_for_field(
                    "duedate",
                    FieldKind::Date,
                    FlowValue::Text("2024-02-01".into())
                )
                .await
                .unwrap(),
            FlowValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        );
        assert!(resolver
            .coerce_for_field("duedate", FieldKind::Date, FlowValue::Number(3.0))
            .await
            .is_err());
    }
}
