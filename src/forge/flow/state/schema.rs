// SPDX-License-Identifier: MIT

//! Execution state definitions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::forge::flow::graph::{AnswerType, QuestionNode};
use crate::kit::error::ValidationError;
use crate::kit::value::{parse_calendar_date, FlowValue};

/// Identifies one execution: a flow running against a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct ExecutionKey {
    pub record_id: String,
    pub flow_id: String,
}

impl ExecutionKey {
    pub fn new(record_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            flow_id: flow_id.into(),
        }
    }

    /// Filesystem-safe name, e.g. `OPS-12+triage`.
    ///
    /// Both parts are percent-encoded, so `+` only ever appears as the separator and
    /// distinct keys never share a name.
    pub fn file_stem(&self) -> String {
        format!(
            "{}+{}",
            urlencoding::encode(&self.record_id),
            urlencoding::encode(&self.flow_id)
        )
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.record_id, self.flow_id)
    }
}

/// Where an execution stands between passes
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    NotStarted,
    AwaitingAnswer {
        node: String,
    },
    Completed,
    Failed {
        reason: String,
    },
}

impl ExecutionStatus {
    /// Completed and Failed only leave through a reset
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed { .. }
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::NotStarted => write!(f, "not_started"),
            ExecutionStatus::AwaitingAnswer { node } => write!(f, "awaiting_answer({})", node),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed { reason } => write!(f, "failed({})", reason),
        }
    }
}

/// A stored answer, typed by its question's answer type
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Answer {
    /// Raw value of the chosen option
    Choice(String),
    Choices(Vec<String>),
    Date(NaiveDate),
    Number(f64),
    Text(String),
}

impl Answer {
    /// Validate a submitted raw answer against the question it answers
    pub fn parse(
        question_id: &str,
        question: &QuestionNode,
        raw: &Value,
    ) -> Result<Answer, ValidationError> {
        if raw.is_null() {
            return Err(ValidationError::AnswerRequired(question_id.to_string()));
        }
        let wrong_type = |expected: &str| ValidationError::WrongType {
            question: question_id.to_string(),
            expected: expected.to_string(),
        };

        match question.answer_type {
            AnswerType::SingleChoice => {
                let input = scalar(raw).ok_or_else(|| wrong_type("a single option"))?;
                choose(question_id, question, &input).map(Answer::Choice)
            }
            AnswerType::MultiChoice => {
                let inputs: Vec<String> = match raw {
                    Value::Array(items) => items
                        .iter()
                        .map(|item| scalar(item).ok_or_else(|| wrong_type("a list of options")))
                        .collect::<Result<_, _>>()?,
                    other => vec![scalar(other).ok_or_else(|| wrong_type("a list of options"))?],
                };
                if inputs.is_empty() {
                    return Err(ValidationError::AnswerRequired(question_id.to_string()));
                }
                let mut chosen: Vec<String> = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    let value = choose(question_id, question, input)?;
                    if !chosen.contains(&value) {
                        chosen.push(value);
                    }
                }
                Ok(Answer::Choices(chosen))
            }
            AnswerType::Date => raw
                .as_str()
                .and_then(parse_calendar_date)
                .map(Answer::Date)
                .ok_or_else(|| wrong_type("a calendar date (YYYY-MM-DD)")),
            AnswerType::Number => {
                let n = match raw {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                n.filter(|n| n.is_finite())
                    .map(Answer::Number)
                    .ok_or_else(|| wrong_type("a number"))
            }
            AnswerType::Text => {
                let text = raw.as_str().ok_or_else(|| wrong_type("text"))?;
                if text.trim().is_empty() {
                    return Err(ValidationError::AnswerRequired(question_id.to_string()));
                }
                Ok(Answer::Text(text.to_string()))
            }
        }
    }

    pub fn to_value(&self) -> FlowValue {
        match self {
            Answer::Choice(v) | Answer::Text(v) => FlowValue::Text(v.clone()),
            Answer::Choices(vs) => FlowValue::List(vs.clone()),
            Answer::Date(d) => FlowValue::Date(*d),
            Answer::Number(n) => FlowValue::Number(*n),
        }
    }
}

fn scalar(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map an option's raw value or label to its raw value
fn choose(
    question_id: &str,
    question: &QuestionNode,
    input: &str,
) -> Result<String, ValidationError> {
    question
        .options
        .iter()
        .find(|o| o.value == input)
        .or_else(|| question.options.iter().find(|o| o.matches(input)))
        .map(|o| o.value.clone())
        .ok_or_else(|| ValidationError::UnknownOption {
            question: question_id.to_string(),
            value: input.to_string(),
        })
}

/// Persisted state of one execution
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionState {
    pub record_id: String,
    pub flow_id: String,
    #[serde(flatten)]
    pub status: ExecutionStatus,
    /// Question node id -> answer
    #[serde(default)]
    pub answers: BTreeMap<String, Answer>,
    /// Node most recently reached
    #[serde(default)]
    pub last_node: Option<String>,
    /// Bumped by the store on every save
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn new(key: &ExecutionKey) -> Self {
        Self {
            record_id: key.record_id.clone(),
            flow_id: key.flow_id.clone(),
            status: ExecutionStatus::NotStarted,
            answers: BTreeMap::new(),
            last_node: None,
            version: 0,
            updated_at: None,
        }
    }

    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(&self.record_id, &self.flow_id)
    }

    /// Back to NotStarted with no answers, keeping the version for the store's check
    pub fn reset(&self) -> Self {
        Self {
            version: self.version,
            ..Self::new(&self.key())
        }
    }

    pub fn answer(&self, question_id: &str) -> Option<&Answer> {
        self.answers.get(question_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::value::ChoiceOption;
    use serde_json::json;

    fn question(answer_type: AnswerType) -> QuestionNode {
        QuestionNode {
            prompt: "?".to_string(),
            answer_type,
            options: vec![
                ChoiceOption::new("10001", "High"),
                ChoiceOption::new("10002", "Low"),
            ],
        }
    }

    #[test]
    fn test_single_choice_stores_raw_value() {
        let q = question(AnswerType::SingleChoice);
        assert_eq!(
            Answer::parse("q", &q, &json!("High")).unwrap(),
            Answer::Choice("10001".to_string())
        );
        assert_eq!(
            Answer::parse("q", &q, &json!("10002")).unwrap(),
            Answer::Choice("10002".to_string())
        );
        assert_eq!(
            Answer::parse("q", &q, &json!("Medium")),
            Err(ValidationError::UnknownOption {
                question: "q".to_string(),
                value: "Medium".to_string(),
            })
        );
    }

    #[test]
    fn test_multi_choice() {
        let q = question(AnswerType::MultiChoice);
        assert_eq!(
            Answer::parse("q", &q, &json!(["Low", "High", "10002"])).unwrap(),
            Answer::Choices(vec!["10002".to_string(), "10001".to_string()])
        );
        assert!(matches!(
            Answer::parse("q", &q, &json!([])),
            Err(ValidationError::AnswerRequired(_))
        ));
        assert!(matches!(
            Answer::parse("q", &q, &json!([{"id": 1}])),
            Err(ValidationError::WrongType { .. })
        ));
    }

    #[test]
    fn test_date_answer_is_calendar_day() {
        let q = question(AnswerType::Date);
        assert_eq!(
            Answer::parse("q", &q, &json!("2024-03-01T18:45:00Z")).unwrap(),
            Answer::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(matches!(
            Answer::parse("q", &q, &json!("tomorrow")),
            Err(ValidationError::WrongType { .. })
        ));
    }

    #[test]
    fn test_number_and_text() {
        assert_eq!(
            Answer::parse("q", &question(AnswerType::Number), &json!("4.5")).unwrap(),
            Answer::Number(4.5)
        );
        assert!(Answer::parse("q", &question(AnswerType::Number), &json!("four")).is_err());
        assert!(matches!(
            Answer::parse("q", &question(AnswerType::Text), &json!("  ")),
            Err(ValidationError::AnswerRequired(_))
        ));
        assert!(matches!(
            Answer::parse("q", &question(AnswerType::Text), &Value::Null),
            Err(ValidationError::AnswerRequired(_))
        ));
    }

    #[test]
    fn test_state_serialization() {
        let mut state = ExecutionState::new(&ExecutionKey::new("OPS-1", "triage"));
        state.status = ExecutionStatus::AwaitingAnswer {
            node: "q1".to_string(),
        };
        state
            .answers
            .insert("q0".to_string(), Answer::Number(3.0));

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], json!("awaiting_answer"));
        assert_eq!(value["node"], json!("q1"));
        assert_eq!(value["answers"]["q0"], json!({"type": "number", "value": 3.0}));

        let back: ExecutionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_reset_keeps_version() {
        let mut state = ExecutionState::new(&ExecutionKey::new("OPS-1", "triage"));
        state.version = 4;
        state.status = ExecutionStatus::Completed;
        state.answers.insert("q".to_string(), Answer::Text("x".into()));

        let reset = state.reset();
        assert_eq!(reset.status, ExecutionStatus::NotStarted);
        assert!(reset.answers.is_empty());
        assert_eq!(reset.version, 4);
    }

    #[test]
    fn test_file_stem_is_safe() {
        let key = ExecutionKey::new("OPS-12", "flows/triage v2");
        assert_eq!(key.file_stem(), "OPS-12+flows%2Ftriage%20v2");
    }

    #[test]
    fn test_file_stem_is_distinct_per_key() {
        let pairs = [
            ("OPS-1", "triage v2"),
            ("OPS-1", "triage_v2"),
            ("OPS-1", "triage/v2"),
            ("a__b", "c"),
            ("a", "b__c"),
            ("a+b", "c"),
            ("a", "b+c"),
        ];
        let stems: std::collections::HashSet<String> = pairs
            .iter()
            .map(|(r, f)| ExecutionKey::new(*r, *f).file_stem())
            .collect();
        assert_eq!(stems.len(), pairs.len());
    }
}
