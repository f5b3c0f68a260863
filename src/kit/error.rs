// SPDX-License-Identifier: MIT

//! Typed error handling for issueflow
//!
//! The taxonomy follows how a failure is surfaced:
//! - `ExpressionError` - malformed date expressions, reported to whoever configured them
//! - `ConfigError` - structural flow violations, caught at validation/load time
//! - `ResolutionError` - runtime lookups that could not be satisfied
//! - `ValidationError` - submitted answers that do not match their question
//!
//! `FlowError` wraps all of them for callers that do not care about the distinction.

use thiserror::Error;

/// Boxed error returned by external collaborators (Jira, stores, ...)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Human-readable list of accepted expression shapes, used in syntax errors
pub const EXPECTED_SHAPES: &str =
    "a relative offset like `7d` or `-2w`, a date function like `today()`, or `<function> +/- <offset>` like `startofweek() - 1d`";

/// Date expression parse/evaluation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// Input was empty or only whitespace
    #[error("Date expression is empty; expected {}", EXPECTED_SHAPES)]
    Empty,

    /// Input matched none of the accepted shapes
    #[error(
        "Unexpected '{token}' at position {position} in '{input}'; expected {}",
        EXPECTED_SHAPES
    )]
    Syntax {
        input: String,
        token: String,
        position: usize,
    },

    /// Result falls outside the representable calendar
    #[error("Date expression '{0}' is out of range")]
    OutOfRange(String),
}

/// Structural problems with a flow definition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Flow has no start node")]
    MissingStart,

    #[error("Flow has {0} start nodes; at most one is allowed")]
    MultipleStarts(usize),

    #[error("Duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    #[error("Edge {source_id} -> {target} references a node that does not exist")]
    DanglingEdge { source_id: String, target: String },

    #[error("Node '{node}' already has an outgoing {branch} edge")]
    DuplicateBranch { node: String, branch: String },

    #[error("Edge from {kind} node '{node}' must be {expected}")]
    InvalidBranchLabel {
        node: String,
        kind: String,
        expected: String,
    },

    #[error("Node '{0}' is not reachable from the start node")]
    Unreachable(String),

    #[error("Question '{0}' is a choice question without options")]
    MissingOptions(String),

    #[error("Action '{0}' sets a field but names no target field")]
    MissingTargetField(String),

    #[error("Node '{node}' references '{reference}', which is not a question node")]
    InvalidQuestionRef { node: String, reference: String },

    #[error("Node '{node}' has an invalid date expression: {error}")]
    InvalidExpression { node: String, error: ExpressionError },

    #[error("Flow exceeded {0} hops without reaching a question or terminal node; check for cycles")]
    HopLimitExceeded(usize),
}

/// Runtime lookups that failed during a pass
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Field '{field}' could not be read: {message}")]
    Field { field: String, message: String },

    #[error("Question '{0}' has not been answered")]
    MissingAnswer(String),

    #[error("Invalid date expression at runtime: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Field metadata for '{field}' unavailable: {message}")]
    Metadata { field: String, message: String },

    #[error("Value '{value}' is not valid for field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("Action {action} failed: {message}")]
    Action { action: String, message: String },
}

/// Answer submission errors; the execution state is left untouched
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Execution is not waiting for an answer")]
    AnswerNotExpected,

    #[error("Question '{0}' requires an answer")]
    AnswerRequired(String),

    #[error("Answer for question '{question}' must be {expected}")]
    WrongType { question: String, expected: String },

    #[error("'{value}' is not an option of question '{question}'")]
    UnknownOption { question: String, value: String },

    #[error("Execution already finished with status {0}")]
    Finished(String),
}

/// Execution-state store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Someone else saved a newer version between our read and write
    #[error("Version conflict for {key}: expected {expected}, found {found}")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },

    /// Another holder kept the key locked past the timeout
    #[error("Execution {key} is locked by another writer (waited {waited_ms} ms)")]
    Locked { key: String, waited_ms: u64 },

    /// The stored document belongs to a different execution
    #[error("Stored state for {requested} belongs to {found}")]
    KeyMismatch { requested: String, found: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Top-level error type for issueflow
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Invalid answer: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// API errors from external services (Jira)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Missing or malformed environment configuration
    #[error("Environment configuration error: {0}")]
    Environment(String),

    #[error("Flow '{0}' not found")]
    FlowNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl FlowError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an environment configuration error
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }
}
