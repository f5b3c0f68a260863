use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::env;
use url::Url;

use crate::kit::collaborator::{
    ActionDescriptor, ActionExecutor, ActionKind, FieldMetadata, FieldReader,
};
use crate::kit::error::{BoxError, FlowError};
use crate::kit::value::{ChoiceOption, FieldKind, FlowValue};

// --- Configuration ---

/// Connection settings for a Jira site
#[derive(Debug, Clone, PartialEq)]
pub struct JiraConfig {
    pub base_url: Url,
    pub api_token: String,
    pub email: Option<String>,
    /// Bearer auth talks to REST API v2 (Data Center/Server); basic auth to v3 (Cloud)
    pub use_bearer: bool,
}

impl JiraConfig {
    /// Read `JIRA_BASE_URL`, `JIRA_API_TOKEN`, `JIRA_EMAIL` and `JIRA_AUTH_TYPE`
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("JIRA_BASE_URL")
            .ok_or_else(|| FlowError::environment("JIRA_BASE_URL must be set"))?;
        let base_url = Url::parse(raw_url.trim_end_matches('/')).map_err(|e| {
            FlowError::environment(format!("JIRA_BASE_URL '{}' is not a valid URL: {}", raw_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FlowError::environment(format!(
                "JIRA_BASE_URL '{}' must be an http(s) URL",
                raw_url
            )));
        }
        let api_token = lookup("JIRA_API_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FlowError::environment("JIRA_API_TOKEN must be set"))?;

        // JIRA_AUTH_TYPE=bearer forces Bearer auth, JIRA_AUTH_TYPE=basic forces Basic auth
        let email = lookup("JIRA_EMAIL").filter(|e| !e.is_empty());
        let use_bearer = match lookup("JIRA_AUTH_TYPE").as_deref() {
            Some("bearer") => true,
            Some("basic") => false,
            _ => email.is_none(),
        };
        if !use_bearer && email.is_none() {
            return Err(FlowError::environment(
                "JIRA_EMAIL must be set for basic authentication",
            ));
        }

        Ok(Self {
            base_url,
            api_token,
            email,
            use_bearer,
        })
    }

    fn api_version(&self) -> &'static str {
        if self.use_bearer {
            "2"
        } else {
            "3"
        }
    }

    /// REST endpoint under `rest/api/{version}`; segments and query values are percent-encoded
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, BoxError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| format!("'{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(["rest", "api", self.api_version()])
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }
}

// --- Client ---

/// Jira REST client acting as field reader, field metadata source and action executor
#[derive(Clone)]
pub struct JiraClient {
    client: Client,
    config: JiraConfig,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Self {
        log::info!(
            "Jira client: base_url={}, use_bearer={}, has_email={}",
            config.base_url,
            config.use_bearer,
            config.email.is_some()
        );
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, FlowError> {
        Ok(Self::new(JiraConfig::from_env()?))
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, BoxError> {
        let url = self.config.endpoint(segments, query)?;
        let path = url.path().to_string();

        let mut req = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");

        req = match (&self.config.email, self.config.use_bearer) {
            (Some(email), false) => req.basic_auth(email, Some(&self.config.api_token)),
            _ => req.bearer_auth(&self.config.api_token),
        };

        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await?;
            return Err(FlowError::api("Jira", format!("{} {}: {}", status, path, text)).into());
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn edit_meta(&self, record_id: &str, field_key: &str) -> Result<Value, BoxError> {
        let meta = self
            .request(Method::GET, &["issue", record_id, "editmeta"], &[], None)
            .await?;
        meta.get("fields")
            .and_then(|f| f.get(field_key))
            .cloned()
            .ok_or_else(|| format!("field '{}' is not editable on {}", field_key, record_id).into())
    }
}

#[async_trait]
impl FieldReader for JiraClient {
    async fn field_value(
        &self,
        record_id: &str,
        field_key: &str,
    ) -> Result<Option<Value>, BoxError> {
        let issue = self
            .request(
                Method::GET,
                &["issue", record_id],
                &[("fields", field_key)],
                None,
            )
            .await?;
        Ok(issue
            .get("fields")
            .and_then(|f| f.get(field_key))
            .filter(|v| !v.is_null())
            .cloned())
    }
}

#[async_trait]
impl FieldMetadata for JiraClient {
    async fn field_kind(&self, record_id: &str, field_key: &str) -> Result<FieldKind, BoxError> {
        let meta = self.edit_meta(record_id, field_key).await?;
        Ok(kind_from_schema(meta.get("schema").unwrap_or(&Value::Null)))
    }

    async fn field_options(
        &self,
        record_id: &str,
        field_key: &str,
    ) -> Result<Vec<ChoiceOption>, BoxError> {
        let meta = self.edit_meta(record_id, field_key).await?;
        Ok(options_from_meta(&meta))
    }
}

#[async_trait]
impl ActionExecutor for JiraClient {
    async fn execute(&self, record_id: &str, action: &ActionDescriptor) -> Result<(), BoxError> {
        let (method, segments, body) =
            action_request(record_id, action, !self.config.use_bearer)?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.request(method, &segments, &[], Some(body)).await?;
        Ok(())
    }
}

// --- Mapping helpers ---

/// Map an editmeta `schema` object to a field kind
fn kind_from_schema(schema: &Value) -> FieldKind {
    let kind = schema.get("type").and_then(Value::as_str).unwrap_or("");
    let items = schema.get("items").and_then(Value::as_str).unwrap_or("");
    match (kind, items) {
        ("date", _) => FieldKind::Date,
        ("datetime", _) => FieldKind::DateTime,
        ("option" | "priority", _) => FieldKind::Select,
        ("array", "option") => FieldKind::MultiSelect,
        ("number", _) => FieldKind::Number,
        ("string", _) => FieldKind::Text,
        _ => FieldKind::Other,
    }
}

/// Options from an editmeta field's `allowedValues`; the option id is the raw value
fn options_from_meta(meta: &Value) -> Vec<ChoiceOption> {
    meta.get("allowedValues")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(|v| {
                    let id = v.get("id").and_then(Value::as_str)?;
                    let label = v
                        .get("value")
                        .or_else(|| v.get("name"))
                        .and_then(Value::as_str);
                    Some(ChoiceOption {
                        value: id.to_string(),
                        label: label.map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// HTTP method, path segments and body that carry out `action`
fn action_request(
    record_id: &str,
    action: &ActionDescriptor,
    rich_text: bool,
) -> Result<(Method, Vec<String>, Value), BoxError> {
    let issue_path = vec!["issue".to_string(), record_id.to_string()];
    match action.kind {
        ActionKind::SetField => {
            let field = action
                .field
                .as_deref()
                .ok_or("setField action without a target field")?;
            Ok((
                Method::PUT,
                issue_path,
                json!({ "fields": { field: action.wire_value() } }),
            ))
        }
        ActionKind::AddLabel => {
            let field = action.field.as_deref().unwrap_or("labels");
            let labels: Vec<Value> = match &action.value {
                FlowValue::List(items) => items.iter().map(|l| json!({ "add": l })).collect(),
                FlowValue::Empty => return Err("addLabel action without a label".into()),
                other => vec![json!({ "add": other.to_string() })],
            };
            Ok((
                Method::PUT,
                issue_path,
                json!({ "update": { field: labels } }),
            ))
        }
        ActionKind::AddComment => {
            let text = action.value.to_string();
            let body = if rich_text {
                json!({
                    "body": {
                        "type": "doc",
                        "version": 1,
                        "content": [{
                            "type": "paragraph",
                            "content": [{ "type": "text", "text": text }]
                        }]
                    }
                })
            } else {
                json!({ "body": text })
            };
            let mut path = issue_path;
            path.push("comment".to_string());
            Ok((Method::POST, path, body))
        }
    }
}
