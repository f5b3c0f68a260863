// SPDX-License-Identifier: MIT

//! HTTP surface for flows and executions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::forge::flow::expression;
use crate::forge::flow::graph::{Advance, FlowDefinition};
use crate::forge::flow::session::FlowService;
use crate::forge::flow::state::{ExecutionKey, ExecutionState};
use crate::kit::error::{BoxError, ExpressionError, FlowError, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub service: FlowService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/flows", get(list_flows))
        .route("/api/flows/validate", post(validate_flow))
        .route("/api/flows/{id}", get(get_flow))
        .route("/api/expressions/preview", post(preview_expression))
        .route("/api/executions/{record}/{flow}", get(get_execution))
        .route("/api/executions/{record}/{flow}/advance", post(advance_execution))
        .route("/api/executions/{record}/{flow}/reset", post(reset_execution))
        .route("/api/executions/{record}/{flow}/audit", get(execution_audit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> Result<(), BoxError> {
    let subscriber = tracing_subscriber::fmt().with_target(false).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        log::warn!("Request tracing disabled: {}", e);
    }

    let app = router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Maps engine errors to HTTP responses
pub struct ApiError(FlowError);

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FlowError::Validation(_) | FlowError::Expression(_) => StatusCode::BAD_REQUEST,
            FlowError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FlowError::FlowNotFound(_) => StatusCode::NOT_FOUND,
            FlowError::Store(StoreError::Conflict { .. } | StoreError::Locked { .. }) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct FlowQuery {
    project: Option<String>,
}

async fn list_flows(
    State(state): State<AppState>,
    Query(query): Query<FlowQuery>,
) -> Json<Value> {
    let registry = state.service.registry();
    let flows = match &query.project {
        Some(project) => registry.flows_for_project(project).await,
        None => registry.list().await,
    };
    let summaries: Vec<Value> = flows
        .iter()
        .map(|f| {
            json!({
                "id": f.id,
                "name": f.name,
                "description": f.description,
                "projects": f.projects,
            })
        })
        .collect();
    Json(json!(summaries))
}

async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlowDefinition>, ApiError> {
    let flow = state
        .service
        .registry()
        .get(&id)
        .await
        .ok_or(FlowError::FlowNotFound(id))?;
    Ok(Json(flow.as_ref().clone()))
}

async fn validate_flow(Json(flow): Json<FlowDefinition>) -> Json<Value> {
    let issues: Vec<String> = flow.validate().iter().map(ToString::to_string).collect();
    Json(json!({ "valid": issues.is_empty(), "issues": issues }))
}

#[derive(Deserialize)]
struct PreviewRequest {
    expression: String,
    /// Defaults to the server's local date
    today: Option<NaiveDate>,
}

async fn preview_expression(Json(req): Json<PreviewRequest>) -> (StatusCode, Json<Value>) {
    let today = req.today.unwrap_or_else(|| Local::now().date_naive());
    match expression::resolve(&req.expression, today) {
        Ok(date) => (
            StatusCode::OK,
            Json(json!({ "expression": req.expression, "date": date.to_string() })),
        ),
        Err(e) => {
            let mut body = json!({ "error": e.to_string() });
            if let ExpressionError::Syntax {
                token, position, ..
            } = &e
            {
                body["token"] = json!(token);
                body["position"] = json!(position);
            }
            (StatusCode::BAD_REQUEST, Json(body))
        }
    }
}

async fn get_execution(
    State(state): State<AppState>,
    Path((record, flow)): Path<(String, String)>,
) -> Result<Json<ExecutionState>, ApiError> {
    let key = ExecutionKey::new(record, flow);
    Ok(Json(state.service.state(&key).await?))
}

#[derive(Deserialize)]
struct AdvanceRequest {
    #[serde(default)]
    answer: Option<Value>,
    /// Evaluation instant; defaults to the server's local time
    #[serde(default)]
    now: Option<DateTime<FixedOffset>>,
}

async fn advance_execution(
    State(state): State<AppState>,
    Path((record, flow)): Path<(String, String)>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<Advance>, ApiError> {
    let key = ExecutionKey::new(record, flow);
    let now = req.now.unwrap_or_else(|| Local::now().fixed_offset());

    tracing::info!(execution = %key, has_answer = req.answer.is_some(), "advance");
    let outcome = state.service.advance(&key, req.answer.as_ref(), now).await?;
    Ok(Json(outcome))
}

async fn reset_execution(
    State(state): State<AppState>,
    Path((record, flow)): Path<(String, String)>,
) -> Result<Json<ExecutionState>, ApiError> {
    let key = ExecutionKey::new(record, flow);
    Ok(Json(state.service.reset(&key).await?))
}

async fn execution_audit(
    State(state): State<AppState>,
    Path((record, flow)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let key = ExecutionKey::new(record, flow);
    let entries = state.service.audit_trail(&key).await?;
    Ok(Json(json!(entries)))
}
