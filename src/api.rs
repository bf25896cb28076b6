//! REST API for the expense assistant
//!
//! Chat and status endpoints over the [`ChatService`], plus the expense and
//! lookup endpoints the web front end uses directly.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::agent::ChatService;
use crate::config::{AppConfig, Principal};
use crate::conversation;
use crate::llm::backend_from_settings;
use crate::models::{CreateExpenseRequest, ExpenseStatusName, StoreOutcome, UpdateStatusRequest};
use crate::store::{store_from_config, ExpenseStore};
use crate::tools::create_expense_registry;
use crate::Result;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// "User: ..." / "Assistant: ..." lines, oldest first
    #[serde(default)]
    pub conversation_history: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveQuery {
    pub reviewed_by: Option<i32>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub chat: Arc<ChatService>,
    pub store: Arc<dyn ExpenseStore>,
    pub principal: Principal,
}

impl ApiState {
    /// Wire the store, the tool registry and the chat service from config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = store_from_config(config.database_url.as_deref())?;
        let registry = Arc::new(create_expense_registry(store.clone(), config.principal));
        let backend = backend_from_settings(&config.completion)?;
        let chat = Arc::new(ChatService::new(config.completion.clone(), backend, registry));

        Ok(Self {
            chat,
            store,
            principal: config.principal,
        })
    }
}

/// =============================
/// Helpers
/// =============================

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Healthy reads return the bare list; degraded reads wrap it with the
/// store diagnostic under `error`.
fn listing<T: Serialize>(key: &str, location: &str, outcome: StoreOutcome<Vec<T>>) -> Response {
    match outcome {
        StoreOutcome::Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        StoreOutcome::OkWithWarning(items, error) => {
            warn!(%location, %error, "Read returned with error");
            match serde_json::to_value(items) {
                Ok(items) => {
                    let mut body = serde_json::Map::new();
                    body.insert(key.to_string(), items);
                    body.insert("error".to_string(), Value::String(error));
                    (StatusCode::OK, Json(Value::Object(body))).into_response()
                }
                Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            }
        }
        StoreOutcome::Err(error) => {
            warn!(%location, %error, "Read failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, error)
        }
    }
}

/// Writes either succeed outright or are reported as a client error
fn written<T: Serialize>(status: StatusCode, outcome: StoreOutcome<T>) -> Response {
    match outcome {
        StoreOutcome::Ok(item) | StoreOutcome::OkWithWarning(item, _) => {
            (status, Json(item)).into_response()
        }
        StoreOutcome::Err(error) => error_body(StatusCode::BAD_REQUEST, error),
    }
}

/// =============================
/// Health & Chat Endpoints
/// =============================

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "chatConfigured": state.chat.is_configured(),
        "databaseConnected": state.store.is_connected(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Response {
    if req.message.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Message cannot be empty");
    }

    let history = req.conversation_history.unwrap_or_default();
    let transcript = conversation::parse_history(&history);
    info!(
        history_lines = history.len(),
        transcript_turns = transcript.len(),
        "Received chat message"
    );

    // Dropping this future (client gone) aborts in-flight tool tasks
    let response = state.chat.get_chat_response(&req.message, &transcript).await;

    (StatusCode::OK, Json(ChatResponse { response })).into_response()
}

async fn chat_status(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "configured": state.chat.is_configured() }))
}

/// =============================
/// Expense Endpoints
/// =============================

async fn list_expenses(State(state): State<ApiState>) -> Response {
    listing("expenses", "list_all", state.store.list_all().await)
}

async fn get_expense(State(state): State<ApiState>, Path(id): Path<i32>) -> Response {
    match state.store.get_by_id(id).await {
        StoreOutcome::Ok(expense) | StoreOutcome::OkWithWarning(expense, _) => {
            (StatusCode::OK, Json(expense)).into_response()
        }
        StoreOutcome::Err(error) => error_body(StatusCode::NOT_FOUND, error),
    }
}

async fn expenses_by_status(State(state): State<ApiState>, Path(status): Path<String>) -> Response {
    let status = match status.parse::<ExpenseStatusName>() {
        Ok(status) => status,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, e),
    };

    listing("expenses", "list_by_status", state.store.list_by_status(status).await)
}

async fn pending_expenses(State(state): State<ApiState>) -> Response {
    listing("expenses", "list_pending", state.store.list_pending().await)
}

async fn create_expense(
    State(state): State<ApiState>,
    Json(req): Json<CreateExpenseRequest>,
) -> Response {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return error_body(StatusCode::BAD_REQUEST, "Amount must be greater than zero");
    }

    match state.store.create(req).await {
        StoreOutcome::Ok(expense) | StoreOutcome::OkWithWarning(expense, _) => {
            info!(expense_id = expense.expense_id, "Expense created");
            let location = format!("/api/expenses/{}", expense.expense_id);
            (
                StatusCode::CREATED,
                [(header::LOCATION, location)],
                Json(expense),
            )
                .into_response()
        }
        StoreOutcome::Err(error) => error_body(StatusCode::BAD_REQUEST, error),
    }
}

async fn update_status(
    State(state): State<ApiState>,
    Json(req): Json<UpdateStatusRequest>,
) -> Response {
    written(StatusCode::OK, state.store.update_status(req).await)
}

async fn approve_expense(
    State(state): State<ApiState>,
    Path(id): Path<i32>,
    Query(query): Query<ApproveQuery>,
) -> Response {
    let reviewer = query.reviewed_by.unwrap_or(state.principal.reviewer_id);
    written(StatusCode::OK, state.store.approve(id, reviewer).await)
}

/// =============================
/// Lookup Endpoints
/// =============================

async fn list_categories(State(state): State<ApiState>) -> Response {
    listing("categories", "list_categories", state.store.list_categories().await)
}

async fn list_statuses(State(state): State<ApiState>) -> Response {
    listing("statuses", "list_statuses", state.store.list_statuses().await)
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/status", get(chat_status))
        .route("/api/expenses", get(list_expenses).post(create_expense))
        .route("/api/expenses/pending", get(pending_expenses))
        .route("/api/expenses/status", put(update_status))
        .route("/api/expenses/status/:status", get(expenses_by_status))
        .route("/api/expenses/:id", get(get_expense))
        .route("/api/expenses/:id/approve", post(approve_expense))
        .route("/api/categories", get(list_categories))
        .route("/api/statuses", get(list_statuses))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
