use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::audit::AuditLogger;
use crate::chain::ChainBuilder;
use crate::clarification::{combine_question_with_clarification, detect_clarification};
use crate::config::AppConfig;
use crate::models::{ClearSessionResponse, PendingClarification, QueryRequest, QueryResponse};
use crate::session::{PendingClarificationStore, SessionStore};

#[derive(Clone)]
struct AppState {
    builder: ChainBuilder,
    sessions: SessionStore,
    pending: PendingClarificationStore,
    audit: AuditLogger,
    request_timeout: Duration,
    max_history_turns: usize,
}

pub async fn run_server(
    config: AppConfig,
    builder: ChainBuilder,
    sessions: SessionStore,
    pending: PendingClarificationStore,
    audit: AuditLogger,
) -> Result<()> {
    let state = AppState {
        builder,
        sessions,
        pending,
        audit,
        request_timeout: Duration::from_secs(config.request_timeout_secs),
        max_history_turns: config.retrieval.max_history_turns,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/query", post(query_handler))
        .route("/api/session/:session_id", delete(clear_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "GST RAG Query API",
    }))
}

async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::bad_request("Question cannot be empty".to_string()));
    }

    let Some(kind) = state.builder.strategy_for(request.collection_name.as_deref()) else {
        return Err(ApiError::not_found(format!(
            "unknown collection: {}",
            request.collection_name.unwrap_or_default()
        )));
    };

    let session_id = state.sessions.get_or_create(request.session_id.as_deref());

    let username = request
        .username
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "Anonymous".to_string());
    {
        let audit = state.audit.clone();
        let question = question.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            audit.log_query(&username, &question, &session_id).await;
        });
    }

    // A live pending clarification turns this message into a reply to the
    // earlier ambiguity question; the merged question drives retrieval.
    let effective_question = match state.pending.take(&session_id) {
        Some(pending) => {
            combine_question_with_clarification(&pending.original_question, &question)
        }
        None => question.clone(),
    };

    let history = state.sessions.history(&session_id, state.max_history_turns);

    let chain = state.builder.build(kind);
    chain.reset_tracker();

    let invocation = chain.invoke(&effective_question, &history);
    let answer = match tokio::time::timeout(state.request_timeout, invocation).await {
        Ok(Ok(answer)) => answer,
        Ok(Err(err)) => {
            tracing::error!(
                question = %effective_question,
                session_id = %session_id,
                "query pipeline failed: {err:#}"
            );
            if is_upstream_timeout(&err) {
                return Err(ApiError::timeout(
                    "An upstream call exceeded its time budget; please retry.".to_string(),
                ));
            }
            return Err(ApiError::internal("Failed to process query".to_string()));
        }
        Err(_) => {
            return Err(ApiError::timeout(
                "Query exceeded the configured time budget; please retry with a simpler question."
                    .to_string(),
            ));
        }
    };

    let sources = chain.tracker.get();

    // The user's literal message enters history, not the merged rewrite.
    state.sessions.append(&session_id, &question, &answer);

    let clarification = detect_clarification(&answer);
    if let Some(found) = &clarification {
        state.pending.put(PendingClarification {
            session_id: session_id.clone(),
            original_question: effective_question.clone(),
            clarification_question: found.clarification_question.clone(),
            context: found.original_context.clone(),
            created_at: Utc::now(),
        });
    }

    let requires_clarification = clarification.is_some();
    Ok(Json(QueryResponse {
        answer,
        question,
        session_id,
        status: "success".to_string(),
        sources,
        requires_clarification,
        clarification_question: clarification
            .as_ref()
            .map(|found| found.clarification_question.clone()),
        pending_question: requires_clarification.then_some(effective_question),
    }))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearSessionResponse>, ApiError> {
    let removed_history = state.sessions.clear(&session_id);
    let removed_pending = state.pending.remove(&session_id);

    if !removed_history && !removed_pending {
        return Err(ApiError::not_found(format!(
            "session not found: {session_id}"
        )));
    }

    Ok(Json(ClearSessionResponse {
        session_id,
        status: "cleared".to_string(),
    }))
}

fn is_upstream_timeout(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|cause| cause.is_timeout())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn timeout(message: String) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message,
        }
    }

    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
