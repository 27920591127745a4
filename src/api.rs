use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::error;

use crate::{app_state::AppState, memory::DEFAULT_SESSION};

const CHAT_PAGE: &str = include_str!("../frontend/chat.html");

// --- Payloads ---

/// Campos del formulario del chat. `msg` es obligatorio; se valida a mano
/// para responder 400 en GET y en POST por igual.
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    msg: Option<String>,
    session_id: Option<String>,
}

// --- Errores ---

/// Errores visibles por el cliente. El cuerpo es siempre texto opaco; el
/// detalle sólo va al log.
#[derive(Debug)]
pub enum ApiError {
    MissingMessage,
    Pipeline(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingMessage => (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
            Self::Pipeline(err) => {
                error!("Error al procesar la consulta RAG: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/get", get(chat_handler).post(chat_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

// --- Handlers ---

async fn index_handler() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Form(form): Form<ChatForm>,
) -> Result<String, ApiError> {
    let msg = form
        .msg
        .filter(|m| !m.trim().is_empty())
        .ok_or(ApiError::MissingMessage)?;
    let session_id = form
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let answer = state.pipeline.rag_query(&msg, &session_id).await?;
    Ok(answer)
}

async fn health_handler() -> &'static str {
    "ok"
}
