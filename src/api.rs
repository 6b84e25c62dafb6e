use axum::{
    extract::{Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::spawn;
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, Status},
    error::RagError,
    ingest::{self, IngestionSummary},
    models::{Document, SourceRef, Turn},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct RagQueryPayload {
    question: String,
}

#[derive(Serialize)]
pub struct RagQueryResponse {
    answer: String,
    sources: Vec<SourceRef>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest_handler))
        .route("/api/rag-query", post(rag_query_handler))
        .route("/api/history", get(history_handler))
        .route("/api/history/clear", post(clear_history_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

/// Traduce un `RagError` al código HTTP y cuerpo de error de la API.
fn rag_error_response(err: &RagError) -> ApiError {
    let status = match err {
        RagError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        RagError::EmbeddingService(_) | RagError::CompletionService(_) => StatusCode::BAD_GATEWAY,
        RagError::NotReady => StatusCode::CONFLICT,
        RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    };
    (
        status,
        Json(json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "retryable": err.is_retryable(),
        })),
    )
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn internal_error() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Estado interno no disponible" })),
    )
}

// --- Handlers ---

/// Marca de indexación en curso. Al soltarse libera `is_busy`, también si la
/// petición se cancela a mitad.
struct IngestionClaim {
    status: Arc<Mutex<Status>>,
}

impl IngestionClaim {
    fn acquire(status_arc: &Arc<Mutex<Status>>) -> Result<Self, ApiError> {
        let mut status = status_arc.lock().map_err(|_| internal_error())?;
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una indexación en curso."})),
            ));
        }
        status.is_busy = true;
        status.message = "Iniciando indexación...".to_string();
        status.progress = 0.0;
        drop(status);

        Ok(Self {
            status: status_arc.clone(),
        })
    }
}

impl Drop for IngestionClaim {
    fn drop(&mut self) {
        if let Ok(mut status) = self.status.lock() {
            status.is_busy = false;
            status.progress = 0.0;
        }
    }
}

async fn read_documents(multipart: &mut Multipart) -> Result<Vec<Document>, ApiError> {
    let mut documents = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Subida multipart inválida: {e}")))?
    {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or("documento")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("No se pudo leer '{name}': {e}")))?;
        documents.push(Document::new(name, bytes.to_vec()));
    }
    Ok(documents)
}

/// Ingesta completa y, si sale bien, cambio de la base de conocimiento.
async fn run_ingestion(
    state: &AppState,
    documents: Vec<Document>,
) -> Result<IngestionSummary, RagError> {
    let result = ingest::ingest_documents(
        documents,
        &state.chunker,
        &state.embedder,
        state.status.clone(),
    )
    .await;

    // El índice y la memoria nuevos entran juntos bajo el candado de la sesión.
    let result = match result {
        Ok((knowledge, summary)) => {
            state.session.lock().await.replace(knowledge);
            Ok(summary)
        }
        Err(err) => Err(err),
    };

    if let Ok(mut status) = state.status.lock() {
        match &result {
            Ok(summary) => {
                status.ready = true;
                status.message = format!("¡Indexación completada! {}", summary);
            }
            Err(err) => {
                status.message = format!("Error en la indexación: {}", err);
                error!("Error de ingesta: {}", err);
            }
        }
    }
    result
}

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestionSummary>, ApiError> {
    let claim = IngestionClaim::acquire(&state.status)?;
    let documents = read_documents(&mut multipart).await?;

    // La tarea sigue aunque el cliente se desconecte; la marca se suelta al acabar.
    let task_state = state.clone();
    let task = spawn(async move {
        let _claim = claim;
        run_ingestion(&task_state, documents).await
    });

    match task.await {
        Ok(result) => result.map(Json).map_err(|err| rag_error_response(&err)),
        Err(e) => {
            error!("La tarea de ingesta terminó de forma anómala: {}", e);
            Err(internal_error())
        }
    }
}

#[axum::debug_handler]
async fn rag_query_handler(
    State(state): State<AppState>,
    Json(payload): Json<RagQueryPayload>,
) -> Result<Json<RagQueryResponse>, ApiError> {
    // Se mantiene el candado durante toda la respuesta: las preguntas de una
    // sesión se atienden de una en una.
    let mut session = state.session.lock().await;
    match state
        .chat
        .answer_with_sources(&mut session, &payload.question)
        .await
    {
        Ok(result) => Ok(Json(RagQueryResponse {
            answer: result.answer,
            sources: result.sources,
        })),
        Err(e) => {
            warn!("Error al procesar la consulta RAG: {}", e);
            Err(rag_error_response(&e))
        }
    }
}

#[axum::debug_handler]
async fn history_handler(State(state): State<AppState>) -> Result<Json<Vec<Turn>>, ApiError> {
    let session = state.session.lock().await;
    let knowledge = session
        .knowledge()
        .ok_or_else(|| rag_error_response(&RagError::NotReady))?;
    Ok(Json(knowledge.memory.history().to_vec()))
}

#[axum::debug_handler]
async fn clear_history_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let mut session = state.session.lock().await;
    let knowledge = session
        .knowledge_mut()
        .ok_or_else(|| rag_error_response(&RagError::NotReady))?;
    if !knowledge.memory.is_empty() {
        knowledge.memory.clear();
        info!("Historial de la conversación borrado.");
    }
    Ok(StatusCode::OK)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(
        state
            .status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_default(),
    )
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Ok(mut sender) = state.shutdown_sender.lock() {
        if let Some(sender) = sender.take() {
            let _ = sender.send(());
        }
    }
    StatusCode::OK
}
