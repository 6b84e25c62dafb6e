use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{chunker::Chunker, config::AppConfig, embedder::Embedder, rag::RagChat, session::Session};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub chunker: Chunker,
    pub embedder: Embedder,
    pub chat: RagChat,
    /// Un único candado por sesión: serializa las preguntas y el cambio de índice.
    pub session: Arc<tokio::sync::Mutex<Session>>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub ready: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
