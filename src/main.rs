// Módulos de la aplicación
mod api;
mod app_state;
mod chunker;
mod config;
mod embedder;
mod error;
mod extract;
mod ingest;
mod llm;
mod memory;
mod models;
mod rag;
mod session;
mod vector_store;

#[cfg(test)]
mod testing;

use crate::{
    app_state::{AppState, Status},
    chunker::Chunker,
    embedder::Embedder,
    rag::RagChat,
    session::Session,
};
use anyhow::Context;
use axum::Router;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Inicializar gestor de LLMs y componentes del pipeline
    let llm_manager =
        Arc::new(llm::LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);
    let chunker = Chunker::from_settings(&cfg.rag)?;
    let embedder = Embedder::new(llm_manager.clone(), &cfg.rag);
    let chat = RagChat::new(embedder.clone(), llm_manager, &cfg.rag);

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        chunker,
        embedder,
        chat,
        session: Arc::new(tokio::sync::Mutex::new(Session::new())),
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            ready: false,
            message: "Sube tus documentos para continuar.".to_string(),
            progress: 0.0,
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 5. Precarga opcional de un directorio de documentos
    if let Some(dir) = &cfg.docs_dir {
        preload_directory(&app_state, dir).await?;
    }

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

/// Ingiere el contenido de `DOCS_DIR` antes de aceptar peticiones.
async fn preload_directory(state: &AppState, dir: &std::path::Path) -> anyhow::Result<()> {
    info!("Precargando documentos de {}", dir.display());
    let documents = ingest::load_directory(dir)?;
    if documents.is_empty() {
        warn!("{} no contiene ficheros; se omite la precarga.", dir.display());
        return Ok(());
    }

    let (knowledge, summary) = ingest::ingest_documents(
        documents,
        &state.chunker,
        &state.embedder,
        state.status.clone(),
    )
    .await
    .with_context(|| format!("Error precargando {}", dir.display()))?;
    state.session.lock().await.replace(knowledge);

    if let Ok(mut status) = state.status.lock() {
        status.ready = true;
        status.progress = 0.0;
        status.message = format!("¡Indexación completada! {}", summary);
    }
    Ok(())
}
