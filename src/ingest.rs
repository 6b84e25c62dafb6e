//! Ingesta de un lote de documentos: extracción → troceado → embeddings →
//! índice vectorial. Todo o nada: si algo falla no se devuelve índice y la
//! sesión anterior queda intacta.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    chunker::Chunker,
    embedder::Embedder,
    error::{RagError, Result},
    extract,
    models::Document,
    session::KnowledgeBase,
    vector_store::VectorIndex,
};

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IngestionSummary {
    pub documents: usize,
    pub pages: usize,
    pub chunks_created: usize,
    pub dimensions: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} documentos, {} páginas, {} chunks (dimensión {}).",
            self.documents, self.pages, self.chunks_created, self.dimensions
        )
    }
}

fn report(status_arc: &Arc<Mutex<Status>>, message: String, progress: f32) {
    if let Ok(mut status) = status_arc.lock() {
        status.message = message;
        status.progress = progress;
    }
}

/// Construye una base de conocimiento nueva a partir de `documents`.
pub async fn ingest_documents(
    documents: Vec<Document>,
    chunker: &Chunker,
    embedder: &Embedder,
    status_arc: Arc<Mutex<Status>>,
) -> Result<(KnowledgeBase, IngestionSummary)> {
    if documents.is_empty() {
        return Err(RagError::InvalidArgument(
            "No se ha recibido ningún documento".into(),
        ));
    }

    let mut summary = IngestionSummary {
        documents: documents.len(),
        ..Default::default()
    };
    let sources: Vec<String> = documents.iter().map(|d| d.name.clone()).collect();

    // --- Fase 1: Extracción ---
    report(
        &status_arc,
        format!("Extrayendo texto de {} documentos...", documents.len()),
        0.05,
    );
    let units = extract::extract_documents(documents).await?;
    summary.pages = units.len();

    // --- Fase 2: Troceado ---
    report(&status_arc, format!("Troceando {} páginas...", units.len()), 0.25);
    let chunks = chunker.split(&units);
    if chunks.is_empty() {
        warn!("Los documentos no contienen texto útil: {:?}", sources);
        return Err(RagError::extraction(
            sources.join(", "),
            "no hay texto extraíble",
        ));
    }

    // --- Fase 3: Embeddings ---
    report(
        &status_arc,
        format!("Calculando embeddings de {} chunks...", chunks.len()),
        0.4,
    );
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await?;

    // --- Fase 4: Índice ---
    report(&status_arc, "Construyendo el índice vectorial...".to_string(), 0.9);
    let index = VectorIndex::build(chunks, embeddings)?;
    summary.chunks_created = index.len();
    summary.dimensions = index.dimensions();

    info!("Ingesta completada. {}", summary);
    Ok((
        KnowledgeBase::new(index, embedder.model_id()),
        summary,
    ))
}

/// Lee todos los ficheros de un directorio (recursivo, ordenados por ruta).
pub fn load_directory(root: &Path) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(RagError::InvalidArgument(format!(
            "La ruta no es un directorio: {}",
            root.display()
        )));
    }

    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            let bytes = fs::read(&path).map_err(|e| RagError::extraction(&name, e))?;
            Ok(Document::new(name, bytes))
        })
        .collect()
}
