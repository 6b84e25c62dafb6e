//! Taxonomía de errores del pipeline RAG.

use std::{future::Future, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Documento corrupto o con formato no soportado.
    #[error("No se pudo extraer texto de '{source_id}': {reason}")]
    Extraction { source_id: String, reason: String },

    /// Formas incompatibles: nº de embeddings vs chunks, `k` inválido, dimensiones...
    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("Error del servicio de embeddings: {0}")]
    EmbeddingService(String),

    #[error("Error del servicio de completado: {0}")]
    CompletionService(String),

    /// Se ha preguntado antes de una ingesta correcta.
    #[error("No hay ningún índice listo: procesa primero tus documentos")]
    NotReady,

    #[error("El servicio de {service} no respondió en {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn extraction(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Extraction {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Identificador estable del tipo de error (se expone en la API).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction_error",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::EmbeddingService(_) => "embedding_service_error",
            Self::CompletionService(_) => "completion_service_error",
            Self::NotReady => "not_ready",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Los fallos de servicios externos se pueden reintentar a criterio del llamante.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingService(_) | Self::CompletionService(_) | Self::Timeout { .. }
        )
    }
}

/// Acota una llamada a un servicio externo; al vencer el plazo devuelve `Timeout`.
pub async fn with_timeout<T, F>(service: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout { service, after }),
    }
}
