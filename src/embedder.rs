//! Generación de embeddings para chunks y consultas.
//!
//! `EmbeddingService` es la frontera con el modelo externo; `Embedder` añade
//! por encima el troceado en lotes, la concurrencia acotada (reensamblando el
//! orden de entrada), el timeout por llamada y las comprobaciones de forma.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::{
    config::RagSettings,
    error::{with_timeout, RagError, Result},
    models::Embedding,
};

/// Servicio externo de codificación vectorial.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Identificador del modelo. Documentos y consultas deben usar el mismo.
    fn model_id(&self) -> &str;

    /// Devuelve un vector por texto, en el mismo orden.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Embedding>>;
}

#[derive(Clone)]
pub struct Embedder {
    service: Arc<dyn EmbeddingService>,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(service: Arc<dyn EmbeddingService>, settings: &RagSettings) -> Self {
        Self {
            service,
            batch_size: settings.embed_batch_size.max(1),
            concurrency: settings.embed_concurrency.max(1),
            timeout: settings.service_timeout,
        }
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    /// Embeddings de una lista de textos, uno por entrada y en orden.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(|batch| batch.to_vec())
            .collect();
        debug!(
            "Embedding de {} textos en {} lotes (concurrencia {})",
            texts.len(),
            batches.len(),
            self.concurrency
        );

        // `buffered` conserva el orden de los lotes aunque terminen desordenados.
        let results: Vec<Vec<Embedding>> = stream::iter(batches)
            .map(|batch| self.embed_batch(batch))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let embeddings: Vec<Embedding> = results.into_iter().flatten().collect();
        check_dimensions(&embeddings)?;
        Ok(embeddings)
    }

    /// Embedding de una consulta con el mismo modelo que los documentos.
    pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                RagError::EmbeddingService("No se pudo generar embedding de la query".into())
            })
    }

    async fn embed_batch(&self, batch: Vec<String>) -> Result<Vec<Embedding>> {
        let expected = batch.len();
        let embeddings = with_timeout(
            "embeddings",
            self.timeout,
            self.service.embed_texts(batch),
        )
        .await?;

        if embeddings.len() != expected {
            return Err(RagError::EmbeddingService(format!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            )));
        }
        Ok(embeddings)
    }
}

fn check_dimensions(embeddings: &[Embedding]) -> Result<()> {
    let Some(first) = embeddings.first() else {
        return Ok(());
    };
    if let Some(bad) = embeddings.iter().find(|e| e.len() != first.len()) {
        return Err(RagError::EmbeddingService(format!(
            "El servicio devolvió dimensiones inconsistentes ({} y {})",
            first.len(),
            bad.len()
        )));
    }
    Ok(())
}
