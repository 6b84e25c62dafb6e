//! Servicios falsos y deterministas para los tests.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    embedder::EmbeddingService,
    error::{RagError, Result},
    llm::{CompletionService, GenerationParams},
    models::Embedding,
};

/// Embedding por recuento de palabras clave: una dimensión por palabra.
pub struct KeywordEmbeddings {
    keywords: Vec<String>,
}

impl KeywordEmbeddings {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn vector_for(&self, text: &str) -> Embedding {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .map(|k| lower.matches(k.as_str()).count() as f64)
            .collect()
    }
}

#[async_trait]
impl EmbeddingService for KeywordEmbeddings {
    fn model_id(&self) -> &str {
        "keyword-test"
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

pub struct FailingEmbeddings;

#[async_trait]
impl EmbeddingService for FailingEmbeddings {
    fn model_id(&self) -> &str {
        "failing-test"
    }

    async fn embed_texts(&self, _texts: Vec<String>) -> Result<Vec<Embedding>> {
        Err(RagError::EmbeddingService("servicio caído".into()))
    }
}

pub struct SlowEmbeddings(pub Duration);

#[async_trait]
impl EmbeddingService for SlowEmbeddings {
    fn model_id(&self) -> &str {
        "slow-test"
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        tokio::time::sleep(self.0).await;
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }
}

/// Devuelve `[n]` para el texto "n". Cuanto menor es el primer `n` del lote,
/// más tarda en responder, así que los primeros lotes terminan los últimos.
#[derive(Default)]
pub struct StaggeredEmbeddings {
    finished: Mutex<Vec<u64>>,
}

impl StaggeredEmbeddings {
    /// Primer texto de cada lote, en orden de finalización.
    pub fn finished(&self) -> Vec<u64> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingService for StaggeredEmbeddings {
    fn model_id(&self) -> &str {
        "staggered-test"
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let numbers = texts
            .iter()
            .map(|t| t.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RagError::EmbeddingService(e.to_string()))?;
        let first = numbers.first().copied().unwrap_or(0);

        tokio::time::sleep(Duration::from_millis(20 * 10u64.saturating_sub(first))).await;
        self.finished.lock().unwrap().push(first);
        Ok(numbers.into_iter().map(|n| vec![n as f64]).collect())
    }
}

/// Completado con respuestas guionizadas que guarda cada prompt recibido.
/// Sin guion, responde "respuesta N".
#[derive(Default)]
pub struct RecordingCompletion {
    script: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<GenerationParams>>,
}

impl RecordingCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn params(&self) -> Vec<GenerationParams> {
        self.params.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        self.params.lock().unwrap().push(params.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("respuesta {n}")))
    }
}

pub struct SlowCompletion(pub Duration);

#[async_trait]
impl CompletionService for SlowCompletion {
    async fn complete(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("demasiado tarde".into())
    }
}
