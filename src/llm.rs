//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! Se implementan OpenAI y Ollama (modelos locales); Gemini queda preparado para el futuro.

use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts

use crate::{
    config::{AppConfig, LlmProvider},
    embedder::EmbeddingService,
    error::{RagError, Result},
    models::Embedding,
};

const SYSTEM_PROMPT: &str = r#"
Eres un asistente que responde preguntas sobre los documentos del usuario.
Sólo puedes usar la información suministrada en el contexto y en el historial de la conversación.
Si el contexto no contiene la respuesta, di explícitamente que no la sabes.
"#;

/// Parámetros de generación que se envían con cada prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u64,
    pub temperature: f64,
}

/// Servicio externo de completado de texto (caja negra).
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_with_openai(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();

        // Modelo de embeddings: config o default
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };

        let embedding_model = client.embedding_model(model_name);
        let embeddings = embedding_model
            .embed_texts(texts)
            .await
            .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    async fn embed_with_ollama(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::ollama;

        // Lee OLLAMA_API_BASE_URL.
        let client = ollama::Client::from_env();
        let embedding_model = client.embedding_model(&self.embedding_model);
        let embeddings = embedding_model
            .embed_texts(texts)
            .await
            .map_err(|e| RagError::EmbeddingService(e.to_string()))?;

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn complete_with_openai(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(SYSTEM_PROMPT)
            .max_tokens(params.max_tokens)
            .temperature(params.temperature)
            .build();

        agent
            .prompt(prompt)
            .await
            .map_err(|e| RagError::CompletionService(e.to_string()))
    }

    async fn complete_with_ollama(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::providers::ollama;

        let client = ollama::Client::from_env();
        let agent = client
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .max_tokens(params.max_tokens)
            .temperature(params.temperature)
            .build();

        agent
            .prompt(prompt)
            .await
            .map_err(|e| RagError::CompletionService(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingService for LlmManager {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            LlmProvider::Ollama => self.embed_with_ollama(texts).await,
            ref other => Err(RagError::EmbeddingService(format!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            ))),
        }
    }
}

#[async_trait]
impl CompletionService for LlmManager {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(prompt, params).await,
            LlmProvider::Ollama => self.complete_with_ollama(prompt, params).await,
            ref other => Err(RagError::CompletionService(format!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            ))),
        }
    }
}
