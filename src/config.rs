//! Carga y gestión de configuración de la aplicación (servidor, LLM y pipeline RAG).

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};

use crate::error::RagError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Parámetros del pipeline RAG: troceado, recuperación y generación.
#[derive(Clone, Debug, PartialEq)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_new_tokens: u64,
    pub temperature: f64,
    pub service_timeout: Duration,
    /// Presupuesto de caracteres del historial que se mete en el prompt (`None` = completo).
    pub history_max_chars: Option<usize>,
    /// Reescribe las preguntas de seguimiento como preguntas independientes antes de buscar.
    pub condense_question: bool,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 2,
            max_new_tokens: 128,
            temperature: 0.01,
            service_timeout: Duration::from_secs(120),
            history_max_chars: None,
            condense_question: false,
            embed_batch_size: 32,
            embed_concurrency: 4,
        }
    }
}

impl RagSettings {
    pub fn validate(&self) -> std::result::Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidArgument(
                "chunk_size debe ser mayor que 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidArgument(format!(
                "chunk_overlap ({}) debe ser menor que chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidArgument("top_k debe ser mayor que 0".into()));
        }
        if !(self.temperature >= 0.0) {
            return Err(RagError::InvalidArgument(format!(
                "temperature inválida: {}",
                self.temperature
            )));
        }
        if self.embed_batch_size == 0 || self.embed_concurrency == 0 {
            return Err(RagError::InvalidArgument(
                "embed_batch_size y embed_concurrency deben ser mayores que 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,

    pub rag: RagSettings,
    /// Directorio cuyos ficheros se ingieren al arrancar.
    pub docs_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model = env::var("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let defaults = RagSettings::default();
        let rag = RagSettings {
            chunk_size: parse_var("RAG_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var("RAG_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: parse_var("RAG_TOP_K", defaults.top_k)?,
            max_new_tokens: parse_var("LLM_MAX_NEW_TOKENS", defaults.max_new_tokens)?,
            temperature: parse_var("LLM_TEMPERATURE", defaults.temperature)?,
            service_timeout: Duration::from_secs(parse_var(
                "LLM_TIMEOUT_SECS",
                defaults.service_timeout.as_secs(),
            )?),
            history_max_chars: parse_opt_var("RAG_HISTORY_MAX_CHARS")?,
            condense_question: parse_var("RAG_CONDENSE_QUESTION", defaults.condense_question)?,
            embed_batch_size: parse_var("EMBED_BATCH_SIZE", defaults.embed_batch_size)?,
            embed_concurrency: parse_var("EMBED_CONCURRENCY", defaults.embed_concurrency)?,
        };
        rag.validate().context("Configuración RAG inválida")?;

        let docs_dir = env::var("DOCS_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            rag,
            docs_dir,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt_var(name)?.unwrap_or(default))
}

fn parse_opt_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Valor inválido para {name} ('{raw}'): {e}")),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_pipeline() {
        let s = RagSettings::default();
        assert_eq!((s.chunk_size, s.chunk_overlap, s.top_k), (500, 50, 2));
        assert_eq!(s.max_new_tokens, 128);
        assert!((s.temperature - 0.01).abs() < f64::EPSILON);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let s = RagSettings {
            chunk_size: 100,
            chunk_overlap: 100,
            ..RagSettings::default()
        };
        assert!(matches!(s.validate(), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let s = RagSettings {
            top_k: 0,
            ..RagSettings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn provider_names_are_case_insensitive() {
        assert_eq!(LlmProvider::from_str("Ollama").unwrap(), LlmProvider::Ollama);
        assert!(LlmProvider::from_str("claude").is_err());
    }

    #[test]
    fn malformed_numeric_variable_is_an_error() {
        env::set_var("RAG_TEST_BAD_NUMBER", "cinco");
        let parsed: Result<usize> = parse_var("RAG_TEST_BAD_NUMBER", 5);
        assert!(parsed.is_err());
        env::remove_var("RAG_TEST_BAD_NUMBER");

        let missing: usize = parse_var("RAG_TEST_MISSING_NUMBER", 5).unwrap();
        assert_eq!(missing, 5);
    }
}
