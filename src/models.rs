//! Modelos de dominio del pipeline (documentos, unidades de texto, chunks y turnos).

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Vector de embedding. Su dimensión la fija el modelo.
pub type Embedding = Vec<f64>;

/// Fichero subido por el usuario. Sólo existe durante la ingesta.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Texto de una página de un documento, con su procedencia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub source_id: String,
    pub page_index: usize,
    pub text: String,
}

/// Trozo de texto acotado que se indexa y recupera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub page_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Question,
    Answer,
}

/// Un turno de la conversación.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn question(text: impl Into<String>) -> Self {
        Self {
            role: Role::Question,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            role: Role::Answer,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Resultado de una búsqueda vectorial.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f64,
}

/// Procedencia de un fragmento usado en una respuesta.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source_id: String,
    pub page_index: usize,
    pub score: f64,
}

impl From<&SearchHit> for SourceRef {
    fn from(hit: &SearchHit) -> Self {
        Self {
            source_id: hit.chunk.source_id.clone(),
            page_index: hit.chunk.page_index,
            score: hit.score,
        }
    }
}
