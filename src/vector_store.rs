//! Índice vectorial en memoria sobre los chunks de la sesión.
//!
//! API pública:
//!   - `VectorIndex::build(chunks, embeddings)`
//!   - `VectorIndex::search(&query, k)`
//!
//! Búsqueda exhaustiva por similitud coseno. Los empates se resuelven por
//! orden de inserción, así que el ranking no depende de la estructura usada.

use std::cmp::Ordering;

use tracing::info;

use crate::{
    error::{RagError, Result},
    models::{Chunk, Embedding, SearchHit},
};

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    embedding: Embedding,
    norm: f64,
}

/// Índice inmutable: se construye una vez por conjunto de documentos.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    dimensions: usize,
}

impl VectorIndex {
    /// Construye el índice. Exige un embedding por chunk y dimensión constante.
    /// Un índice sin chunks es válido, pero no admite búsquedas.
    pub fn build(chunks: Vec<Chunk>, embeddings: Vec<Embedding>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::InvalidArgument(format!(
                "Número de embeddings ({}) distinto al número de chunks ({})",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        if !embeddings.is_empty() && dimensions == 0 {
            return Err(RagError::InvalidArgument(
                "Los embeddings no pueden tener dimensión 0".into(),
            ));
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if embedding.len() != dimensions {
                return Err(RagError::InvalidArgument(format!(
                    "El chunk {} tiene dimensión {} y el índice {}",
                    chunk.id,
                    embedding.len(),
                    dimensions
                )));
            }
            let norm = l2_norm(&embedding);
            entries.push(Entry {
                chunk,
                embedding,
                norm,
            });
        }

        info!(
            "Índice vectorial construido: {} chunks, dimensión {}",
            entries.len(),
            dimensions
        );
        Ok(Self {
            entries,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Chunks en orden de inserción.
    #[cfg(test)]
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Devuelve los `min(k, len)` chunks más similares, de mayor a menor score.
    pub fn search(&self, query: &[f64], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k debe ser mayor que 0".into()));
        }
        if self.is_empty() {
            return Err(RagError::InvalidArgument(
                "No se puede buscar en un índice vacío".into(),
            ));
        }
        if query.len() != self.dimensions {
            return Err(RagError::InvalidArgument(format!(
                "La consulta tiene dimensión {} y el índice {}",
                query.len(),
                self.dimensions
            )));
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, cosine(query, query_norm, &entry.embedding, entry.norm)))
            .collect();

        // `sort_by` es estable: a igual score se mantiene el orden de inserción.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(pos, score)| SearchHit {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect())
    }
}

fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Similitud coseno; un vector nulo (o no finito) puntúa 0.
fn cosine(a: &[f64], a_norm: f64, b: &[f64], b_norm: f64) -> f64 {
    let denom = a_norm * b_norm;
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / denom;
    if score.is_nan() {
        0.0
    } else {
        score
    }
}
