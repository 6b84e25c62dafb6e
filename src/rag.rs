//! Consulta RAG conversacional sobre el índice de la sesión.
//!
//! Flujo por pregunta:
//!   1. Embedding de la pregunta (o de su versión independiente, si se condensa).
//!   2. Búsqueda de los `top_k` chunks más similares.
//!   3. Prompt = contexto (chunks en orden de ranking) → historial → pregunta.
//!   4. Llamada al servicio de completado con `max_new_tokens` y `temperature`.
//!   5. Se anexan a la memoria la pregunta y la respuesta, en ese orden.
//!
//! Si cualquier paso falla la memoria no se toca: o entran los dos turnos o ninguno.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::RagSettings,
    embedder::Embedder,
    error::{with_timeout, RagError, Result},
    llm::{CompletionService, GenerationParams},
    models::{Role, SearchHit, SourceRef, Turn},
    session::Session,
};

/// Respuesta junto con la procedencia de los fragmentos usados.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Orquestador de recuperación + generación.
#[derive(Clone)]
pub struct RagChat {
    embedder: Embedder,
    completion: Arc<dyn CompletionService>,
    top_k: usize,
    params: GenerationParams,
    history_max_chars: Option<usize>,
    condense_question: bool,
    timeout: Duration,
}

impl RagChat {
    pub fn new(
        embedder: Embedder,
        completion: Arc<dyn CompletionService>,
        settings: &RagSettings,
    ) -> Self {
        Self {
            embedder,
            completion,
            top_k: settings.top_k,
            params: GenerationParams {
                max_tokens: settings.max_new_tokens,
                temperature: settings.temperature,
            },
            history_max_chars: settings.history_max_chars,
            condense_question: settings.condense_question,
            timeout: settings.service_timeout,
        }
    }

    /// Sólo el texto de la respuesta; la API HTTP usa `answer_with_sources`.
    #[cfg(test)]
    pub async fn answer(&self, session: &mut Session, question: &str) -> Result<String> {
        Ok(self.answer_with_sources(session, question).await?.answer)
    }

    /// Responde a `question` y actualiza la memoria de la sesión.
    pub async fn answer_with_sources(
        &self,
        session: &mut Session,
        question: &str,
    ) -> Result<RagAnswer> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument("La pregunta está vacía".into()));
        }
        let kb = session.knowledge_mut().ok_or(RagError::NotReady)?;
        if kb.embedding_model != self.embedder.model_id() {
            return Err(RagError::InvalidArgument(format!(
                "El índice se construyó con el modelo '{}' y la consulta usaría '{}'",
                kb.embedding_model,
                self.embedder.model_id()
            )));
        }

        let history = history_window(kb.memory.history(), self.history_max_chars);

        let retrieval_query = if self.condense_question && !history.is_empty() {
            self.condense(history, question).await?
        } else {
            question.to_string()
        };

        // 1) Embedding de la consulta y búsqueda
        let query_vec = self.embedder.embed_query(&retrieval_query).await?;
        let hits = kb.index.search(&query_vec, self.top_k)?;
        debug!(
            "Recuperados {} chunks (mejor score {:?})",
            hits.len(),
            hits.first().map(|h| h.score)
        );

        // 2) Prompt con contexto + historial + pregunta
        let prompt = compose_prompt(&hits, history, question);

        // 3) Completado
        let answer = with_timeout(
            "completado",
            self.timeout,
            self.completion.complete(&prompt, &self.params),
        )
        .await?;

        // 4) Memoria: los dos turnos juntos, sólo tras el éxito
        kb.memory.append(Turn::question(question));
        kb.memory.append(Turn::answer(answer.clone()));
        info!(
            "Pregunta respondida con {} fragmentos; historial de {} turnos",
            hits.len(),
            kb.memory.len()
        );

        Ok(RagAnswer {
            answer,
            sources: hits.iter().map(SourceRef::from).collect(),
        })
    }

    /// Reescribe una pregunta de seguimiento como pregunta independiente.
    async fn condense(&self, history: &[Turn], question: &str) -> Result<String> {
        let prompt = compose_condense_prompt(history, question);
        let standalone = with_timeout(
            "completado",
            self.timeout,
            self.completion.complete(&prompt, &self.params),
        )
        .await?;

        let standalone = standalone.trim();
        if standalone.is_empty() {
            warn!("La pregunta condensada llegó vacía; se usa la original");
            return Ok(question.to_string());
        }
        debug!("Pregunta condensada: {standalone}");
        Ok(standalone.to_string())
    }
}

/// Intercambios (pregunta + respuesta) más recientes cuyo texto cabe en
/// `max_chars`. Nunca parte un intercambio.
pub fn history_window(turns: &[Turn], max_chars: Option<usize>) -> &[Turn] {
    let Some(budget) = max_chars else {
        return turns;
    };

    let mut used = 0;
    let mut start = turns.len();
    while start > 0 {
        let mut begin = start - 1;
        if turns[begin].role == Role::Answer
            && begin > 0
            && turns[begin - 1].role == Role::Question
        {
            begin -= 1;
        }
        let size: usize = turns[begin..start]
            .iter()
            .map(|t| t.text.chars().count())
            .sum();
        if used + size > budget {
            break;
        }
        used += size;
        start = begin;
    }
    &turns[start..]
}

fn push_history(prompt: &mut String, history: &[Turn]) {
    for turn in history {
        let speaker = match turn.role {
            Role::Question => "Usuario",
            Role::Answer => "Asistente",
        };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(&turn.text);
        prompt.push('\n');
    }
}

/// Prompt final: contexto, luego historial y por último la pregunta.
pub fn compose_prompt(hits: &[SearchHit], history: &[Turn], question: &str) -> String {
    let context = hits
        .iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let mut prompt = String::from(
        "Usa únicamente los siguientes fragmentos de contexto para responder a la pregunta final. \
         Si no sabes la respuesta, di que no la sabes; no intentes inventarla.\n\n",
    );
    prompt.push_str("Contexto:\n");
    prompt.push_str(&context);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Historial de la conversación:\n");
        push_history(&mut prompt, history);
        prompt.push('\n');
    }

    prompt.push_str("Pregunta: ");
    prompt.push_str(question);
    prompt.push_str("\nRespuesta útil:");
    prompt
}

fn compose_condense_prompt(history: &[Turn], question: &str) -> String {
    let mut prompt = String::from(
        "Dada la siguiente conversación y una pregunta de seguimiento, reformula la pregunta \
         de seguimiento para que sea una pregunta independiente, en su idioma original. \
         Devuelve sólo la pregunta.\n\nHistorial de la conversación:\n",
    );
    push_history(&mut prompt, history);
    prompt.push_str("\nPregunta de seguimiento: ");
    prompt.push_str(question);
    prompt.push_str("\nPregunta independiente:");
    prompt
}
