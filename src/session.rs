//! Estado de la sesión: como mucho un índice y su memoria conversacional.
//!
//! El índice y la memoria viven juntos en `KnowledgeBase`, de modo que una
//! reingesta sustituye ambos a la vez y nunca queda un índice nuevo con una
//! memoria vieja (ni al revés).

use crate::{memory::ConversationMemory, vector_store::VectorIndex};

/// Índice construido a partir de un conjunto de documentos más la
/// conversación mantenida sobre él.
#[derive(Debug)]
pub struct KnowledgeBase {
    pub index: VectorIndex,
    pub memory: ConversationMemory,
    /// Modelo con el que se generaron los embeddings del índice.
    pub embedding_model: String,
}

impl KnowledgeBase {
    pub fn new(index: VectorIndex, embedding_model: impl Into<String>) -> Self {
        Self {
            index,
            memory: ConversationMemory::new(),
            embedding_model: embedding_model.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    current: Option<KnowledgeBase>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knowledge(&self) -> Option<&KnowledgeBase> {
        self.current.as_ref()
    }

    pub fn knowledge_mut(&mut self) -> Option<&mut KnowledgeBase> {
        self.current.as_mut()
    }

    /// Sustituye por completo el índice y la memoria. Devuelve la base anterior.
    pub fn replace(&mut self, knowledge: KnowledgeBase) -> Option<KnowledgeBase> {
        self.current.replace(knowledge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Turn};

    fn knowledge(text: &str) -> KnowledgeBase {
        let chunk = Chunk {
            id: text.into(),
            text: text.into(),
            source_id: format!("{text}.pdf"),
            page_index: 0,
        };
        let index = VectorIndex::build(vec![chunk], vec![vec![1.0]]).unwrap();
        KnowledgeBase::new(index, "test")
    }

    #[test]
    fn new_session_is_not_ready() {
        assert!(Session::new().knowledge().is_none());
    }

    #[test]
    fn replace_swaps_index_and_memory_together() {
        let mut session = Session::new();
        session.replace(knowledge("viejo"));
        session
            .knowledge_mut()
            .unwrap()
            .memory
            .append(Turn::question("¿algo?"));

        let previous = session.replace(knowledge("nuevo")).unwrap();
        assert_eq!(previous.memory.len(), 1);

        let current = session.knowledge().unwrap();
        assert!(current.memory.is_empty());
        assert_eq!(current.index.chunks().next().unwrap().text, "nuevo");
    }
}
