//! Memoria conversacional: registro fiel, sólo de anexado, de los turnos.
//!
//! No impone límite de tamaño; el recorte para el prompt lo decide el
//! orquestador (`rag::history_window`).

use crate::models::Turn;

#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Historial completo, del turno más antiguo al más reciente.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
